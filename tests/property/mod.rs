//! Property-based tests for scheduling invariants
