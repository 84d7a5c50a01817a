//! Scenario tests for the cache module
