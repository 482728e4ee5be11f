//! Unit tests for service implementations
