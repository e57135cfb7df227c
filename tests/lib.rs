//! Shared support code for the natprobe integration test suites.
