//! Deterministic, pure logic shared by the session, gate and tools.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod edit;
pub mod framing;
pub mod ids;
pub mod listing;
pub mod pattern;
pub mod review;
pub mod todo;
pub mod types;
pub mod write_policy;
