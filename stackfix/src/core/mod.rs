//! Deterministic, pure logic for the agent response protocol and patch parsing.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod diff_validator;
pub mod extract;
pub mod normalize;
pub mod patch;
pub mod path_guard;
pub mod types;
