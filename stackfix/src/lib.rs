//! Wrap a failing command, ask an LLM agent for a fix, and apply it.
//!
//! The crate keeps a strict split between the deterministic and the
//! side-effecting halves of the protocol:
//!
//! - **[`core`]**: Pure logic (reply extraction and normalization, diff
//!   validation, path guarding, patch parsing). No I/O.
//! - **[`io`]**: Subprocesses, git, filesystem history, configuration, and the
//!   HTTP transport.
//! - **[`agents`]**: Request building and the bounded strict-diff retry.
//!
//! [`fix`] coordinates the three to implement the CLI.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod fix;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
