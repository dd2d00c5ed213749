//! Side-effecting collaborators: filesystem, subprocesses, git, and HTTP.

pub mod apply;
pub mod config;
pub mod context;
pub mod git;
pub mod history;
pub mod process;
pub mod relay;
pub mod transport;
