//! Agent request building and the retry protocol.

pub mod client;
pub mod prompts;
pub mod request;
