//! Bridge between the stdin reader and the chat client.

pub mod commands;
pub mod runtime;
