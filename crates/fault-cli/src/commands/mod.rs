//! Subcommand implementations.

pub mod bracket;
pub mod connect;
pub mod poly;
