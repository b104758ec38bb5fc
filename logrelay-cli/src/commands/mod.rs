//! Command handlers -- one module per subcommand

pub mod config;
pub mod grammar;
pub mod webhook;
