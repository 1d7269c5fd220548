//! Command implementations for the docframe CLI.

mod config;
mod open;
mod rewrite;

pub use config::ConfigCommand;

pub use config::run as config;
pub use open::run as open;
pub use rewrite::run as rewrite;
