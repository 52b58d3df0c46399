pub mod clienv;
pub mod config;
pub mod daemon;
pub mod error;

pub use config::NoticesConfig;
pub use error::{NoticesError, Result};
