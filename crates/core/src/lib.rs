pub mod config;
pub mod error;
pub mod instance;

pub use config::Config;
pub use error::*;
pub use instance::*;
