pub mod config;
pub mod error;
pub mod exchange;
pub mod logging;

pub use config::{Config, Credentials};
pub use error::ClientError;
