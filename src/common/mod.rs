//! Common utilities and types shared across snapvol

pub mod config;
pub mod error;
pub mod utils;

pub use config::{BackendKind, Config, ProviderKind};
pub use error::{Error, Result};
pub use utils::validate_name;
