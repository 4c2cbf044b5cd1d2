pub mod config;
pub mod errors;
pub mod logging;
pub mod spec;

pub use crate::config::AppConfig;
pub use crate::errors::{AppError, Result};
pub use crate::spec::{Category, SpecType};
