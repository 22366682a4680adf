pub mod config;
pub mod error;

pub use config::ClarifyConfig;
pub use error::{ClarifyError, Result};
