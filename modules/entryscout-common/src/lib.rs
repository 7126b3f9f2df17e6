pub mod config;
pub mod error;
pub mod subjects;
pub mod types;

pub use config::{HarvestConfig, Timeouts};
pub use error::{HarvestError, Result};
pub use subjects::{load_subjects, parse_subjects};
pub use types::*;
