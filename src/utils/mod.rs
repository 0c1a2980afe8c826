//! Small shared utilities.

pub mod logging;
pub mod time;

pub use logging::{init_logging, init_logging_from_config};
pub use time::current_timestamp;
