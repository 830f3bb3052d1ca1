//! Built-in behavior processors.

pub mod duration;
pub mod status_change_timeout;

pub use duration::{DurationParseError, parse_duration};
pub use status_change_timeout::{StatusChangeRule, StatusChangeTimeout};
