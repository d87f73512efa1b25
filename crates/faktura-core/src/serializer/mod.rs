//! Run report serialization.
//!
//! Two formats, one trait, per spec §1's "serialized run report that
//! downstream UI consumes" plus spec §9's allowance for a YAML profile.

pub mod json;
pub mod yaml;

pub use json::{JsonOptions, JsonSerializer};
pub use yaml::YamlSerializer;

use crate::error::Result;
use crate::report::RunReport;

/// A format-specific way to turn a [`RunReport`] into bytes and back.
pub trait ReportSerializer {
    fn serialize_report(&self, report: &RunReport) -> Result<String>;
    fn deserialize_report(&self, data: &str) -> Result<RunReport>;
}
