//! YAML serialization for the run report, for consumers that prefer it over
//! JSON (spec §1: "serialized as JSON by default; a YAML profile is a
//! drop-in alternative for review UIs consuming either").

use super::ReportSerializer;
use crate::error::Result;
use crate::report::RunReport;

#[derive(Debug, Clone, Default)]
pub struct YamlSerializer;

impl YamlSerializer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ReportSerializer for YamlSerializer {
    fn serialize_report(&self, report: &RunReport) -> Result<String> {
        Ok(serde_yaml::to_string(report)?)
    }

    fn deserialize_report(&self, data: &str) -> Result<RunReport> {
        Ok(serde_yaml::from_str(data)?)
    }
}
