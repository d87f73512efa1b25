//! JSON serialization for the run report.
//!
//! `RunReport` already implements `Serialize`/`Deserialize`; this is a
//! convenience wrapper carrying pretty-print options, the way the run report
//! is written next to a run's outputs (spec §6).

use super::ReportSerializer;
use crate::error::Result;
use crate::report::RunReport;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsonOptions {
    /// Pretty-print with indentation. Default `true` — the report is meant to
    /// be opened by a human during review, not just machine-consumed.
    pub pretty: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self { pretty: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    options: JsonOptions,
}

impl JsonSerializer {
    #[must_use]
    pub fn new() -> Self {
        Self { options: JsonOptions::default() }
    }

    #[must_use]
    pub const fn with_options(options: JsonOptions) -> Self {
        Self { options }
    }
}

impl ReportSerializer for JsonSerializer {
    fn serialize_report(&self, report: &RunReport) -> Result<String> {
        let s = if self.options.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };
        Ok(s)
    }

    fn deserialize_report(&self, data: &str) -> Result<RunReport> {
        Ok(serde_json::from_str(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_an_empty_report() {
        let report = RunReport::new(vec![], vec![], vec![]);
        let serializer = JsonSerializer::new();
        let json = serializer.serialize_report(&report).unwrap();
        assert!(json.contains('\n'), "default options pretty-print");
        let back = serializer.deserialize_report(&json).unwrap();
        assert_eq!(back.files.len(), report.files.len());
    }

    #[test]
    fn compact_option_skips_indentation() {
        let report = RunReport::new(vec![], vec![], vec![]);
        let serializer = JsonSerializer::with_options(JsonOptions { pretty: false });
        let json = serializer.serialize_report(&report).unwrap();
        assert!(!json.contains("\n  "));
    }
}
