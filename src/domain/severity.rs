use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message severity as understood by the ingestion port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Undefined,
    Unknown,
    Normal,
    Warning,
    Minor,
    Major,
    Critical,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Undefined => "UNDEFINED",
            Severity::Unknown => "UNKNOWN",
            Severity::Normal => "NORMAL",
            Severity::Warning => "WARNING",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UNDEFINED" => Ok(Severity::Undefined),
            "UNKNOWN" => Ok(Severity::Unknown),
            "NORMAL" => Ok(Severity::Normal),
            "WARNING" => Ok(Severity::Warning),
            "MINOR" => Ok(Severity::Minor),
            "MAJOR" => Ok(Severity::Major),
            "CRITICAL" => Ok(Severity::Critical),
            "FATAL" => Ok(Severity::Fatal),
            _ => Err(format!("Unknown severity: {s}")),
        }
    }
}
