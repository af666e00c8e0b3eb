//! Core types for the migration classifier (inventory model, outcomes, JSON contracts).

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Power state
// ---------------------------------------------------------------------------

/// vSphere power state of a VM. Unrecognized values keep their original text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PowerState {
  PoweredOn,
  PoweredOff,
  Suspended,
  Other(String),
}

impl PowerState {
  /// Accepts `poweredOn`, `PoweredOn`, `powered on`, etc.
  pub fn from_str_loose(s: &str) -> Self {
    let key: String = s
      .chars()
      .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
      .collect::<String>()
      .to_ascii_lowercase();
    match key.as_str() {
      "poweredon" | "on" => Self::PoweredOn,
      "poweredoff" | "off" => Self::PoweredOff,
      "suspended" => Self::Suspended,
      _ => Self::Other(s.trim().to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::PoweredOn => "poweredOn",
      Self::PoweredOff => "poweredOff",
      Self::Suspended => "suspended",
      Self::Other(raw) => raw,
    }
  }

  /// True when the VM is not running and must be reviewed before migration.
  pub fn is_inactive(&self) -> bool {
    matches!(self, Self::PoweredOff | Self::Suspended)
  }
}

impl Serialize for PowerState {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl fmt::Display for PowerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ---------------------------------------------------------------------------
// Decision + risk
// ---------------------------------------------------------------------------

/// Top-level classification bucket. Declaration order is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
  Mgn,
  Import,
  ActionRequired,
  Rebuild,
  Unclassified,
}

impl Decision {
  pub const ALL: [Decision; 5] = [
    Decision::Mgn,
    Decision::Import,
    Decision::ActionRequired,
    Decision::Rebuild,
    Decision::Unclassified,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Mgn => "MGN",
      Self::Import => "IMPORT",
      Self::ActionRequired => "ACTION_REQUIRED",
      Self::Rebuild => "REBUILD",
      Self::Unclassified => "UNCLASSIFIED",
    }
  }

  /// Recommended migration approach for this bucket.
  pub fn strategy(self) -> &'static str {
    match self {
      Self::Mgn => "Agent-based replication via MGN",
      Self::Import => "Image import via VM Import/Export",
      Self::ActionRequired => "Review VM state before migration",
      Self::Rebuild => "Rebuild on AWS-native OS image",
      Self::Unclassified => "Manual review",
    }
  }
}

impl fmt::Display for Decision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Decision {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let key = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
    Decision::ALL
      .into_iter()
      .find(|d| d.as_str() == key)
      .ok_or_else(|| format!("unknown decision '{}'", s.trim()))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Risk {
  Low,
  Medium,
  High,
}

// ---------------------------------------------------------------------------
// Inventory record (input)
// ---------------------------------------------------------------------------

/// One parsed inventory row. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
  pub vm_name: String,
  pub os: String,
  pub cpu_count: u32,
  pub ram_mb: u64,
  pub power_state: PowerState,
  /// First IPv4 address of the optional `IP` column.
  pub primary_ip: Option<String>,
}

// ---------------------------------------------------------------------------
// Classification outcome (output)
// ---------------------------------------------------------------------------

/// The engine's verdict for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationOutcome {
  pub vm_name: String,
  pub decision: Decision,
  pub risk: Risk,
  pub strategy: String,
  pub reason: String,
}

/// Record and outcome merged into the row shape the dashboard consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedVm {
  #[serde(rename = "VM Name")]
  pub vm_name: String,
  #[serde(rename = "OS")]
  pub os: String,
  #[serde(rename = "CPU")]
  pub cpu_count: u32,
  #[serde(rename = "RAM")]
  pub ram_mb: u64,
  #[serde(rename = "Power State")]
  pub power_state: PowerState,
  #[serde(rename = "IP", skip_serializing_if = "Option::is_none")]
  pub primary_ip: Option<String>,
  pub decision: Decision,
  pub strategy: String,
  pub risk: Risk,
  pub reason: String,
}

impl ClassifiedVm {
  pub fn merge(record: &InventoryRecord, outcome: &ClassificationOutcome) -> Self {
    Self {
      vm_name: record.vm_name.clone(),
      os: record.os.clone(),
      cpu_count: record.cpu_count,
      ram_mb: record.ram_mb,
      power_state: record.power_state.clone(),
      primary_ip: record.primary_ip.clone(),
      decision: outcome.decision,
      strategy: outcome.strategy.clone(),
      risk: outcome.risk,
      reason: outcome.reason.clone(),
    }
  }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// A row excluded from classification. Row 0 is the header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("row {row_index}: {column}: {message}")]
pub struct ParseError {
  pub row_index: usize,
  pub column: String,
  pub message: String,
}

impl ParseError {
  pub fn new(row_index: usize, column: &str, message: impl Into<String>) -> Self {
    Self {
      row_index,
      column: column.to_string(),
      message: message.into(),
    }
  }
}

/// Non-fatal data-quality signal (duplicate names, duplicate IPs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityWarning {
  pub row_index: usize,
  pub vm_name: String,
  pub message: String,
}

// ---------------------------------------------------------------------------
// CLI stream wrappers
// ---------------------------------------------------------------------------

/// Structured error output for failed invocations.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn power_state_loose_parsing() {
    assert_eq!(PowerState::from_str_loose("poweredOn"), PowerState::PoweredOn);
    assert_eq!(PowerState::from_str_loose("Powered Off"), PowerState::PoweredOff);
    assert_eq!(PowerState::from_str_loose("SUSPENDED"), PowerState::Suspended);
    assert_eq!(
      PowerState::from_str_loose(" unknown "),
      PowerState::Other("unknown".into())
    );
  }

  #[test]
  fn decision_wire_names() {
    let json = serde_json::to_string(&Decision::ActionRequired).unwrap();
    assert_eq!(json, "\"ACTION_REQUIRED\"");
    for d in Decision::ALL {
      assert_eq!(d.as_str().parse::<Decision>().unwrap(), d);
    }
    assert_eq!("action-required".parse::<Decision>().unwrap(), Decision::ActionRequired);
    assert!("ACTION".parse::<Decision>().is_err());
  }

  #[test]
  fn classified_vm_uses_uploader_keys() {
    let record = InventoryRecord {
      vm_name: "web01".into(),
      os: "Windows Server 2019".into(),
      cpu_count: 2,
      ram_mb: 4096,
      power_state: PowerState::PoweredOn,
      primary_ip: None,
    };
    let outcome = ClassificationOutcome {
      vm_name: "web01".into(),
      decision: Decision::Mgn,
      risk: Risk::Low,
      strategy: Decision::Mgn.strategy().into(),
      reason: "ok".into(),
    };
    let value = serde_json::to_value(ClassifiedVm::merge(&record, &outcome)).unwrap();
    assert_eq!(value["VM Name"], "web01");
    assert_eq!(value["Power State"], "poweredOn");
    assert_eq!(value["RAM"], 4096);
    assert_eq!(value["risk"], "LOW");
    assert!(value.get("IP").is_none());
  }

  #[test]
  fn parse_error_is_camel_case() {
    let err = ParseError::new(3, "CPU", "not a number");
    let value = serde_json::to_value(&err).unwrap();
    assert_eq!(value["rowIndex"], 3);
    assert_eq!(err.to_string(), "row 3: CPU: not a number");
  }
}
