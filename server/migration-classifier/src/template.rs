//! MGN import template projection: MGN-ready VMs scoped to an account and region.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;

use crate::error::EngineError;
use crate::types::{ClassificationOutcome, DataQualityWarning, Decision, InventoryRecord};

/// Conventional filename for the generated template.
pub const TEMPLATE_FILENAME: &str = "mgn_import_ready.csv";

/// Column order of the template CSV. Locked to `TemplateRow`'s serde names.
pub const TEMPLATE_HEADERS: [&str; 8] = [
  "account-id",
  "region",
  "server:user-provided-id",
  "server:platform",
  "server:os",
  "server:cpu-count",
  "server:ram-mb",
  "server:primary-ip",
];

static ACCOUNT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{12}$").unwrap());
static REGION: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"^[a-z]{2}(?:-gov|-iso[a-z]*)?-(?:north|south|east|west|central|northeast|northwest|southeast|southwest)-[0-9]{1,2}$")
    .unwrap()
});

const LINUX_MARKERS: [&str; 11] = [
  "linux", "rhel", "red hat", "centos", "ubuntu", "debian", "oracle", "suse", "sles", "rocky", "amazon",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TemplatePlatform {
  Windows,
  Linux,
  Other,
}

impl TemplatePlatform {
  pub fn from_os(os: &str) -> Self {
    let lower = os.to_lowercase();
    if lower.contains("windows") {
      Self::Windows
    } else if LINUX_MARKERS.iter().any(|m| lower.contains(m)) {
      Self::Linux
    } else {
      Self::Other
    }
  }
}

/// One row of the MGN import template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateRow {
  #[serde(rename = "account-id")]
  pub account_id: String,
  pub region: String,
  #[serde(rename = "server:user-provided-id")]
  pub vm_name: String,
  #[serde(rename = "server:platform")]
  pub platform: TemplatePlatform,
  #[serde(rename = "server:os")]
  pub os: String,
  #[serde(rename = "server:cpu-count")]
  pub cpu_count: u32,
  #[serde(rename = "server:ram-mb")]
  pub ram_mb: u64,
  #[serde(rename = "server:primary-ip")]
  pub primary_ip: Option<String>,
}

/// Projected rows plus their lint warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateExport {
  pub rows: Vec<TemplateRow>,
  pub warnings: Vec<DataQualityWarning>,
}

/// AWS account ids are exactly 12 digits.
pub fn validate_account_id(account_id: &str) -> Result<(), EngineError> {
  if account_id.is_empty() {
    return Err(EngineError::validation("account_id", "must not be empty"));
  }
  if !ACCOUNT_ID.is_match(account_id) {
    return Err(EngineError::validation("account_id", "expected a 12-digit AWS account id"));
  }
  Ok(())
}

/// Region codes look like `us-east-1`, `ap-southeast-2`, `us-gov-west-1`.
pub fn validate_region(region: &str) -> Result<(), EngineError> {
  if region.is_empty() {
    return Err(EngineError::validation("region", "must not be empty"));
  }
  if !REGION.is_match(region) {
    return Err(EngineError::validation(
      "region",
      &format!("'{}' is not an AWS region code", region),
    ));
  }
  Ok(())
}

/// Project MGN outcomes into template rows.
///
/// Validates `account_id` and `region` before producing anything. Outcomes are
/// joined to records by VM name (duplicate names pair up in order); output
/// keeps the outcome order. Inputs are not modified and nothing is reclassified.
pub fn project_template(
  outcomes: &[ClassificationOutcome],
  records: &[InventoryRecord],
  account_id: &str,
  region: &str,
) -> Result<Vec<TemplateRow>, EngineError> {
  let account_id = account_id.trim();
  let region = region.trim();
  validate_account_id(account_id)?;
  validate_region(region)?;

  let mut by_name: HashMap<&str, VecDeque<&InventoryRecord>> = HashMap::new();
  for record in records {
    by_name.entry(record.vm_name.as_str()).or_default().push_back(record);
  }

  let mut rows = Vec::new();
  for outcome in outcomes {
    let record = by_name
      .get_mut(outcome.vm_name.as_str())
      .and_then(|queue| queue.pop_front())
      .ok_or_else(|| {
        EngineError::validation(
          "outcomes",
          &format!("no source record for VM '{}'", outcome.vm_name),
        )
      })?;

    if outcome.decision != Decision::Mgn {
      continue;
    }
    rows.push(TemplateRow {
      account_id: account_id.to_string(),
      region: region.to_string(),
      vm_name: record.vm_name.clone(),
      platform: TemplatePlatform::from_os(&record.os),
      os: record.os.clone(),
      cpu_count: record.cpu_count,
      ram_mb: record.ram_mb,
      primary_ip: record.primary_ip.clone(),
    });
  }
  Ok(rows)
}

/// Rows MGN would reject or collide on: no primary IP, duplicate server id,
/// duplicate primary IP. Rows are still emitted; the warnings travel with them.
pub fn lint_template(rows: &[TemplateRow]) -> Vec<DataQualityWarning> {
  let mut warnings = Vec::new();
  let mut names = HashSet::new();
  let mut ips = HashSet::new();

  for (i, row) in rows.iter().enumerate() {
    let row_index = i + 1;
    if !names.insert(row.vm_name.as_str()) {
      warnings.push(DataQualityWarning {
        row_index,
        vm_name: row.vm_name.clone(),
        message: "duplicate server id in template".to_string(),
      });
    }
    match &row.primary_ip {
      None => warnings.push(DataQualityWarning {
        row_index,
        vm_name: row.vm_name.clone(),
        message: "missing primary IP".to_string(),
      }),
      Some(ip) if !ips.insert(ip.as_str()) => {
        warnings.push(DataQualityWarning {
          row_index,
          vm_name: row.vm_name.clone(),
          message: format!("duplicate primary IP {}", ip),
        });
      }
      Some(_) => {}
    }
  }
  warnings
}

/// Write the template as CSV. The header row is written even when empty.
pub fn write_csv<W: Write>(rows: &[TemplateRow], writer: W) -> Result<(), EngineError> {
  let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
  wtr.write_record(TEMPLATE_HEADERS)?;
  for row in rows {
    wtr.serialize(row)?;
  }
  wtr.flush().map_err(csv::Error::from)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{PowerState, Risk};

  fn record(name: &str, os: &str, ip: Option<&str>) -> InventoryRecord {
    InventoryRecord {
      vm_name: name.into(),
      os: os.into(),
      cpu_count: 2,
      ram_mb: 4096,
      power_state: PowerState::PoweredOn,
      primary_ip: ip.map(String::from),
    }
  }

  fn outcome(name: &str, decision: Decision) -> ClassificationOutcome {
    ClassificationOutcome {
      vm_name: name.into(),
      decision,
      risk: Risk::Low,
      strategy: decision.strategy().into(),
      reason: "r".into(),
    }
  }

  #[test]
  fn account_id_must_be_twelve_digits() {
    assert!(validate_account_id("123456789012").is_ok());
    for bad in ["", "12345", "1234567890123", "12345678901a", "١٢٣٤٥٦٧٨٩٠١٢"] {
      let err = validate_account_id(bad).unwrap_err();
      assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "account_id"));
    }
  }

  #[test]
  fn region_codes() {
    for ok in ["us-east-1", "ap-south-1", "eu-central-2", "ap-southeast-5", "us-gov-west-1", "us-isob-east-1"] {
      assert!(validate_region(ok).is_ok(), "{} should be valid", ok);
    }
    for bad in ["", "us-east", "US-EAST-1", "useast1", "us-middle-1", "usa-east-1", "us-east-123"] {
      assert!(validate_region(bad).is_err(), "{} should be invalid", bad);
    }
  }

  #[test]
  fn only_mgn_rows_in_input_order() {
    let records = vec![
      record("a", "Windows Server 2019", Some("10.0.0.1")),
      record("b", "", None),
      record("c", "RHEL 8", None),
    ];
    let outcomes = vec![
      outcome("c", Decision::Mgn),
      outcome("b", Decision::Rebuild),
      outcome("a", Decision::Mgn),
    ];
    let rows = project_template(&outcomes, &records, "123456789012", "us-east-1").unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.vm_name.as_str()).collect();
    assert_eq!(names, vec!["c", "a"]);
    assert_eq!(rows[0].platform, TemplatePlatform::Linux);
    assert_eq!(rows[1].platform, TemplatePlatform::Windows);
    assert_eq!(rows[1].primary_ip.as_deref(), Some("10.0.0.1"));
    assert!(rows.iter().all(|r| r.account_id == "123456789012" && r.region == "us-east-1"));
  }

  #[test]
  fn short_account_id_fails_before_rows() {
    let records = vec![record("a", "Windows Server 2019", None)];
    let outcomes = vec![outcome("a", Decision::Mgn)];
    let err = project_template(&outcomes, &records, "12345", "us-east-1").unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
  }

  #[test]
  fn outcome_without_record_is_rejected() {
    let err = project_template(&[outcome("ghost", Decision::Mgn)], &[], "123456789012", "us-east-1").unwrap_err();
    assert!(err.to_string().contains("ghost"));
  }

  #[test]
  fn duplicate_names_pair_in_order() {
    let records = vec![record("dup", "RHEL 8", Some("10.0.0.1")), record("dup", "RHEL 9", Some("10.0.0.1"))];
    let outcomes = vec![outcome("dup", Decision::Rebuild), outcome("dup", Decision::Mgn)];
    let rows = project_template(&outcomes, &records, "123456789012", "eu-west-1").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].os, "RHEL 9");
  }

  #[test]
  fn lint_flags_duplicates() {
    let records = vec![record("dup", "RHEL 8", Some("10.0.0.1")), record("dup", "RHEL 9", Some("10.0.0.1"))];
    let outcomes = vec![outcome("dup", Decision::Mgn), outcome("dup", Decision::Mgn)];
    let rows = project_template(&outcomes, &records, "123456789012", "eu-west-1").unwrap();
    let warnings = lint_template(&rows);
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.row_index == 2));
  }

  #[test]
  fn lint_flags_missing_primary_ip() {
    let records = vec![record("a", "RHEL 8", Some("10.0.0.1")), record("b", "RHEL 8", None)];
    let outcomes = vec![outcome("a", Decision::Mgn), outcome("b", Decision::Mgn)];
    let rows = project_template(&outcomes, &records, "123456789012", "eu-west-1").unwrap();
    let warnings = lint_template(&rows);
    assert_eq!(
      warnings,
      vec![DataQualityWarning {
        row_index: 2,
        vm_name: "b".into(),
        message: "missing primary IP".into(),
      }]
    );
  }

  struct BrokenPipe;

  impl Write for BrokenPipe {
    fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
      Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn write_failure_surfaces_as_io_csv_error() {
    let err = write_csv(&[], BrokenPipe).unwrap_err();
    match err {
      EngineError::Csv(e) => assert!(e.is_io_error()),
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn csv_output_has_fixed_header() {
    let records = vec![record("a", "Windows Server 2019", None)];
    let rows = project_template(&[outcome("a", Decision::Mgn)], &records, "123456789012", "ap-south-1").unwrap();
    let mut buf = Vec::new();
    write_csv(&rows, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next().unwrap(), TEMPLATE_HEADERS.join(","));
    assert_eq!(lines.next().unwrap(), "123456789012,ap-south-1,a,WINDOWS,Windows Server 2019,2,4096,");

    let mut empty = Vec::new();
    write_csv(&[], &mut empty).unwrap();
    assert_eq!(String::from_utf8(empty).unwrap().trim_end(), TEMPLATE_HEADERS.join(","));
  }
}
