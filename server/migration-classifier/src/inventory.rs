//! Inventory parsing: tabular rows into `InventoryRecord`s plus row diagnostics.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;

use crate::error::EngineError;
use crate::types::{DataQualityWarning, InventoryRecord, ParseError, PowerState};

pub const COL_VM_NAME: &str = "VM Name";
pub const COL_OS: &str = "OS";
pub const COL_CPU: &str = "CPU";
pub const COL_RAM: &str = "RAM";
pub const COL_POWER_STATE: &str = "Power State";
pub const COL_IP: &str = "IP";

static COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());
static IPV4: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9]{1,3}(?:\.[0-9]{1,3}){3}\b").unwrap());

/// Required header names. Matched case-sensitively.
pub const REQUIRED_COLUMNS: [&str; 5] = [COL_VM_NAME, COL_OS, COL_CPU, COL_RAM, COL_POWER_STATE];

/// In-memory tabular input: a header row plus data rows of text cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
  pub headers: Vec<String>,
  pub rows: Vec<Vec<String>>,
}

impl RawTable {
  pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
    Self { headers, rows }
  }

  /// Read CSV with a header row. Ragged rows are kept; bad UTF-8 is replaced.
  pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, EngineError> {
    let mut rdr = csv::ReaderBuilder::new()
      .has_headers(true)
      .flexible(true)
      .from_reader(reader);

    let headers = rdr
      .byte_headers()?
      .iter()
      .map(|h| String::from_utf8_lossy(h).into_owned())
      .collect();

    let mut rows = Vec::new();
    for record in rdr.byte_records() {
      let record = record?;
      rows.push(
        record
          .iter()
          .map(|cell| String::from_utf8_lossy(cell).into_owned())
          .collect(),
      );
    }
    Ok(Self { headers, rows })
  }
}

/// Records that parsed cleanly, plus the diagnostics for those that did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedInventory {
  pub records: Vec<InventoryRecord>,
  /// 1-based data row index of each record, parallel to `records`.
  pub row_indices: Vec<usize>,
  pub errors: Vec<ParseError>,
  pub warnings: Vec<DataQualityWarning>,
}

struct ColumnMap {
  vm_name: usize,
  os: usize,
  cpu: usize,
  ram: usize,
  power_state: usize,
  ip: Option<usize>,
}

fn resolve_columns(headers: &[String]) -> Result<ColumnMap, Vec<ParseError>> {
  let find = |name: &str| headers.iter().position(|h| h.trim() == name);

  let missing: Vec<ParseError> = REQUIRED_COLUMNS
    .iter()
    .filter(|c| find(c).is_none())
    .map(|c| ParseError::new(0, c, "required column is missing"))
    .collect();
  if !missing.is_empty() {
    return Err(missing);
  }

  // All required columns were found above.
  let at = |name: &str| find(name).unwrap_or_default();
  Ok(ColumnMap {
    vm_name: at(COL_VM_NAME),
    os: at(COL_OS),
    cpu: at(COL_CPU),
    ram: at(COL_RAM),
    power_state: at(COL_POWER_STATE),
    ip: find(COL_IP),
  })
}

/// Parse every row independently. A malformed row is reported and skipped;
/// it never aborts the batch.
pub fn parse_inventory(table: &RawTable) -> ParsedInventory {
  let mut out = ParsedInventory::default();

  let columns = match resolve_columns(&table.headers) {
    Ok(c) => c,
    Err(errors) => {
      tracing::warn!(missing = errors.len(), "inventory header is missing required columns");
      out.errors = errors;
      return out;
    }
  };

  let mut seen: HashMap<String, usize> = HashMap::new();

  for (i, row) in table.rows.iter().enumerate() {
    let row_index = i + 1;

    // Spreadsheet exports often end with empty rows.
    if row.iter().all(|cell| cell.trim().is_empty()) {
      continue;
    }

    match parse_row(row_index, row, &columns) {
      Ok(record) => {
        if let Some(first) = seen.get(&record.vm_name) {
          tracing::warn!(vm = %record.vm_name, row = row_index, first_row = *first, "duplicate VM name");
          out.warnings.push(DataQualityWarning {
            row_index,
            vm_name: record.vm_name.clone(),
            message: format!("duplicate VM name (first seen at row {})", first),
          });
        } else {
          seen.insert(record.vm_name.clone(), row_index);
        }
        out.records.push(record);
        out.row_indices.push(row_index);
      }
      Err(err) => {
        tracing::warn!(row = row_index, column = %err.column, "row excluded: {}", err.message);
        out.errors.push(err);
      }
    }
  }

  out
}

fn cell<'a>(row: &'a [String], idx: usize, row_index: usize, column: &str) -> Result<&'a str, ParseError> {
  row
    .get(idx)
    .map(|s| s.trim())
    .ok_or_else(|| ParseError::new(row_index, column, "missing value"))
}

fn parse_count<T: std::str::FromStr>(raw: &str, row_index: usize, column: &str) -> Result<T, ParseError> {
  if raw.is_empty() {
    return Err(ParseError::new(row_index, column, "missing value"));
  }
  // No sign, no whitespace, no separators.
  let parsed = COUNT.is_match(raw).then(|| raw.parse::<T>().ok()).flatten();
  parsed.ok_or_else(|| {
    ParseError::new(
      row_index,
      column,
      format!("expected a non-negative integer, got '{}'", raw),
    )
  })
}

fn parse_row(row_index: usize, row: &[String], cols: &ColumnMap) -> Result<InventoryRecord, ParseError> {
  let vm_name = cell(row, cols.vm_name, row_index, COL_VM_NAME)?;
  if vm_name.is_empty() {
    return Err(ParseError::new(row_index, COL_VM_NAME, "must not be empty"));
  }
  let os = cell(row, cols.os, row_index, COL_OS)?;
  let cpu_count = parse_count::<u32>(cell(row, cols.cpu, row_index, COL_CPU)?, row_index, COL_CPU)?;
  let ram_mb = parse_count::<u64>(cell(row, cols.ram, row_index, COL_RAM)?, row_index, COL_RAM)?;
  let power_state = PowerState::from_str_loose(cell(row, cols.power_state, row_index, COL_POWER_STATE)?);
  let primary_ip = cols
    .ip
    .and_then(|idx| row.get(idx))
    .and_then(|raw| first_ipv4(raw));

  Ok(InventoryRecord {
    vm_name: vm_name.to_string(),
    os: os.to_string(),
    cpu_count,
    ram_mb,
    power_state,
    primary_ip,
  })
}

/// First IPv4 address in a messy cell such as `"10.0.0.15, fe80::1"`.
pub fn first_ipv4(raw: &str) -> Option<String> {
  IPV4
    .find_iter(raw)
    .map(|m| m.as_str())
    .find(|candidate| candidate.split('.').all(|octet| octet.parse::<u8>().is_ok()))
    .map(str::to_string)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
    RawTable::new(
      headers.iter().map(|s| s.to_string()).collect(),
      rows
        .iter()
        .map(|r| r.iter().map(|s| s.to_string()).collect())
        .collect(),
    )
  }

  const HEADERS: [&str; 5] = ["VM Name", "OS", "CPU", "RAM", "Power State"];

  #[test]
  fn parses_valid_rows() {
    let t = table(
      &HEADERS,
      &[
        &["web01", "Windows Server 2019", "2", "4096", "poweredOn"],
        &["legacy01", "", "1", "512", "poweredOn"],
      ],
    );
    let parsed = parse_inventory(&t);
    assert!(parsed.errors.is_empty());
    assert_eq!(parsed.records.len(), 2);
    assert_eq!(parsed.records[0].cpu_count, 2);
    assert_eq!(parsed.records[0].ram_mb, 4096);
    assert_eq!(parsed.records[1].os, "");
    assert_eq!(parsed.row_indices, vec![1, 2]);
  }

  #[test]
  fn malformed_rows_are_collected_not_fatal() {
    let t = table(
      &HEADERS,
      &[
        &["a", "RHEL 8", "two", "4096", "poweredOn"],
        &["b", "RHEL 8", "2", "-1", "poweredOn"],
        &["", "RHEL 8", "2", "1024", "poweredOn"],
        &["c", "RHEL 8", "2"],
        &["d", "RHEL 8", "2", "1024", "poweredOn"],
      ],
    );
    let parsed = parse_inventory(&t);
    assert_eq!(parsed.records.len(), 1);
    assert_eq!(parsed.records[0].vm_name, "d");
    assert_eq!(parsed.row_indices, vec![5]);

    let cols: Vec<(usize, &str)> = parsed
      .errors
      .iter()
      .map(|e| (e.row_index, e.column.as_str()))
      .collect();
    assert_eq!(cols, vec![(1, "CPU"), (2, "RAM"), (3, "VM Name"), (4, "RAM")]);
  }

  #[test]
  fn missing_header_column_reports_row_zero() {
    let t = table(&["VM Name", "OS", "CPU", "Power State"], &[&["a", "x", "1", "poweredOn"]]);
    let parsed = parse_inventory(&t);
    assert!(parsed.records.is_empty());
    assert_eq!(parsed.errors, vec![ParseError::new(0, "RAM", "required column is missing")]);
  }

  #[test]
  fn header_match_is_case_sensitive() {
    let t = table(&["vm name", "OS", "CPU", "RAM", "Power State"], &[]);
    let parsed = parse_inventory(&t);
    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].column, "VM Name");
  }

  #[test]
  fn duplicates_warn_but_are_kept() {
    let t = table(
      &HEADERS,
      &[
        &["dup", "RHEL 8", "2", "1024", "poweredOn"],
        &["dup", "RHEL 8", "2", "1024", "poweredOn"],
      ],
    );
    let parsed = parse_inventory(&t);
    assert_eq!(parsed.records.len(), 2);
    assert_eq!(parsed.warnings.len(), 1);
    assert_eq!(parsed.warnings[0].row_index, 2);
    assert!(parsed.warnings[0].message.contains("row 1"));
  }

  #[test]
  fn blank_rows_are_skipped() {
    let t = table(&HEADERS, &[&["", "", "", "", ""], &["a", "RHEL 8", "1", "1", "poweredOn"]]);
    let parsed = parse_inventory(&t);
    assert!(parsed.errors.is_empty());
    assert_eq!(parsed.row_indices, vec![2]);
  }

  #[test]
  fn reads_csv_with_optional_ip() {
    let csv = "VM Name,OS,CPU,RAM,Power State,IP\n\
               web01,Windows Server 2019,2,4096,poweredOn,\"10.0.0.15, fe80::1\"\n\
               db01,RHEL 8,4,8192,poweredOn,\n";
    let t = RawTable::from_csv_reader(csv.as_bytes()).unwrap();
    let parsed = parse_inventory(&t);
    assert_eq!(parsed.records.len(), 2);
    assert_eq!(parsed.records[0].primary_ip.as_deref(), Some("10.0.0.15"));
    assert_eq!(parsed.records[1].primary_ip, None);
  }

  #[test]
  fn ipv4_extraction() {
    assert_eq!(first_ipv4("fe80::1, 192.168.1.10").as_deref(), Some("192.168.1.10"));
    assert_eq!(first_ipv4("999.1.1.1"), None);
    assert_eq!(first_ipv4("999.1.1.1; 10.1.2.3").as_deref(), Some("10.1.2.3"));
    assert_eq!(first_ipv4(""), None);
  }

  #[test]
  fn signed_counts_are_rejected() {
    let t = table(
      &HEADERS,
      &[
        &["a", "RHEL 8", "+2", "1024", "poweredOn"],
        &["b", "RHEL 8", "2", "+1024", "poweredOn"],
        &["c", "RHEL 8", "2", "1024", "poweredOn"],
      ],
    );
    let parsed = parse_inventory(&t);
    assert_eq!(parsed.records.len(), 1);
    assert_eq!(parsed.records[0].vm_name, "c");
    let cols: Vec<&str> = parsed.errors.iter().map(|e| e.column.as_str()).collect();
    assert_eq!(cols, vec!["CPU", "RAM"]);
    assert!(parsed.errors[0].message.contains("'+2'"));
  }
}
