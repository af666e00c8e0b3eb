//! Batch pipeline: parse inventory, classify, aggregate, optionally project a template.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::inventory::{self, RawTable};
use crate::summary::{self, DecisionFilter, Summary};
use crate::template::{self, TemplateExport};
use crate::types::*;

/// Orchestrates one inventory upload. Holds no per-batch state.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
  engine: Engine,
  workers: usize,
}

impl Pipeline {
  pub fn new(engine: Engine) -> Self {
    Self { engine, workers: 1 }
  }

  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers.max(1);
    self
  }

  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  /// Read CSV and run the batch. Errors only when the input cannot be read.
  pub fn run_csv<R: Read>(&self, reader: R) -> Result<BatchReport, EngineError> {
    let table = RawTable::from_csv_reader(reader)?;
    Ok(self.run(&table))
  }

  /// Parse, classify, and aggregate one in-memory table.
  pub fn run(&self, table: &RawTable) -> BatchReport {
    let parsed = inventory::parse_inventory(table);
    tracing::debug!(
      rows = table.rows.len(),
      records = parsed.records.len(),
      errors = parsed.errors.len(),
      "inventory parsed"
    );

    let outcomes = self.engine.classify_batch(&parsed.records, self.workers);
    let summary = summary::summarize(&outcomes);
    let batch_id = batch_id(&parsed.records, &outcomes);

    tracing::info!(
      batch = %batch_id,
      total = summary.total,
      excluded = parsed.errors.len(),
      "batch classified"
    );

    BatchReport {
      batch_id,
      records: parsed.records,
      row_indices: parsed.row_indices,
      outcomes,
      summary,
      diagnostics: parsed.errors,
      warnings: parsed.warnings,
    }
  }
}

/// Stable id for a classified batch: same rows and outcomes, same id.
fn batch_id(records: &[InventoryRecord], outcomes: &[ClassificationOutcome]) -> String {
  let mut hasher = blake3::Hasher::new();
  for (record, outcome) in records.iter().zip(outcomes) {
    hasher.update(record.vm_name.as_bytes());
    hasher.update(b"|");
    hasher.update(record.os.as_bytes());
    hasher.update(b"|");
    hasher.update(record.cpu_count.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(record.ram_mb.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(record.power_state.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(outcome.decision.as_str().as_bytes());
    hasher.update(b"\n");
  }
  let hex = hasher.finalize().to_hex();
  format!("batch-{}", &hex[..16])
}

/// Result of one batch. Immutable; every query is recomputed from it.
#[derive(Debug, Clone)]
pub struct BatchReport {
  pub batch_id: String,
  pub records: Vec<InventoryRecord>,
  /// 1-based source row of each record.
  pub row_indices: Vec<usize>,
  pub outcomes: Vec<ClassificationOutcome>,
  pub summary: Summary,
  pub diagnostics: Vec<ParseError>,
  pub warnings: Vec<DataQualityWarning>,
}

/// Outbound classification shape consumed by the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
  pub batch_id: String,
  pub total: u64,
  pub summary: BTreeMap<Decision, u64>,
  pub data: Vec<ClassifiedVm>,
  pub diagnostics: Vec<ParseError>,
  pub warnings: Vec<DataQualityWarning>,
}

impl BatchReport {
  /// Records merged with their outcomes, in input order.
  pub fn data(&self) -> Vec<ClassifiedVm> {
    self
      .records
      .iter()
      .zip(&self.outcomes)
      .map(|(r, o)| ClassifiedVm::merge(r, o))
      .collect()
  }

  pub fn response(&self) -> BatchResponse {
    BatchResponse {
      batch_id: self.batch_id.clone(),
      total: self.summary.total,
      summary: self.summary.summary.clone(),
      data: self.data(),
      diagnostics: self.diagnostics.clone(),
      warnings: self.warnings.clone(),
    }
  }

  /// Response whose `data` is narrowed by `filter`. Counts stay batch-wide.
  pub fn filtered_response(&self, filter: DecisionFilter) -> BatchResponse {
    let mut response = self.response();
    response.data.retain(|vm| filter.matches(vm.decision));
    response
  }

  /// Project MGN rows for `account_id` / `region`. A validation failure
  /// leaves this report untouched and usable.
  pub fn project(&self, account_id: &str, region: &str) -> Result<TemplateExport, EngineError> {
    let rows = template::project_template(&self.outcomes, &self.records, account_id, region)?;
    let warnings = template::lint_template(&rows);
    for w in &warnings {
      tracing::warn!(vm = %w.vm_name, "{}", w.message);
    }
    tracing::info!(batch = %self.batch_id, rows = rows.len(), "template projected");
    Ok(TemplateExport { rows, warnings })
  }
}
