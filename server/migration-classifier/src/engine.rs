//! Rule engine: classifies inventory records against the policy. Holds no mutable state.

use std::num::NonZeroUsize;
use std::thread;

use crate::config::Config;
use crate::error::EngineError;
use crate::os;
use crate::rules::{self, Rule, Subject, DEFAULT_RULES};
use crate::types::*;

/// Batches smaller than this are classified on the calling thread.
const MIN_PARALLEL_BATCH: usize = 256;

/// The classification engine. Immutable after construction, so it is `Sync`.
#[derive(Debug, Clone)]
pub struct Engine {
  config: Config,
  rules: Vec<Rule>,
}

impl Engine {
  /// Validate the policy and build an engine with the default rule order.
  pub fn new(config: Config) -> Result<Self, EngineError> {
    Self::with_rules(config, DEFAULT_RULES.to_vec())
  }

  /// Build an engine with a custom rule order.
  pub fn with_rules(config: Config, rules: Vec<Rule>) -> Result<Self, EngineError> {
    config.validate()?;
    if rules.is_empty() {
      return Err(EngineError::configuration("rule list must not be empty"));
    }
    Ok(Self { config, rules })
  }

  pub fn with_defaults() -> Self {
    Self {
      config: Config::default(),
      rules: DEFAULT_RULES.to_vec(),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn rules(&self) -> &[Rule] {
    &self.rules
  }

  /// Classify one record. Total: every record gets exactly one outcome.
  pub fn classify(&self, record: &InventoryRecord) -> ClassificationOutcome {
    let profile = os::profile(&record.os, &self.config.families);
    let family = profile
      .family
      .as_deref()
      .and_then(|name| self.config.family(name));
    let subject = Subject {
      record,
      os: profile,
      family,
    };

    let verdict = self
      .rules
      .iter()
      .find_map(|rule| rule.evaluate(&subject, &self.config))
      .unwrap_or_else(|| rules::fallback(&subject, &self.config));

    ClassificationOutcome {
      vm_name: record.vm_name.clone(),
      decision: verdict.decision,
      risk: verdict.risk,
      strategy: verdict.decision.strategy().to_string(),
      reason: verdict.reason,
    }
  }

  /// Classify a batch, preserving input order.
  ///
  /// With `workers > 1` and a large enough batch, contiguous chunks are
  /// classified on scoped threads. `workers` is capped at the available
  /// parallelism. The result is identical either way.
  pub fn classify_batch(&self, records: &[InventoryRecord], workers: usize) -> Vec<ClassificationOutcome> {
    let workers = effective_workers(workers, records.len());
    if workers <= 1 || records.len() < MIN_PARALLEL_BATCH {
      return records.iter().map(|r| self.classify(r)).collect();
    }

    let chunk_size = records.len().div_ceil(workers);
    thread::scope(|scope| {
      let handles: Vec<_> = records
        .chunks(chunk_size)
        .map(|chunk| scope.spawn(move || chunk.iter().map(|r| self.classify(r)).collect::<Vec<_>>()))
        .collect();

      let mut out = Vec::with_capacity(records.len());
      for handle in handles {
        match handle.join() {
          Ok(part) => out.extend(part),
          Err(panic) => std::panic::resume_unwind(panic),
        }
      }
      out
    })
  }
}

fn effective_workers(requested: usize, records: usize) -> usize {
  let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
  requested.min(cores).min(records)
}

impl Default for Engine {
  fn default() -> Self {
    Self::with_defaults()
  }
}
