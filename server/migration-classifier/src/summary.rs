//! Aggregation over classified batches: decision counts, filtering, grouping.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::{ClassificationOutcome, ClassifiedVm, Decision};

/// Decision counts for one batch. Only decisions that occur are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
  pub total: u64,
  pub summary: BTreeMap<Decision, u64>,
}

impl Summary {
  pub fn count(&self, decision: Decision) -> u64 {
    self.summary.get(&decision).copied().unwrap_or(0)
  }
}

/// Single pass over the outcomes. The result does not depend on their order.
pub fn summarize<'a, I>(outcomes: I) -> Summary
where
  I: IntoIterator<Item = &'a ClassificationOutcome>,
{
  let mut out = Summary::default();
  for outcome in outcomes {
    *out.summary.entry(outcome.decision).or_insert(0) += 1;
    out.total += 1;
  }
  out
}

/// Dashboard filter: one decision, or the "no filter" sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecisionFilter {
  #[default]
  All,
  Only(Decision),
}

impl DecisionFilter {
  pub fn matches(self, decision: Decision) -> bool {
    match self {
      Self::All => true,
      Self::Only(d) => d == decision,
    }
  }
}

impl From<Option<Decision>> for DecisionFilter {
  fn from(d: Option<Decision>) -> Self {
    d.map_or(Self::All, Self::Only)
  }
}

impl FromStr for DecisionFilter {
  type Err = String;

  /// `""`, `ALL`, and `*` mean no filter.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() || s == "*" || s.eq_ignore_ascii_case("all") {
      return Ok(Self::All);
    }
    s.parse().map(Self::Only)
  }
}

impl fmt::Display for DecisionFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::All => f.write_str("ALL"),
      Self::Only(d) => write!(f, "{}", d),
    }
  }
}

/// Subset of the full batch matching `filter`. Always pass the unfiltered
/// batch; filtering a previous subset cannot widen back out.
pub fn filter_by_decision(batch: &[ClassifiedVm], filter: DecisionFilter) -> Vec<&ClassifiedVm> {
  batch.iter().filter(|vm| filter.matches(vm.decision)).collect()
}

/// Rows bucketed by decision, input order kept within each bucket.
pub fn group_by_decision(batch: &[ClassifiedVm]) -> BTreeMap<Decision, Vec<&ClassifiedVm>> {
  let mut groups: BTreeMap<Decision, Vec<&ClassifiedVm>> = BTreeMap::new();
  for vm in batch {
    groups.entry(vm.decision).or_default().push(vm);
  }
  groups
}
