//! Migration Classifier Engine: deterministic, rule-based.
//!
//! Parses a vSphere-style VM inventory, classifies each VM into an AWS
//! migration decision (MGN / IMPORT / ACTION_REQUIRED / REBUILD / UNCLASSIFIED),
//! aggregates decision counts, and projects MGN-ready VMs into an import
//! template scoped to an account and region.
//!
//! No AI, no DB, no network; pure computation over one inventory snapshot.

pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod os;
pub mod pipeline;
pub mod rules;
pub mod summary;
pub mod template;
pub mod types;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use inventory::{parse_inventory, RawTable};
pub use pipeline::{BatchReport, BatchResponse, Pipeline};
pub use summary::{filter_by_decision, summarize, DecisionFilter, Summary};
pub use template::{project_template, TemplateRow};
pub use types::{ClassificationOutcome, Decision, InventoryRecord, Risk};
