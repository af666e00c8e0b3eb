//! Binary entrypoint: read an inventory CSV, write JSON (or the template CSV).
//!
//! `classify` prints one BatchResponse JSON object to stdout.
//! `template` writes the MGN import CSV and prints a short JSON receipt.
//! Failures print an ErrorOutput JSON object to stdout; logs go to stderr.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use migration_classifier::summary::group_by_decision;
use migration_classifier::template::{self, TEMPLATE_FILENAME};
use migration_classifier::types::{DataQualityWarning, ErrorOutput};
use migration_classifier::{Config, DecisionFilter, Engine, EngineError, Pipeline};

/// Classify a VM inventory into AWS migration strategies.
#[derive(Parser, Debug)]
#[command(name = "migration-classifier", version, about)]
struct Cli {
  /// Emit log lines as JSON.
  #[arg(long, global = true)]
  log_json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Args, Debug)]
struct InputArgs {
  /// Inventory CSV path, or `-` for stdin.
  #[arg(long, short, default_value = "-")]
  input: String,

  /// Policy YAML. The built-in policy is used when absent.
  #[arg(long, env = "MIGRATION_POLICY")]
  policy: Option<PathBuf>,

  /// Worker threads for classification.
  #[arg(long, default_value_t = 1)]
  workers: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Classify the inventory and print the dashboard JSON.
  Classify {
    #[command(flatten)]
    input: InputArgs,

    /// Only include rows with this decision in `data` (ALL for no filter).
    #[arg(long, default_value = "ALL")]
    filter: DecisionFilter,

    /// Print rows grouped by decision instead of the flat response.
    #[arg(long)]
    grouped: bool,
  },
  /// Write the MGN import template for the MGN-ready VMs.
  Template {
    #[command(flatten)]
    input: InputArgs,

    /// Target AWS account id (12 digits).
    #[arg(long)]
    account_id: String,

    /// Target AWS region code, e.g. us-east-1.
    #[arg(long)]
    region: String,

    /// Output path, or `-` for stdout.
    #[arg(long, short, default_value = TEMPLATE_FILENAME)]
    output: String,
  },
}

#[derive(Serialize)]
struct TemplateReceipt<'a> {
  batch_id: &'a str,
  file: &'a str,
  rows: usize,
  warnings: &'a [DataQualityWarning],
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.log_json);

  let stdout = io::stdout();
  let mut out = BufWriter::new(stdout.lock());

  let code = match run(cli.command, &mut out) {
    Ok(()) => 0,
    Err(e) => {
      let (err, code) = match e.downcast_ref::<EngineError>() {
        Some(EngineError::Validation { field, reason }) => {
          (ErrorOutput::new(reason.clone()).with_field(field.clone()), 1)
        }
        Some(EngineError::Csv(c)) if c.is_io_error() => (ErrorOutput::new(format!("{:#}", e)), 2),
        _ if e.downcast_ref::<io::Error>().is_some() => (ErrorOutput::new(format!("{:#}", e)), 2),
        _ => (ErrorOutput::new(format!("{:#}", e)), 1),
      };
      tracing::error!("{:#}", e);
      let _ = serde_json::to_writer(&mut out, &err);
      let _ = writeln!(out);
      code
    }
  };

  let _ = out.flush();
  std::process::exit(code);
}

fn init_tracing(json: bool) {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr);
  if json {
    builder.json().init();
  } else {
    builder.init();
  }
}

fn run(command: Command, out: &mut impl Write) -> anyhow::Result<()> {
  match command {
    Command::Classify {
      input,
      filter,
      grouped,
    } => {
      let pipeline = build_pipeline(&input)?;
      let report = pipeline.run_csv(open_input(&input.input)?)?;
      if grouped {
        let data = report.data();
        serde_json::to_writer(&mut *out, &group_by_decision(&data))?;
      } else {
        serde_json::to_writer(&mut *out, &report.filtered_response(filter))?;
      }
      writeln!(out)?;
    }
    Command::Template {
      input,
      account_id,
      region,
      output,
    } => {
      let pipeline = build_pipeline(&input)?;
      let report = pipeline.run_csv(open_input(&input.input)?)?;
      let export = report.project(&account_id, &region)?;

      if output == "-" {
        template::write_csv(&export.rows, &mut *out)?;
      } else {
        let file = File::create(&output).with_context(|| format!("cannot create {}", output))?;
        template::write_csv(&export.rows, BufWriter::new(file))?;
        let receipt = TemplateReceipt {
          batch_id: &report.batch_id,
          file: &output,
          rows: export.rows.len(),
          warnings: &export.warnings,
        };
        serde_json::to_writer(&mut *out, &receipt)?;
        writeln!(out)?;
      }
    }
  }
  Ok(())
}

fn build_pipeline(args: &InputArgs) -> Result<Pipeline, EngineError> {
  let config = match &args.policy {
    Some(path) => Config::from_path(path)?,
    None => Config::default(),
  };
  let engine = Engine::new(config)?;
  Ok(Pipeline::new(engine).with_workers(args.workers))
}

fn open_input(path: &str) -> anyhow::Result<Box<dyn Read>> {
  if path == "-" {
    return Ok(Box::new(io::stdin()));
  }
  let file = File::open(path).with_context(|| format!("cannot read {}", path))?;
  Ok(Box::new(file))
}
