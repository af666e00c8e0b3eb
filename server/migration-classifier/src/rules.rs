//! Ordered classification rules. Evaluated top-down; the first match wins.

use crate::config::{Config, FamilyPolicy, Platform};
use crate::os::{OsProfile, Version};
use crate::types::{Decision, InventoryRecord, Risk};

/// Everything a rule may look at for one record.
#[derive(Debug)]
pub struct Subject<'a> {
  pub record: &'a InventoryRecord,
  pub os: OsProfile,
  pub family: Option<&'a FamilyPolicy>,
}

impl Subject<'_> {
  fn os_label(&self) -> &str {
    self.record.os.trim()
  }
}

/// A rule's decision before it is stamped with the VM name and strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
  pub decision: Decision,
  pub risk: Risk,
  pub reason: String,
}

impl Verdict {
  fn new(decision: Decision, risk: Risk, reason: String) -> Self {
    Self {
      decision,
      risk,
      reason,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
  /// Powered-off or suspended VMs need a human before anything else.
  PowerState,
  /// Empty, unknown, or end-of-life OS.
  UnsupportedOs,
  /// OS and sizing fit agent-based replication.
  AgentReplication,
  /// OS fits image import but not agent replication.
  ImageImport,
}

pub const DEFAULT_RULES: [Rule; 4] = [
  Rule::PowerState,
  Rule::UnsupportedOs,
  Rule::AgentReplication,
  Rule::ImageImport,
];

impl Rule {
  pub fn name(self) -> &'static str {
    match self {
      Self::PowerState => "power_state",
      Self::UnsupportedOs => "unsupported_os",
      Self::AgentReplication => "agent_replication",
      Self::ImageImport => "image_import",
    }
  }

  pub fn evaluate(self, subject: &Subject<'_>, config: &Config) -> Option<Verdict> {
    match self {
      Self::PowerState => power_state(subject),
      Self::UnsupportedOs => unsupported_os(subject, config),
      Self::AgentReplication => agent_replication(subject, config),
      Self::ImageImport => image_import(subject, config),
    }
  }
}

fn power_state(subject: &Subject<'_>) -> Option<Verdict> {
  let state = &subject.record.power_state;
  if !state.is_inactive() {
    return None;
  }
  Some(Verdict::new(
    Decision::ActionRequired,
    Risk::Medium,
    format!(
      "VM is not running (power state {}); review before migration",
      state
    ),
  ))
}

fn unsupported_os(subject: &Subject<'_>, config: &Config) -> Option<Verdict> {
  let rebuild = |reason: String| Some(Verdict::new(Decision::Rebuild, Risk::High, reason));
  let os = subject.os_label();

  if subject.os.is_blank() {
    return rebuild("Unknown OS: the OS field is empty".to_string());
  }
  if let Some(entry) = config.end_of_life_match(&subject.os.normalized) {
    return rebuild(format!(
      "Unsupported OS '{}': {} is end-of-life",
      os, entry
    ));
  }
  let family = match subject.family {
    Some(f) => f,
    None => {
      return rebuild(format!(
        "Unknown OS '{}': not a recognized OS family",
        os
      ))
    }
  };
  if config.reject_32bit_linux && family.platform == Platform::Linux && subject.os.bits == Some(32) {
    return rebuild(format!(
      "Unsupported OS '{}': 32-bit Linux is not supported by AWS MGN",
      os
    ));
  }
  if let (Some(cutoff), Some(v)) = (family.end_of_life_before, subject.os.version) {
    if v < cutoff {
      return rebuild(format!(
        "Unsupported OS '{}': {} versions before {} are end-of-life",
        os, family.name, cutoff
      ));
    }
  }
  None
}

/// Why a recognized OS version cannot take the agent-replication path.
/// `None` means nothing blocks it.
fn agent_blocker(family: &FamilyPolicy, version: Version, subject: &Subject<'_>, config: &Config) -> Option<String> {
  if !family.agent_supports(version) {
    return Some(format!(
      "{} {} is not supported for agent-based replication",
      family.name, version
    ));
  }
  if let Some(min_sp) = family.min_service_pack(version.major) {
    match subject.os.service_pack {
      None => {
        return Some(format!(
          "{} {} requires SP{}+ and no service pack was detected",
          family.name, version.major, min_sp
        ))
      }
      Some(sp) if sp < min_sp => {
        return Some(format!(
          "{} {} SP{} is below the required SP{}",
          family.name, version.major, sp, min_sp
        ))
      }
      Some(_) => {}
    }
  }
  let record = subject.record;
  if record.cpu_count > config.limits.max_cpu {
    return Some(format!(
      "{} vCPU exceeds the MGN limit of {}",
      record.cpu_count, config.limits.max_cpu
    ));
  }
  if record.ram_mb > config.limits.max_ram_mb {
    return Some(format!(
      "{} MB RAM exceeds the MGN limit of {} MB",
      record.ram_mb, config.limits.max_ram_mb
    ));
  }
  None
}

fn agent_replication(subject: &Subject<'_>, config: &Config) -> Option<Verdict> {
  let family = subject.family?;
  let version = subject.os.version?;
  if agent_blocker(family, version, subject, config).is_some() {
    return None;
  }
  let record = subject.record;
  Some(Verdict::new(
    Decision::Mgn,
    Risk::Low,
    format!(
      "'{}' is supported for agent-based replication; {} vCPU / {} MB RAM within MGN limits",
      subject.os_label(),
      record.cpu_count,
      record.ram_mb
    ),
  ))
}

fn image_import(subject: &Subject<'_>, config: &Config) -> Option<Verdict> {
  let family = subject.family?;
  let version = subject.os.version?;
  if !family.import_supports(version) {
    return None;
  }
  let blocker = agent_blocker(family, version, subject, config)
    .unwrap_or_else(|| "agent-based replication not applicable".to_string());
  Some(Verdict::new(
    Decision::Import,
    Risk::Medium,
    format!(
      "'{}' can be imported as an image via VM Import/Export; {}",
      subject.os_label(),
      blocker
    ),
  ))
}

/// Verdict when no rule matched. Never an error.
pub fn fallback(subject: &Subject<'_>, config: &Config) -> Verdict {
  let detail = match (subject.family, subject.os.version) {
    (_, None) => "OS version not detected".to_string(),
    (Some(family), Some(version)) => agent_blocker(family, version, subject, config)
      .unwrap_or_else(|| format!("{} {} is outside the supported ranges", family.name, version)),
    (None, Some(_)) => "OS family not recognized".to_string(),
  };
  Verdict::new(
    Decision::Unclassified,
    Risk::High,
    format!(
      "No rule matched for '{}' ({}); flagged for manual review",
      subject.os_label(),
      detail
    ),
  )
}
