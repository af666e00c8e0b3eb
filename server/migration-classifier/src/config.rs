//! Classification policy: replication limits and OS allow/deny lists.
//!
//! The policy is data, not code. It loads from YAML (see `policy.yaml` next to
//! this crate's manifest) and falls back to the built-in default below.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::EngineError;
use crate::os::Version;

/// MGN replication caps. A VM above either cap is not agent-replicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationLimits {
  pub max_cpu: u32,
  pub max_ram_mb: u64,
}

impl Default for ReplicationLimits {
  fn default() -> Self {
    Self {
      max_cpu: 128,
      max_ram_mb: 4 * 1024 * 1024,
    }
  }
}

/// Inclusive version range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
  pub min: Version,
  pub max: Version,
}

impl VersionRange {
  pub const fn new(min: Version, max: Version) -> Self {
    Self { min, max }
  }

  pub fn contains(&self, v: Version) -> bool {
    self.min <= v && v <= self.max
  }
}

/// Minimum service pack for one major version (e.g. SLES 11 needs SP4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePackMinimum {
  pub major: u32,
  pub min_sp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  Windows,
  Linux,
}

/// Policy for one OS family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyPolicy {
  pub name: String,
  pub platform: Platform,
  /// Lowercase substrings that identify the family.
  pub patterns: Vec<String>,
  /// Versions supported for agent-based replication (MGN).
  #[serde(default)]
  pub agent_supported: Vec<VersionRange>,
  /// Versions supported for image import (VM Import/Export).
  #[serde(default)]
  pub import_supported: Vec<VersionRange>,
  #[serde(default)]
  pub service_pack_minimums: Vec<ServicePackMinimum>,
  /// Versions below this are end-of-life.
  #[serde(default)]
  pub end_of_life_before: Option<Version>,
}

impl FamilyPolicy {
  pub fn agent_supports(&self, v: Version) -> bool {
    self.agent_supported.iter().any(|r| r.contains(v))
  }

  pub fn import_supports(&self, v: Version) -> bool {
    self.import_supported.iter().any(|r| r.contains(v))
  }

  pub fn min_service_pack(&self, major: u32) -> Option<u32> {
    self
      .service_pack_minimums
      .iter()
      .find(|m| m.major == major)
      .map(|m| m.min_sp)
  }
}

/// Tunable classification policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub limits: ReplicationLimits,
  /// Lowercase substrings marking an end-of-life OS (REBUILD).
  #[serde(default)]
  pub end_of_life: Vec<String>,
  /// 32-bit Linux cannot be replicated or imported.
  #[serde(default = "default_true")]
  pub reject_32bit_linux: bool,
  /// Ordered: the first family whose pattern matches wins, so specific first.
  pub families: Vec<FamilyPolicy>,
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Parse, normalize, and validate a YAML policy.
  pub fn from_yaml_str(s: &str) -> Result<Self, EngineError> {
    let config: Config = serde_yaml::from_str(s)
      .map_err(|e| EngineError::configuration(format!("policy yaml: {}", e)))?;
    let config = config.normalized();
    config.validate()?;
    Ok(config)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
      EngineError::configuration(format!("cannot read policy {}: {}", path.display(), e))
    })?;
    Self::from_yaml_str(&raw)
  }

  /// Lowercase and trim patterns and deny-list entries.
  pub fn normalized(mut self) -> Self {
    fn clean(v: &mut [String]) {
      for p in v.iter_mut() {
        *p = p.trim().to_lowercase();
      }
    }
    clean(&mut self.end_of_life);
    for family in &mut self.families {
      family.name = family.name.trim().to_string();
      clean(&mut family.patterns);
    }
    self
  }

  pub fn validate(&self) -> Result<(), EngineError> {
    if self.limits.max_cpu == 0 {
      return Err(EngineError::configuration("limits.max_cpu must be positive"));
    }
    if self.limits.max_ram_mb == 0 {
      return Err(EngineError::configuration("limits.max_ram_mb must be positive"));
    }
    if self.families.is_empty() {
      return Err(EngineError::configuration("at least one OS family is required"));
    }
    if self.end_of_life.iter().any(|p| p.is_empty()) {
      return Err(EngineError::configuration("end_of_life entries must not be empty"));
    }

    let mut names = HashSet::new();
    for family in &self.families {
      if family.name.is_empty() {
        return Err(EngineError::configuration("family name must not be empty"));
      }
      if !names.insert(family.name.as_str()) {
        return Err(EngineError::configuration(format!(
          "duplicate family '{}'",
          family.name
        )));
      }
      if family.patterns.is_empty() || family.patterns.iter().any(|p| p.is_empty()) {
        return Err(EngineError::configuration(format!(
          "family '{}': patterns must be non-empty",
          family.name
        )));
      }
      for range in family.agent_supported.iter().chain(&family.import_supported) {
        if range.min > range.max {
          return Err(EngineError::configuration(format!(
            "family '{}': range {}..{} has min > max",
            family.name, range.min, range.max
          )));
        }
      }
    }
    Ok(())
  }

  pub fn family(&self, name: &str) -> Option<&FamilyPolicy> {
    self.families.iter().find(|f| f.name == name)
  }

  /// First deny-list entry contained in the normalized OS text.
  pub fn end_of_life_match(&self, normalized_os: &str) -> Option<&str> {
    self
      .end_of_life
      .iter()
      .find(|p| normalized_os.contains(p.as_str()))
      .map(String::as_str)
  }
}

fn range(min: (u32, u32), max: (u32, u32)) -> VersionRange {
  VersionRange::new(Version::new(min.0, min.1), Version::new(max.0, max.1))
}

fn family(name: &str, platform: Platform, patterns: &[&str]) -> FamilyPolicy {
  FamilyPolicy {
    name: name.to_string(),
    platform,
    patterns: patterns.iter().map(|p| p.to_string()).collect(),
    agent_supported: Vec::new(),
    import_supported: Vec::new(),
    service_pack_minimums: Vec::new(),
    end_of_life_before: None,
  }
}

impl Default for Config {
  fn default() -> Self {
    use Platform::{Linux, Windows};

    let windows = FamilyPolicy {
      agent_supported: vec![range((2008, 0), (2025, 0)), range((10, 0), (11, 0))],
      import_supported: vec![range((2003, 0), (2025, 0)), range((7, 0), (11, 0))],
      end_of_life_before: Some(Version::new(7, 0)),
      ..family("windows", Windows, &["windows"])
    };
    let rhel = FamilyPolicy {
      agent_supported: vec![range((6, 0), (9, 99))],
      import_supported: vec![range((5, 0), (9, 99))],
      end_of_life_before: Some(Version::new(5, 0)),
      ..family("rhel", Linux, &["red hat", "rhel"])
    };
    let centos = FamilyPolicy {
      agent_supported: vec![range((6, 0), (8, 99))],
      import_supported: vec![range((5, 0), (8, 99))],
      end_of_life_before: Some(Version::new(5, 0)),
      ..family("centos", Linux, &["centos"])
    };
    let oracle = FamilyPolicy {
      agent_supported: vec![range((6, 0), (9, 99))],
      import_supported: vec![range((6, 0), (9, 99))],
      ..family("oracle", Linux, &["oracle"])
    };
    let rocky = FamilyPolicy {
      agent_supported: vec![range((8, 0), (9, 99))],
      import_supported: vec![range((8, 0), (9, 99))],
      ..family("rocky", Linux, &["rocky"])
    };
    let amazon = FamilyPolicy {
      agent_supported: vec![range((2, 0), (2, 0)), range((2023, 0), (2023, 0))],
      ..family("amazon", Linux, &["amazon linux"])
    };
    let sles = FamilyPolicy {
      agent_supported: vec![range((11, 0), (15, 99))],
      import_supported: vec![range((11, 0), (15, 99))],
      service_pack_minimums: vec![ServicePackMinimum { major: 11, min_sp: 4 }],
      end_of_life_before: Some(Version::new(10, 0)),
      ..family("sles", Linux, &["suse", "sles"])
    };
    let ubuntu = FamilyPolicy {
      agent_supported: vec![range((14, 4), (24, 4))],
      import_supported: vec![range((12, 4), (24, 4))],
      end_of_life_before: Some(Version::new(12, 4)),
      ..family("ubuntu", Linux, &["ubuntu"])
    };
    let debian = FamilyPolicy {
      agent_supported: vec![range((8, 0), (12, 0))],
      import_supported: vec![range((6, 0), (12, 0))],
      ..family("debian", Linux, &["debian"])
    };

    Self {
      limits: ReplicationLimits::default(),
      end_of_life: [
        "windows nt",
        "windows 2000",
        "windows xp",
        "windows vista",
        "windows 95",
        "windows 98",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      reject_32bit_linux: true,
      families: vec![rhel, centos, oracle, rocky, amazon, sles, ubuntu, debian, windows],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_policy_is_valid() {
    Config::default().validate().unwrap();
  }

  #[test]
  fn shipped_policy_matches_default() {
    let shipped = Config::from_yaml_str(include_str!("../policy.yaml")).unwrap();
    assert_eq!(shipped, Config::default());
  }

  #[test]
  fn yaml_is_normalized() {
    let yaml = r#"
limits: { max_cpu: 8, max_ram_mb: 16384 }
end_of_life: ["  Windows XP "]
families:
  - name: windows
    platform: windows
    patterns: ["WINDOWS"]
    agent_supported: [{ min: 2012, max: 2022 }]
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(config.end_of_life, vec!["windows xp".to_string()]);
    assert_eq!(config.families[0].patterns, vec!["windows".to_string()]);
    assert!(config.reject_32bit_linux);
    assert!(config.families[0].agent_supports(Version::new(2019, 0)));
    assert!(!config.families[0].import_supports(Version::new(2019, 0)));
  }

  #[test]
  fn rejects_inverted_range() {
    let yaml = r#"
families:
  - name: rhel
    platform: linux
    patterns: ["rhel"]
    agent_supported: [{ min: "9.0", max: "6.0" }]
"#;
    let err = Config::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
    assert!(err.to_string().contains("min > max"));
  }

  #[test]
  fn rejects_unquoted_dotted_versions() {
    let yaml = r#"
families:
  - name: ubuntu
    platform: linux
    patterns: ["ubuntu"]
    agent_supported: [{ min: "14.04", max: 24.10 }]
"#;
    let err = Config::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
    assert!(err.to_string().contains("must be quoted"));
  }

  #[test]
  fn rejects_missing_families_and_bad_limits() {
    let err = Config::from_yaml_str("limits: { max_cpu: 4, max_ram_mb: 1024 }").unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));

    let config = Config {
      limits: ReplicationLimits {
        max_cpu: 0,
        max_ram_mb: 1024,
      },
      ..Config::default()
    };
    assert!(config.validate().unwrap_err().to_string().contains("max_cpu"));
  }

  #[test]
  fn rejects_duplicate_family_names() {
    let mut config = Config::default();
    let first = config.families[0].clone();
    config.families.push(first);
    assert!(config.validate().unwrap_err().to_string().contains("duplicate"));
  }

  #[test]
  fn sles_service_pack_minimum() {
    let config = Config::default();
    let sles = config.family("sles").unwrap();
    assert_eq!(sles.min_service_pack(11), Some(4));
    assert_eq!(sles.min_service_pack(12), None);
  }
}
