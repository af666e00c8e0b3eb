//! Guest OS string profiling: family, version, service pack, architecture.
//!
//! Inventory exports carry free-text guest OS names such as
//! `Microsoft Windows Server 2008 R2 (64-bit)` or `SUSE Linux Enterprise 11 SP4`.
//! Profiling turns them into comparable parts; the policy decides what they mean.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::FamilyPolicy;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// OS version compared as integers, so `8.10 > 8.9` and `22.04 < 22.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "VersionRepr")]
pub struct Version {
  pub major: u32,
  pub minor: u32,
}

impl Version {
  pub const fn new(major: u32, minor: u32) -> Self {
    Self { major, minor }
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.minor == 0 {
      write!(f, "{}", self.major)
    } else {
      write!(f, "{}.{}", self.major, self.minor)
    }
  }
}

impl FromStr for Version {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let mut parts = s.split('.');
    let major = parts
      .next()
      .filter(|p| !p.is_empty())
      .ok_or_else(|| format!("empty version '{}'", s))?
      .parse::<u32>()
      .map_err(|_| format!("invalid version '{}'", s))?;
    let minor = match parts.next() {
      Some(p) => p
        .parse::<u32>()
        .map_err(|_| format!("invalid version '{}'", s))?,
      None => 0,
    };
    if parts.next().is_some() {
      return Err(format!("invalid version '{}': expected major[.minor]", s));
    }
    Ok(Self { major, minor })
  }
}

impl Serialize for Version {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// YAML may spell a version as `"8.10"` or as a bare integer `2019`.
/// Unquoted dotted numbers are floats by then and are rejected.
#[derive(Deserialize)]
#[serde(untagged)]
enum VersionRepr {
  Text(String),
  Integer(u32),
  Float(f64),
}

impl TryFrom<VersionRepr> for Version {
  type Error = String;

  fn try_from(repr: VersionRepr) -> Result<Self, Self::Error> {
    match repr {
      VersionRepr::Text(s) => s.parse(),
      VersionRepr::Integer(major) => Ok(Version::new(major, 0)),
      // 24.10 would already have become 24.1.
      VersionRepr::Float(f) => Err(format!(
        "dotted version {} must be quoted (\"major.minor\") so the minor part is kept",
        f
      )),
    }
  }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Parsed view of a guest OS string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsProfile {
  /// Lowercased text with parenthesized metadata removed.
  pub normalized: String,
  /// Name of the first policy family whose pattern matched.
  pub family: Option<String>,
  pub version: Option<Version>,
  pub service_pack: Option<u32>,
  /// 32 or 64 when the string states an architecture.
  pub bits: Option<u8>,
}

impl OsProfile {
  pub fn is_blank(&self) -> bool {
    self.normalized.is_empty()
  }
}

static ARCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(32|64)[-\s]?bit\b").unwrap());
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20[0-9]{2}|[0-9]{1,2}(?:\.[0-9]+)?)\b").unwrap());
static R2: Lazy<Regex> = Lazy::new(|| Regex::new(r"\br2\b").unwrap());
static SERVICE_PACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:sp|service\s+pack)\s*([0-9]+)\b").unwrap());

/// Profile an OS string against the configured families (first match wins).
pub fn profile(os: &str, families: &[FamilyPolicy]) -> OsProfile {
  let lower = os.trim().to_lowercase();
  let bits = ARCH
    .captures(&lower)
    .and_then(|c| c[1].parse::<u8>().ok());
  let without_arch = ARCH.replace_all(&lower, " ");
  let normalized = collapse_whitespace(&PARENTHESIZED.replace_all(&without_arch, " "));

  let family = families
    .iter()
    .find(|f| f.patterns.iter().any(|p| normalized.contains(p.as_str())))
    .map(|f| f.name.clone());

  let version = extract_version(&normalized);
  let service_pack = extract_service_pack(&normalized);

  OsProfile {
    normalized,
    family,
    version,
    service_pack,
    bits,
  }
}

fn collapse_whitespace(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First standalone year (`20xx`) or `d[d][.d]` number.
/// `R2` bumps a year-style version to minor 1 (`2008 R2` > `2008`).
fn extract_version(normalized: &str) -> Option<Version> {
  let raw = VERSION.captures(normalized)?.get(1)?.as_str();
  let version: Version = raw.parse().ok()?;
  if !raw.contains('.') && raw.len() == 4 && R2.is_match(normalized) {
    return Some(Version::new(version.major, 1));
  }
  Some(version)
}

/// `sp4`, `sp 4`, or `service pack 4`.
fn extract_service_pack(normalized: &str) -> Option<u32> {
  SERVICE_PACK.captures(normalized)?[1].parse().ok()
}
