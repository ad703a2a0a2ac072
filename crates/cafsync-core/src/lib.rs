//! Core domain model for cafsync: scraped records, per-entity statistics and the
//! commission classifier.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod commission;
pub mod stats;

pub use commission::{Commission, CodeFamily, CodeRule, RULESET_VERSION};
pub use stats::{
    CertificationStats, CompetencyStats, Counters, EntityCounters, EntityStats, SkillLevelStats,
    TrainingStats,
};

pub const CRATE_NAME: &str = "cafsync-core";

/// Membership-number prefixes of the club when nothing else is configured.
pub const DEFAULT_CLUB_PREFIXES: &[&str] = &["6900", "690"];

/// The four record families pulled from the federation extranet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Training,
    Certification,
    SkillLevel,
    Competency,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Training,
        EntityKind::Certification,
        EntityKind::SkillLevel,
        EntityKind::Competency,
    ];

    /// Key used in the last-sync table and in reports.
    pub fn sync_key(self) -> &'static str {
        match self {
            EntityKind::Training => "formations",
            EntityKind::Certification => "brevets",
            EntityKind::SkillLevel => "niveaux_pratique",
            EntityKind::Competency => "competences",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Training => "training sessions",
            EntityKind::Certification => "certifications",
            EntityKind::SkillLevel => "skill levels",
            EntityKind::Competency => "competencies",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sync_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityKind(pub String);

impl fmt::Display for UnknownEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown entity kind `{}` (expected formations, brevets, niveaux or competences)",
            self.0
        )
    }
}

impl std::error::Error for UnknownEntityKind {}

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "formations" | "formation" | "training" => Ok(EntityKind::Training),
            "brevets" | "brevet" | "certification" | "certifications" => {
                Ok(EntityKind::Certification)
            }
            "niveaux" | "niveaux_pratique" | "skill-level" | "skill-levels" | "skill_level" => {
                Ok(EntityKind::SkillLevel)
            }
            "competences" | "competence" | "competency" | "competencies" => {
                Ok(EntityKind::Competency)
            }
            other => Err(UnknownEntityKind(other.to_string())),
        }
    }
}

/// A validated training session ("formation").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: String,
    pub cafnum: String,
    pub name: String,
    pub code: String,
    pub label: String,
    pub location: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub validation_date: Option<String>,
    pub number: String,
    pub instructor: String,
    pub internal_id: String,
}

/// A federation certification ("brevet").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    pub id: String,
    pub cafnum: String,
    pub name: String,
    pub code: String,
    pub label: String,
    pub obtained_on: Option<String>,
    pub recycled_on: Option<String>,
    pub edited_on: Option<String>,
    pub continuing_education_on: Option<String>,
    pub migrated_on: Option<String>,
}

/// A practice skill level ("niveau de pratique").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillLevel {
    pub id: String,
    pub cafnum: String,
    pub name: String,
    pub club: String,
    pub activity_code: String,
    pub activity: String,
    pub level: String,
    pub validation_date: Option<String>,
    pub validated_by: String,
    pub discipline: Option<String>,
}

/// A competency group validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competency {
    pub id: String,
    pub cafnum: String,
    pub name: String,
    pub activity_code: String,
    pub activity: String,
    pub title: String,
    pub associated_level: String,
    pub validation_date: Option<String>,
    pub validated: bool,
    pub validated_by: String,
    pub comment: String,
}

/// Out-of-band metadata the grid returns next to skill-level rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelMeta {
    pub cursus_level_id: Option<String>,
    pub validated_by: Option<String>,
    pub discipline: Option<String>,
}

/// Skill-level metadata keyed by grid row id.
pub type LevelMetaTable = BTreeMap<String, LevelMeta>;

/// Skill levels together with the metadata side-table needed to import them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedSkillLevels {
    pub records: Vec<SkillLevel>,
    pub metadata: LevelMetaTable,
}

/// Normalizes the extranet's date cells to `YYYY-MM-DD`.
///
/// `DD/MM/YYYY` is reordered (day and month zero-padded), ISO dates pass through, and
/// both the empty string and the `0000-00-00` sentinel become `None`. Anything else is
/// returned as-is.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "0000-00-00" {
        return None;
    }
    if is_iso_date(raw) {
        return Some(raw.to_string());
    }
    let parts: Vec<&str> = raw.split('/').collect();
    if let [day, month, year] = parts.as_slice() {
        return Some(format!("{year}-{month:0>2}-{day:0>2}"));
    }
    Some(raw.to_string())
}

fn is_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

/// True when `cafnum` starts with one of the club prefixes. Case-sensitive; empty
/// identifiers never match.
pub fn is_club_member<S: AsRef<str>>(cafnum: &str, prefixes: &[S]) -> bool {
    !cafnum.is_empty()
        && prefixes
            .iter()
            .any(|prefix| !prefix.as_ref().is_empty() && cafnum.starts_with(prefix.as_ref()))
}

/// Extracts the short level (`INITIE`, `PERFECTIONNE`, `SPECIALISE`) leading a level label.
pub fn short_level(level: &str) -> Option<&'static str> {
    ["INITIE", "PERFECTIONNE", "SPECIALISE"]
        .into_iter()
        .find(|short| level.starts_with(short))
}

/// Trims a cell and maps blank content to `None`.
pub fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
