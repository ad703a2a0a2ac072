//! Typed run statistics, one struct per entity kind.

use serde::Serialize;

use crate::EntityKind;

/// Counters every importer maintains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub total: usize,
    pub imported: usize,
    pub ignored: usize,
    pub errors: usize,
}

pub trait EntityCounters {
    fn counters(&self) -> &Counters;
    fn counters_mut(&mut self) -> &mut Counters;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrainingStats {
    #[serde(flatten)]
    pub counters: Counters,
    pub missing_number: usize,
    pub missing_instructor: usize,
    pub missing_location: usize,
    pub missing_dates: usize,
    pub missing_code: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificationStats {
    #[serde(flatten)]
    pub counters: Counters,
    pub missing_code: usize,
    pub missing_obtained_date: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkillLevelStats {
    #[serde(flatten)]
    pub counters: Counters,
    pub missing_cursus_id: usize,
    pub non_standard_level: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompetencyStats {
    #[serde(flatten)]
    pub counters: Counters,
    pub missing_title: usize,
}

macro_rules! impl_entity_counters {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl EntityCounters for $ty {
                fn counters(&self) -> &Counters {
                    &self.counters
                }

                fn counters_mut(&mut self) -> &mut Counters {
                    &mut self.counters
                }
            }
        )+
    };
}

impl_entity_counters!(TrainingStats, CertificationStats, SkillLevelStats, CompetencyStats);

/// Statistics for one entity phase, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityStats {
    Training(TrainingStats),
    Certification(CertificationStats),
    SkillLevel(SkillLevelStats),
    Competency(CompetencyStats),
}

impl EntityStats {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityStats::Training(_) => EntityKind::Training,
            EntityStats::Certification(_) => EntityKind::Certification,
            EntityStats::SkillLevel(_) => EntityKind::SkillLevel,
            EntityStats::Competency(_) => EntityKind::Competency,
        }
    }

    pub fn counters(&self) -> &Counters {
        match self {
            EntityStats::Training(s) => s.counters(),
            EntityStats::Certification(s) => s.counters(),
            EntityStats::SkillLevel(s) => s.counters(),
            EntityStats::Competency(s) => s.counters(),
        }
    }

    /// Anomaly counters as `(name, count)` pairs, for summaries.
    pub fn anomalies(&self) -> Vec<(&'static str, usize)> {
        match self {
            EntityStats::Training(s) => vec![
                ("missing_number", s.missing_number),
                ("missing_instructor", s.missing_instructor),
                ("missing_location", s.missing_location),
                ("missing_dates", s.missing_dates),
                ("missing_code", s.missing_code),
            ],
            EntityStats::Certification(s) => vec![
                ("missing_code", s.missing_code),
                ("missing_obtained_date", s.missing_obtained_date),
            ],
            EntityStats::SkillLevel(s) => vec![
                ("missing_cursus_id", s.missing_cursus_id),
                ("non_standard_level", s.non_standard_level),
            ],
            EntityStats::Competency(s) => vec![("missing_title", s.missing_title)],
        }
    }
}

impl From<TrainingStats> for EntityStats {
    fn from(value: TrainingStats) -> Self {
        EntityStats::Training(value)
    }
}

impl From<CertificationStats> for EntityStats {
    fn from(value: CertificationStats) -> Self {
        EntityStats::Certification(value)
    }
}

impl From<SkillLevelStats> for EntityStats {
    fn from(value: SkillLevelStats) -> Self {
        EntityStats::SkillLevel(value)
    }
}

impl From<CompetencyStats> for EntityStats {
    fn from(value: CompetencyStats) -> Self {
        EntityStats::Competency(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_flat_with_kind_tag() {
        let mut stats = SkillLevelStats::default();
        stats.counters_mut().total = 3;
        stats.missing_cursus_id = 1;

        let value = serde_json::to_value(EntityStats::from(stats)).expect("serialize");
        assert_eq!(value["kind"], "skill_level");
        assert_eq!(value["total"], 3);
        assert_eq!(value["missing_cursus_id"], 1);
        assert_eq!(value["errors"], 0);
    }

    #[test]
    fn dispatch_reaches_the_common_counters() {
        let mut stats = CertificationStats::default();
        stats.counters_mut().imported = 7;
        let tagged = EntityStats::from(stats);
        assert_eq!(tagged.kind(), EntityKind::Certification);
        assert_eq!(tagged.counters().imported, 7);
        assert_eq!(tagged.anomalies().len(), 2);
    }
}
