//! Importers for the four entity kinds.

use async_trait::async_trait;
use cafsync_core::{
    non_blank, short_level, Certification, CertificationStats, Competency, CompetencyStats,
    EntityKind, LevelMetaTable, SkillLevel, SkillLevelStats, TrainingSession, TrainingStats,
};
use cafsync_storage::{DbValue, Store, StoreError, Upsert};
use tracing::warn;

use crate::import::{EntityImporter, ImportError, Persisted, Verdict};
use crate::linker::CommissionLinker;

/// Upserts a referential row and reads back its id.
async fn upsert_referential(
    store: &dyn Store,
    upsert: Upsert<'static>,
    params: Vec<DbValue>,
    select: &str,
    select_params: Vec<DbValue>,
    key: &str,
) -> Result<i64, ImportError> {
    let sql = store.dialect().upsert(&upsert);
    store.execute(&sql, &params).await?;
    let rows = store.query(select, &select_params).await?;
    rows.first()
        .and_then(|row| row.get_i64("id"))
        .ok_or_else(|| ImportError::MissingReferential {
            table: upsert.table,
            key: key.to_string(),
        })
}

fn log_link_failure(kind: EntityKind, key: &str, result: Result<usize, StoreError>) {
    if let Err(err) = result {
        warn!(kind = %kind, key, error = %err, "commission link failed");
    }
}

#[derive(Debug, Default)]
pub struct TrainingImporter;

#[async_trait]
impl EntityImporter for TrainingImporter {
    type Record = TrainingSession;
    type Stats = TrainingStats;

    fn kind(&self) -> EntityKind {
        EntityKind::Training
    }

    fn referential_key(&self, record: &TrainingSession) -> Option<String> {
        non_blank(&record.code).map(str::to_string)
    }

    fn record_id<'r>(&self, record: &'r TrainingSession) -> &'r str {
        &record.id
    }

    fn member<'r>(&self, record: &'r TrainingSession) -> &'r str {
        &record.cafnum
    }

    fn validate(&self, record: &TrainingSession, stats: &mut TrainingStats) -> Verdict {
        if record.number.is_empty() {
            stats.missing_number += 1;
        }
        if record.instructor.is_empty() {
            stats.missing_instructor += 1;
        }
        if record.location.is_empty() {
            stats.missing_location += 1;
        }
        if record.start_date.is_none() || record.end_date.is_none() {
            stats.missing_dates += 1;
        }
        if record.code.is_empty() {
            stats.missing_code += 1;
            return Verdict::Reject(format!("training {} has no code", record.id));
        }
        Verdict::Proceed
    }

    async fn persist(
        &mut self,
        record: &TrainingSession,
        store: &dyn Store,
        linker: &mut CommissionLinker<'_>,
    ) -> Result<Persisted, ImportError> {
        let label = non_blank(&record.label).unwrap_or(&record.code);
        let formation_id = upsert_referential(
            store,
            Upsert {
                table: "formation_referentiel_formation",
                columns: &["code_formation", "intitule"],
                conflict: &["code_formation"],
                update: &["intitule"],
                touch: &["updated_at"],
            },
            vec![record.code.as_str().into(), label.into()],
            "SELECT id FROM formation_referentiel_formation WHERE code_formation = ? LIMIT 1",
            vec![record.code.as_str().into()],
            &record.code,
        )
        .await?;

        let linked = linker.link_training(formation_id, &record.code).await;
        log_link_failure(self.kind(), &record.code, linked);

        let Some(user_id) = store.member_id(&record.cafnum).await? else {
            return Ok(Persisted::MemberNotFound);
        };

        let sql = store.dialect().upsert(&Upsert {
            table: "formation_validation_formation",
            columns: &[
                "user_id",
                "code_formation",
                "valide",
                "date_validation",
                "numero_formation",
                "formateur",
                "lieu",
                "date_debut",
                "date_fin",
                "id_interne",
                "intitule_formation",
            ],
            conflict: &["user_id", "code_formation", "id_interne"],
            update: &[
                "intitule_formation",
                "date_validation",
                "numero_formation",
                "formateur",
                "lieu",
                "date_debut",
                "date_fin",
            ],
            touch: &["updated_at"],
        });
        store
            .execute(
                &sql,
                &[
                    user_id.into(),
                    record.code.as_str().into(),
                    true.into(),
                    record.validation_date.clone().into(),
                    non_blank(&record.number).into(),
                    non_blank(&record.instructor).into(),
                    non_blank(&record.location).into(),
                    record.start_date.clone().into(),
                    record.end_date.clone().into(),
                    record.internal_id.as_str().into(),
                    label.into(),
                ],
            )
            .await?;
        Ok(Persisted::Imported)
    }
}

#[derive(Debug, Default)]
pub struct CertificationImporter;

#[async_trait]
impl EntityImporter for CertificationImporter {
    type Record = Certification;
    type Stats = CertificationStats;

    fn kind(&self) -> EntityKind {
        EntityKind::Certification
    }

    fn referential_key(&self, record: &Certification) -> Option<String> {
        non_blank(&record.code).map(str::to_string)
    }

    fn record_id<'r>(&self, record: &'r Certification) -> &'r str {
        &record.id
    }

    fn member<'r>(&self, record: &'r Certification) -> &'r str {
        &record.cafnum
    }

    fn validate(&self, record: &Certification, stats: &mut CertificationStats) -> Verdict {
        if record.obtained_on.is_none() {
            stats.missing_obtained_date += 1;
        }
        if record.code.is_empty() {
            stats.missing_code += 1;
            return Verdict::Reject(format!("certification {} has no code", record.id));
        }
        Verdict::Proceed
    }

    async fn persist(
        &mut self,
        record: &Certification,
        store: &dyn Store,
        linker: &mut CommissionLinker<'_>,
    ) -> Result<Persisted, ImportError> {
        let label = non_blank(&record.label).unwrap_or(&record.code);
        let brevet_id = upsert_referential(
            store,
            Upsert {
                table: "formation_referentiel_brevet",
                columns: &["code_brevet", "intitule"],
                conflict: &["code_brevet"],
                update: &["intitule"],
                touch: &["updated_at"],
            },
            vec![record.code.as_str().into(), label.into()],
            "SELECT id FROM formation_referentiel_brevet WHERE code_brevet = ? LIMIT 1",
            vec![record.code.as_str().into()],
            &record.code,
        )
        .await?;

        let linked = linker.link_certification(brevet_id, &record.code).await;
        log_link_failure(self.kind(), &record.code, linked);

        let Some(user_id) = store.member_id(&record.cafnum).await? else {
            return Ok(Persisted::MemberNotFound);
        };

        let sql = store.dialect().upsert(&Upsert {
            table: "formation_validation_brevet",
            columns: &[
                "user_id",
                "brevet_id",
                "date_obtention",
                "date_recyclage",
                "date_edition",
                "date_formation_continue",
                "date_migration",
            ],
            conflict: &["user_id", "brevet_id"],
            update: &[
                "date_obtention",
                "date_recyclage",
                "date_edition",
                "date_formation_continue",
                "date_migration",
            ],
            touch: &["updated_at"],
        });
        store
            .execute(
                &sql,
                &[
                    user_id.into(),
                    brevet_id.into(),
                    record.obtained_on.clone().into(),
                    record.recycled_on.clone().into(),
                    record.edited_on.clone().into(),
                    record.continuing_education_on.clone().into(),
                    record.migrated_on.clone().into(),
                ],
            )
            .await?;
        Ok(Persisted::Imported)
    }
}

/// Skill levels take their referential id from the metadata side-table scraped with them.
#[derive(Debug, Default)]
pub struct SkillLevelImporter {
    metadata: LevelMetaTable,
}

impl SkillLevelImporter {
    pub fn new(metadata: LevelMetaTable) -> Self {
        Self { metadata }
    }

    fn cursus_level_id(&self, record: &SkillLevel) -> Option<i64> {
        self.metadata
            .get(&record.id)
            .and_then(|meta| meta.cursus_level_id.as_deref())
            .and_then(|id| id.trim().parse().ok())
    }
}

#[async_trait]
impl EntityImporter for SkillLevelImporter {
    type Record = SkillLevel;
    type Stats = SkillLevelStats;

    fn kind(&self) -> EntityKind {
        EntityKind::SkillLevel
    }

    fn referential_key(&self, record: &SkillLevel) -> Option<String> {
        self.cursus_level_id(record).map(|id| id.to_string())
    }

    fn record_id<'r>(&self, record: &'r SkillLevel) -> &'r str {
        &record.id
    }

    fn member<'r>(&self, record: &'r SkillLevel) -> &'r str {
        &record.cafnum
    }

    fn validate(&self, record: &SkillLevel, stats: &mut SkillLevelStats) -> Verdict {
        if self.cursus_level_id(record).is_none() {
            stats.missing_cursus_id += 1;
            return Verdict::Skip;
        }
        if short_level(&record.level).is_none() {
            stats.non_standard_level += 1;
        }
        Verdict::Proceed
    }

    async fn persist(
        &mut self,
        record: &SkillLevel,
        store: &dyn Store,
        linker: &mut CommissionLinker<'_>,
    ) -> Result<Persisted, ImportError> {
        let Some(cursus_id) = self.cursus_level_id(record) else {
            return Err(ImportError::MissingReferential {
                table: "formation_referentiel_niveau_pratique",
                key: record.id.clone(),
            });
        };
        let key = cursus_id.to_string();
        let niveau_id = upsert_referential(
            store,
            Upsert {
                table: "formation_referentiel_niveau_pratique",
                columns: &[
                    "cursus_niveau_id",
                    "code_activite",
                    "activite",
                    "niveau",
                    "libelle",
                    "niveau_court",
                    "discipline",
                ],
                conflict: &["cursus_niveau_id"],
                update: &["libelle", "niveau_court", "discipline"],
                touch: &["updated_at"],
            },
            vec![
                cursus_id.into(),
                record.activity_code.as_str().into(),
                record.activity.as_str().into(),
                record.level.as_str().into(),
                record.level.as_str().into(),
                short_level(&record.level).into(),
                record.discipline.clone().into(),
            ],
            "SELECT id FROM formation_referentiel_niveau_pratique WHERE cursus_niveau_id = ? LIMIT 1",
            vec![cursus_id.into()],
            &key,
        )
        .await?;

        let linked = linker
            .link_skill_level(niveau_id, &record.activity, record.discipline.as_deref())
            .await;
        log_link_failure(self.kind(), &key, linked);

        let Some(user_id) = store.member_id(&record.cafnum).await? else {
            return Ok(Persisted::MemberNotFound);
        };

        let sql = store.dialect().upsert(&Upsert {
            table: "formation_validation_niveau_pratique",
            columns: &["user_id", "niveau_id", "date_validation", "valide_par"],
            conflict: &["user_id", "niveau_id"],
            update: &["date_validation", "valide_par"],
            touch: &["updated_at"],
        });
        store
            .execute(
                &sql,
                &[
                    user_id.into(),
                    niveau_id.into(),
                    record.validation_date.clone().into(),
                    non_blank(&record.validated_by).into(),
                ],
            )
            .await?;
        Ok(Persisted::Imported)
    }
}

#[derive(Debug, Default)]
pub struct CompetencyImporter;

#[async_trait]
impl EntityImporter for CompetencyImporter {
    type Record = Competency;
    type Stats = CompetencyStats;

    fn kind(&self) -> EntityKind {
        EntityKind::Competency
    }

    fn referential_key(&self, record: &Competency) -> Option<String> {
        let title = non_blank(&record.title)?;
        Some(match non_blank(&record.activity_code) {
            Some(code) => format!("{code}/{title}"),
            None => title.to_string(),
        })
    }

    fn record_id<'r>(&self, record: &'r Competency) -> &'r str {
        &record.id
    }

    fn member<'r>(&self, record: &'r Competency) -> &'r str {
        &record.cafnum
    }

    fn validate(&self, record: &Competency, stats: &mut CompetencyStats) -> Verdict {
        if record.title.is_empty() {
            stats.missing_title += 1;
            return Verdict::Skip;
        }
        Verdict::Proceed
    }

    async fn persist(
        &mut self,
        record: &Competency,
        store: &dyn Store,
        linker: &mut CommissionLinker<'_>,
    ) -> Result<Persisted, ImportError> {
        // an empty activity code is stored as '' so the unique key still applies
        let competence_id = upsert_referential(
            store,
            Upsert {
                table: "formation_referentiel_groupe_competence",
                columns: &["intitule", "code_activite", "activite"],
                conflict: &["intitule", "code_activite"],
                update: &["activite"],
                touch: &["updated_at"],
            },
            vec![
                record.title.as_str().into(),
                record.activity_code.as_str().into(),
                non_blank(&record.activity).into(),
            ],
            "SELECT id FROM formation_referentiel_groupe_competence \
             WHERE intitule = ? AND code_activite = ? LIMIT 1",
            vec![
                record.title.as_str().into(),
                record.activity_code.as_str().into(),
            ],
            &record.title,
        )
        .await?;

        let linked = linker.link_competency(competence_id, &record.activity).await;
        log_link_failure(self.kind(), &record.title, linked);

        let Some(user_id) = store.member_id(&record.cafnum).await? else {
            return Ok(Persisted::MemberNotFound);
        };

        let sql = store.dialect().upsert(&Upsert {
            table: "formation_validation_groupe_competence",
            columns: &[
                "user_id",
                "competence_id",
                "niveau_associe",
                "date_validation",
                "est_valide",
                "valide_par",
                "commentaire",
            ],
            conflict: &["user_id", "competence_id"],
            update: &[
                "niveau_associe",
                "date_validation",
                "est_valide",
                "valide_par",
                "commentaire",
            ],
            touch: &["updated_at"],
        });
        store
            .execute(
                &sql,
                &[
                    user_id.into(),
                    competence_id.into(),
                    non_blank(&record.associated_level).into(),
                    record.validation_date.clone().into(),
                    record.validated.into(),
                    non_blank(&record.validated_by).into(),
                    non_blank(&record.comment).into(),
                ],
            )
            .await?;
        Ok(Persisted::Imported)
    }
}
