//! Links referential entries to the club's commissions.

use std::collections::HashMap;

use cafsync_core::commission::{
    commission_for_activity, commissions_for_certification, commissions_for_training,
};
use cafsync_core::Commission;
use cafsync_storage::{Store, StoreError};
use tracing::debug;

/// Link table and its referential column, one per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    Training,
    Certification,
    SkillLevel,
    Competency,
}

impl LinkTarget {
    pub fn table(self) -> &'static str {
        match self {
            LinkTarget::Training => "formation_commission_formation",
            LinkTarget::Certification => "formation_commission_brevet",
            LinkTarget::SkillLevel => "formation_commission_niveau_pratique",
            LinkTarget::Competency => "formation_commission_groupe_competence",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            LinkTarget::Training => "formation_id",
            LinkTarget::Certification => "brevet_id",
            LinkTarget::SkillLevel => "niveau_id",
            LinkTarget::Competency => "groupe_competence_id",
        }
    }
}

/// Classifies codes and writes the resulting commission links.
///
/// Commission ids are resolved once per run; unknown commissions are cached too. Without a
/// store (dry run) nothing is resolved or written and the classified count is returned.
pub struct CommissionLinker<'a> {
    store: Option<&'a dyn Store>,
    cache: HashMap<Commission, Option<i64>>,
}

impl<'a> CommissionLinker<'a> {
    pub fn new(store: Option<&'a dyn Store>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.store.is_none()
    }

    /// Number of commissions resolved so far, hits and misses.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub async fn commission_id(
        &mut self,
        commission: Commission,
    ) -> Result<Option<i64>, StoreError> {
        if let Some(id) = self.cache.get(&commission) {
            return Ok(*id);
        }
        let Some(store) = self.store else {
            return Ok(None);
        };

        let id = match store
            .query(
                "SELECT id_commission FROM caf_commission WHERE code_commission = ? LIMIT 1",
                &[commission.slug().into()],
            )
            .await
        {
            Ok(rows) => rows.first().and_then(|row| row.get_i64("id_commission")),
            Err(err) if err.is_missing_table() => {
                debug!(commission = %commission, "no commission table, links disabled");
                None
            }
            Err(err) => return Err(err),
        };
        if id.is_none() {
            debug!(commission = %commission, "commission not found");
        }
        self.cache.insert(commission, id);
        Ok(id)
    }

    /// Writes one link per resolvable commission and returns how many were written.
    /// Existing links count as written.
    pub async fn link(
        &mut self,
        target: LinkTarget,
        entity_id: i64,
        commissions: &[Commission],
    ) -> Result<usize, StoreError> {
        let Some(store) = self.store else {
            return Ok(commissions.len());
        };

        let sql = store
            .dialect()
            .insert_ignore(target.table(), &[target.column(), "commission_id"]);
        let mut linked = 0;
        for commission in commissions {
            let Some(commission_id) = self.commission_id(*commission).await? else {
                continue;
            };
            match store
                .execute(&sql, &[entity_id.into(), commission_id.into()])
                .await
            {
                Ok(_) => linked += 1,
                Err(err) if err.is_duplicate() => linked += 1,
                Err(err) if err.is_missing_table() => {
                    debug!(table = target.table(), "link table missing");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(linked)
    }

    pub async fn link_training(
        &mut self,
        formation_id: i64,
        code: &str,
    ) -> Result<usize, StoreError> {
        let commissions = commissions_for_training(code);
        self.link(LinkTarget::Training, formation_id, &commissions).await
    }

    pub async fn link_certification(
        &mut self,
        brevet_id: i64,
        code: &str,
    ) -> Result<usize, StoreError> {
        let commissions = commissions_for_certification(code);
        self.link(LinkTarget::Certification, brevet_id, &commissions)
            .await
    }

    pub async fn link_skill_level(
        &mut self,
        niveau_id: i64,
        activity: &str,
        discipline: Option<&str>,
    ) -> Result<usize, StoreError> {
        let commissions: Vec<Commission> = commission_for_activity(activity, discipline)
            .into_iter()
            .collect();
        self.link(LinkTarget::SkillLevel, niveau_id, &commissions)
            .await
    }

    pub async fn link_competency(
        &mut self,
        competency_id: i64,
        activity: &str,
    ) -> Result<usize, StoreError> {
        let commissions: Vec<Commission> =
            commission_for_activity(activity, None).into_iter().collect();
        self.link(LinkTarget::Competency, competency_id, &commissions)
            .await
    }
}
