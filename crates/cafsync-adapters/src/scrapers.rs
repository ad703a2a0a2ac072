//! The four entity scrapers: grid definition plus row-to-record mapping.

use cafsync_core::{
    is_club_member, normalize_date, non_blank, Certification, Competency, EntityKind, LevelMeta,
    LevelMetaTable, ScrapedSkillLevels, SkillLevel, TrainingSession,
};
use cafsync_storage::FetchError;
use scraper::{Html, Selector};
use serde_json::{Map, Value as JsonValue};
use tracing::info;

use crate::grid::{json_text, GridQuery, GridRow};
use crate::pager::{Paged, PaginatedFetcher};

/// Maps the rows of one grid to records of one entity kind.
pub trait EntityScraper: Send + Sync {
    type Record: Send;

    fn kind(&self) -> EntityKind;

    fn query(&self) -> GridQuery;

    fn transform(&self, row: &GridRow) -> Option<Self::Record>;
}

/// Fetches every page of the scraper's grid, keeping club members only. Rows of other
/// members never reach the transform.
pub async fn scrape<S: EntityScraper>(
    fetcher: &PaginatedFetcher,
    scraper: &S,
    club_prefixes: &[String],
) -> Result<Paged<S::Record>, FetchError> {
    let query = scraper.query();
    let paged = fetcher
        .fetch_all(&query, |row| {
            if is_club_member(&row.member(), club_prefixes) {
                scraper.transform(row)
            } else {
                None
            }
        })
        .await?;
    info!(
        kind = %scraper.kind(),
        kept = paged.items.len(),
        failed_pages = paged.failed_pages.len(),
        "scrape finished"
    );
    Ok(paged)
}

fn date(row: &GridRow, idx: usize) -> Option<String> {
    normalize_date(&row.cell(idx))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrainingScraper;

impl EntityScraper for TrainingScraper {
    type Record = TrainingSession;

    fn kind(&self) -> EntityKind {
        EntityKind::Training
    }

    fn query(&self) -> GridQuery {
        GridQuery::liste("adh_formations", "jqGrid_adh_formations_NOMCOMPLET")
    }

    fn transform(&self, row: &GridRow) -> Option<TrainingSession> {
        Some(TrainingSession {
            id: row.id.clone(),
            cafnum: row.cell(0),
            name: row.cell(1),
            code: row.cell(2),
            label: row.cell(3),
            validation_date: date(row, 4),
            number: row.cell(5),
            instructor: row.cell(6),
            location: row.cell(7),
            internal_id: row.cell(8),
            start_date: date(row, 9),
            end_date: date(row, 10),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CertificationScraper;

impl EntityScraper for CertificationScraper {
    type Record = Certification;

    fn kind(&self) -> EntityKind {
        EntityKind::Certification
    }

    fn query(&self) -> GridQuery {
        GridQuery::liste("adh_brevets", "jqGrid_adh_brevets_NOMCOMPLET")
    }

    fn transform(&self, row: &GridRow) -> Option<Certification> {
        // col_7 (internal id) and col_8 (comment) are not kept
        Some(Certification {
            id: row.id.clone(),
            cafnum: row.cell(0),
            name: row.cell(1),
            code: row.cell(2),
            label: row.cell(3),
            obtained_on: date(row, 4),
            recycled_on: date(row, 5),
            edited_on: date(row, 6),
            continuing_education_on: date(row, 9),
            migrated_on: date(row, 10),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SkillLevelScraper;

impl EntityScraper for SkillLevelScraper {
    type Record = SkillLevel;

    fn kind(&self) -> EntityKind {
        EntityKind::SkillLevel
    }

    fn query(&self) -> GridQuery {
        GridQuery::liste(
            "adh_niveaux_pratique",
            "jqGrid_adh_niveaux_pratique_nom_complet",
        )
    }

    /// Validator and discipline live in the metadata side-table and are filled in by
    /// [`SkillLevelScraper::scrape_with_metadata`].
    fn transform(&self, row: &GridRow) -> Option<SkillLevel> {
        Some(SkillLevel {
            id: row.id.clone(),
            cafnum: row.cell(0),
            name: row.cell(1),
            club: row.cell(2),
            activity_code: row.cell(4),
            activity: row.cell(5),
            level: row.cell(6),
            validation_date: date(row, 7),
            validated_by: String::new(),
            discipline: None,
        })
    }
}

impl SkillLevelScraper {
    pub async fn scrape_with_metadata(
        &self,
        fetcher: &PaginatedFetcher,
        club_prefixes: &[String],
    ) -> Result<ScrapedSkillLevels, FetchError> {
        let paged = scrape(fetcher, self, club_prefixes).await?;
        let metadata = level_metadata(&paged.cali_data);
        let records = paged
            .items
            .into_iter()
            .map(|mut level| {
                if let Some(meta) = metadata.get(&level.id) {
                    level.validated_by = meta.validated_by.clone().unwrap_or_default();
                    level.discipline = meta.discipline.clone();
                }
                level
            })
            .collect();
        Ok(ScrapedSkillLevels { records, metadata })
    }
}

/// Reads the `caliData` entries the skill-level grid sends next to its rows.
pub fn level_metadata(cali_data: &Map<String, JsonValue>) -> LevelMetaTable {
    let field = |entry: &JsonValue, key: &str| {
        entry
            .get(key)
            .map(json_text)
            .as_deref()
            .and_then(non_blank)
            .map(str::to_string)
    };
    cali_data
        .iter()
        .map(|(row_id, entry)| {
            (
                row_id.clone(),
                LevelMeta {
                    cursus_level_id: field(entry, "_BASE_cursus_niveau_pratique_id"),
                    validated_by: field(entry, "_BASE_validation_qui"),
                    discipline: field(entry, "_BASE_discipline"),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompetencyScraper;

impl EntityScraper for CompetencyScraper {
    type Record = Competency;

    fn kind(&self) -> EntityKind {
        EntityKind::Competency
    }

    fn query(&self) -> GridQuery {
        GridQuery::liste(
            "adh_groupe_competence",
            "jqGrid_adh_groupe_competence_nom_complet",
        )
    }

    fn transform(&self, row: &GridRow) -> Option<Competency> {
        Some(Competency {
            id: row.id.clone(),
            cafnum: row.cell(0),
            name: row.cell(1),
            activity_code: row.cell(4),
            activity: row.cell(5),
            title: row.cell(6),
            associated_level: row.cell(7),
            validation_date: date(row, 8),
            validated: status_is_validated(&row.cell(9)),
            validated_by: row.cell(10),
            comment: row.cell(11),
        })
    }
}

/// The status cell is an HTML icon; a green filled circle means validated.
pub fn status_is_validated(html: &str) -> bool {
    if html.is_empty() {
        return false;
    }
    let Ok(selector) = Selector::parse("[class]") else {
        return false;
    };
    let fragment = Html::parse_fragment(html);
    let mut green = false;
    let mut circle = false;
    for element in fragment.select(&selector) {
        for class in element.value().classes() {
            green |= class == "text-vert";
            circle |= class == "fa-circle";
        }
    }
    green && circle
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, cells: &[(usize, &str)]) -> GridRow {
        GridRow {
            id: id.to_string(),
            cell: cells
                .iter()
                .map(|(idx, v)| (format!("col_{idx}"), json!(v)))
                .collect(),
        }
    }

    #[test]
    fn training_columns_map_positionally() {
        let r = row(
            "7",
            &[
                (0, "690012345678"),
                (1, "DOE John"),
                (2, "STG-FEA10"),
                (3, "Initiateur SAE"),
                (4, "14/03/2023"),
                (5, "N-42"),
                (6, "SMITH"),
                (7, "Lyon"),
                (8, "I-9"),
                (9, "10/03/2023"),
                (10, "0000-00-00"),
            ],
        );
        let t = TrainingScraper.transform(&r).expect("record");
        assert_eq!(t.code, "STG-FEA10");
        assert_eq!(t.validation_date.as_deref(), Some("2023-03-14"));
        assert_eq!(t.start_date.as_deref(), Some("2023-03-10"));
        assert_eq!(t.end_date, None);
        assert_eq!(t.internal_id, "I-9");
        assert_eq!(t.location, "Lyon");
    }

    #[test]
    fn certification_skips_internal_columns() {
        let r = row(
            "1",
            &[
                (0, "690012345678"),
                (2, "BF1-ES-01"),
                (4, "01/02/2020"),
                (7, "internal"),
                (8, "comment"),
                (9, "2021-05-05"),
                (10, ""),
            ],
        );
        let c = CertificationScraper.transform(&r).expect("record");
        assert_eq!(c.obtained_on.as_deref(), Some("2020-02-01"));
        assert_eq!(c.continuing_education_on.as_deref(), Some("2021-05-05"));
        assert_eq!(c.migrated_on, None);
    }

    #[test]
    fn competency_status_needs_green_and_circle() {
        assert!(status_is_validated(
            r#"<i class="fa fa-circle text-vert"></i>"#
        ));
        assert!(status_is_validated(
            r#"<span class="text-vert"><i class="fa fa-circle"></i></span>"#
        ));
        assert!(!status_is_validated(
            r#"<i class="fa fa-circle text-rouge"></i>"#
        ));
        assert!(!status_is_validated(
            r#"<i class="fa fa-circle-o text-vert"></i>"#
        ));
        assert!(!status_is_validated(""));
    }

    #[test]
    fn competency_columns_map_positionally() {
        let r = row(
            "3",
            &[
                (0, "690012345678"),
                (4, "ES"),
                (5, "ESCALADE"),
                (6, "Assurer en moulinette"),
                (7, "INITIE en escalade sur SAE"),
                (8, "02/09/2022"),
                (9, r#"<i class="fa fa-circle text-vert"></i>"#),
                (10, "MARTIN"),
                (11, "ok"),
            ],
        );
        let c = CompetencyScraper.transform(&r).expect("record");
        assert_eq!(c.title, "Assurer en moulinette");
        assert!(c.validated);
        assert_eq!(c.validation_date.as_deref(), Some("2022-09-02"));
        assert_eq!(c.validated_by, "MARTIN");
    }

    #[test]
    fn level_metadata_reads_string_or_numeric_ids() {
        let cali = json!({
            "11": {"_BASE_cursus_niveau_pratique_id": 88, "_BASE_validation_qui": "DUPONT", "_BASE_discipline": "Piste"},
            "12": {"_BASE_cursus_niveau_pratique_id": "", "_BASE_validation_qui": null}
        });
        let table = level_metadata(cali.as_object().expect("object"));
        assert_eq!(table["11"].cursus_level_id.as_deref(), Some("88"));
        assert_eq!(table["11"].discipline.as_deref(), Some("Piste"));
        assert_eq!(table["12"].cursus_level_id, None);
        assert_eq!(table["12"].validated_by, None);
    }
}
