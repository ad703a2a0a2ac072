use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cafsync_adapters::{
    scrape, EntityScraper, GridQuery, GridRow, GridTransport, PaginatedFetcher, SkillLevelScraper,
};
use cafsync_core::EntityKind;
use cafsync_storage::FetchError;

struct OnePage(String);

#[async_trait]
impl GridTransport for OnePage {
    async fn fetch_page(&self, _query: &GridQuery, _page: u32) -> Result<String, FetchError> {
        Ok(self.0.clone())
    }
}

/// Counts how many rows reach the transform.
struct CountingScraper {
    seen: AtomicUsize,
}

impl EntityScraper for CountingScraper {
    type Record = String;

    fn kind(&self) -> EntityKind {
        EntityKind::Certification
    }

    fn query(&self) -> GridQuery {
        GridQuery::liste("adh_brevets", "jqGrid_adh_brevets_NOMCOMPLET")
    }

    fn transform(&self, row: &GridRow) -> Option<String> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Some(row.member())
    }
}

fn fetcher(body: &str) -> PaginatedFetcher {
    PaginatedFetcher::new(Arc::new(OnePage(body.to_string())), Duration::ZERO)
}

#[tokio::test]
async fn non_members_never_reach_the_transform() {
    let body = r#"{"page":1,"total":1,"records":4,"rows":[
        {"id":"1","cell":{"col_0":"690012345678"}},
        {"id":"2","cell":{"col_0":"740012345678"}},
        {"id":"3","cell":{"col_0":""}},
        {"id":"4","cell":{"col_0":"6901"}}
    ]}"#;
    let scraper = CountingScraper {
        seen: AtomicUsize::new(0),
    };
    let prefixes = vec!["6900".to_string(), "690".to_string()];

    let paged = scrape(&fetcher(body), &scraper, &prefixes)
        .await
        .expect("scrape");

    assert_eq!(paged.items, vec!["690012345678", "6901"]);
    assert_eq!(scraper.seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn skill_levels_are_enriched_from_cali_data() {
    let body = r#"{"page":1,"total":1,"records":2,"rows":[
        {"id":"11","cell":{"col_0":"690000000001","col_4":"SN","col_5":"SPORTS DE NEIGE","col_6":"INITIE ski","col_7":"05/01/2024"}},
        {"id":"12","cell":{"col_0":"690000000002","col_4":"ES","col_5":"ESCALADE","col_6":"PERFECTIONNE"}}
    ],"userData":{"caliData":{
        "11":{"_BASE_cursus_niveau_pratique_id":"501","_BASE_validation_qui":"DUPONT","_BASE_discipline":"Ski de Piste"}
    }}}"#;
    let prefixes = vec!["690".to_string()];

    let scraped = SkillLevelScraper
        .scrape_with_metadata(&fetcher(body), &prefixes)
        .await
        .expect("scrape");

    assert_eq!(scraped.records.len(), 2);
    let first = &scraped.records[0];
    assert_eq!(first.validated_by, "DUPONT");
    assert_eq!(first.discipline.as_deref(), Some("Ski de Piste"));
    assert_eq!(first.validation_date.as_deref(), Some("2024-01-05"));
    assert_eq!(
        scraped.metadata["11"].cursus_level_id.as_deref(),
        Some("501")
    );
    assert!(!scraped.metadata.contains_key("12"));
    assert_eq!(scraped.records[1].validated_by, "");
}

#[test]
fn each_scraper_targets_its_own_grid() {
    use cafsync_adapters::{CertificationScraper, CompetencyScraper, TrainingScraper};

    let defs = [
        (TrainingScraper.query(), "adh_formations", "jqGrid_adh_formations_NOMCOMPLET"),
        (CertificationScraper.query(), "adh_brevets", "jqGrid_adh_brevets_NOMCOMPLET"),
        (
            SkillLevelScraper.query(),
            "adh_niveaux_pratique",
            "jqGrid_adh_niveaux_pratique_nom_complet",
        ),
        (
            CompetencyScraper.query(),
            "adh_groupe_competence",
            "jqGrid_adh_groupe_competence_nom_complet",
        ),
    ];
    for (query, def, sidx) in defs {
        assert_eq!(query.def, def);
        assert_eq!(query.sidx, sidx);
        assert_eq!(query.mode, "liste");
        assert_eq!(query.sord, "asc");
    }
}
