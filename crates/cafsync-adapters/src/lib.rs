//! Extranet grid adapters: wire types, page-following and the four entity scrapers.

pub mod grid;
pub mod pager;
pub mod scrapers;

pub use grid::{
    decode_grid_body, GridQuery, GridResponse, GridRow, GridTransport, HttpGridTransport,
    DEFAULT_GRID_URL,
};
pub use pager::{Paged, PaginatedFetcher};
pub use scrapers::{
    level_metadata, scrape, status_is_validated, CertificationScraper, CompetencyScraper,
    EntityScraper, SkillLevelScraper, TrainingScraper,
};

pub const CRATE_NAME: &str = "cafsync-adapters";
