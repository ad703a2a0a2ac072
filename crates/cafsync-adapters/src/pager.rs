//! Page-following over the grid endpoint.

use std::sync::Arc;
use std::time::Duration;

use cafsync_storage::FetchError;
use serde_json::{Map, Value as JsonValue};
use tracing::{info, warn};

use crate::grid::{decode_grid_body, GridQuery, GridResponse, GridRow, GridTransport};

/// Items collected across every page, with the merged `caliData` side-table.
#[derive(Debug, Clone, Default)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub cali_data: Map<String, JsonValue>,
    pub total_pages: u32,
    pub records: u32,
    pub failed_pages: Vec<u32>,
}

#[derive(Clone)]
pub struct PaginatedFetcher {
    transport: Arc<dyn GridTransport>,
    page_delay: Duration,
}

impl PaginatedFetcher {
    pub fn new(transport: Arc<dyn GridTransport>, page_delay: Duration) -> Self {
        Self {
            transport,
            page_delay,
        }
    }

    async fn fetch_page(&self, query: &GridQuery, page: u32) -> Result<GridResponse, FetchError> {
        let body = self.transport.fetch_page(query, page).await?;
        decode_grid_body(&body, page)
    }

    /// Walks every page of `query`, keeping the rows `transform` maps to `Some`.
    ///
    /// Page 1 decides the page count and its failure is returned. A later page that fails
    /// is logged and skipped. `page_delay` is awaited after each successful page while
    /// pages remain.
    pub async fn fetch_all<T, F>(
        &self,
        query: &GridQuery,
        mut transform: F,
    ) -> Result<Paged<T>, FetchError>
    where
        F: FnMut(&GridRow) -> Option<T>,
    {
        let mut out = Paged {
            items: Vec::new(),
            cali_data: Map::new(),
            total_pages: 1,
            records: 0,
            failed_pages: Vec::new(),
        };

        let mut page = 1;
        while page <= out.total_pages {
            let response = match self.fetch_page(query, page).await {
                Ok(response) => response,
                Err(err) if page == 1 => return Err(err),
                Err(err) => {
                    warn!(
                        grid = query.def,
                        page,
                        total = out.total_pages,
                        error = %err,
                        "page failed, skipping"
                    );
                    out.failed_pages.push(page);
                    page += 1;
                    continue;
                }
            };

            if page == 1 {
                out.total_pages = response.total;
                out.records = response.records;
                info!(
                    grid = query.def,
                    records = response.records,
                    pages = response.total,
                    "grid size"
                );
            }
            if let Some(cali) = response.cali_data() {
                out.cali_data
                    .extend(cali.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            out.items
                .extend(response.rows.iter().filter_map(&mut transform));
            info!(
                grid = query.def,
                page,
                total = out.total_pages,
                kept = out.items.len(),
                "page fetched"
            );

            page += 1;
            if page <= out.total_pages && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        Ok(out)
    }
}
