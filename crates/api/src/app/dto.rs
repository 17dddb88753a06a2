use serde::{Deserialize, Serialize};

use pricefeed_infra::ingest::IngestSummary;
use pricefeed_products::Product;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub url: String,
}

/// Query string of `GET /products`.
#[derive(Debug, Default, Deserialize)]
pub struct ListProductsParams {
    /// Comma-separated `field[:asc|desc]` list, applied in order.
    pub order_by: Option<String>,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub page_number: u32,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub rows: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl From<IngestSummary> for FetchResponse {
    fn from(summary: IngestSummary) -> Self {
        Self {
            rows: summary.rows,
            created: summary.created,
            updated: summary.updated,
            unchanged: summary.unchanged,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListProductsResponse {
    pub items: Vec<Product>,
}
