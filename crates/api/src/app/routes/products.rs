use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};

use pricefeed_infra::store::ProductStore;
use pricefeed_products::ListQuery;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::RequestId;

/// Ingest the feed at `url` and report what changed.
pub async fn fetch_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<dto::FetchRequest>,
) -> axum::response::Response {
    tracing::info!(%request_id, url = %body.url, "feed fetch requested");

    match services.ingest.fetch(&body.url).await {
        Ok(summary) => (StatusCode::OK, Json(dto::FetchResponse::from(summary))).into_response(),
        Err(e) => errors::ingest_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::ListProductsParams>,
) -> axum::response::Response {
    let order_by = match params.order_by.as_deref().map(ListQuery::parse_order_by) {
        None => Vec::new(),
        Some(Ok(keys)) => keys,
        Some(Err(e)) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_order_by", e.to_string());
        }
    };
    let query = ListQuery::new(order_by, params.page_size, params.page_number);

    match services.store.list(&query).await {
        Ok(items) => (StatusCode::OK, Json(dto::ListProductsResponse { items })).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
