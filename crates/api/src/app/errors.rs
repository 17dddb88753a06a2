use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use pricefeed_infra::ingest::IngestError;
use pricefeed_infra::store::StoreError;

pub fn ingest_error_to_response(err: IngestError) -> axum::response::Response {
    match &err {
        IngestError::Parse { .. } => json_error(StatusCode::BAD_REQUEST, "invalid_feed", err.to_string()),
        IngestError::Fetch(_) | IngestError::Read { .. } => {
            json_error(StatusCode::BAD_GATEWAY, "feed_unavailable", err.to_string())
        }
        IngestError::Lookup { .. } | IngestError::Persist { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
        }
        IngestError::Stage { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Rejected(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_query", msg),
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            other.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
