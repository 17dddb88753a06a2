use axum::{
    Router,
    routing::{get, post},
};

pub mod products;
pub mod system;

/// Router for the catalog endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/products", get(products::list_products))
        .route("/products/fetch", post(products::fetch_products))
}
