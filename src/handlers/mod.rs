mod indexed;
mod overlaps;
mod service_info;

pub use indexed::indexed_overlaps;
pub use overlaps::stream_overlaps;
pub use service_info::service_info;

use crate::Error;
use crate::query::QueryEngine;
use axum::{Router, extract::rejection::QueryRejection, routing::get};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/overlaps", get(stream_overlaps))
        .route("/api/indexed-overlaps", get(indexed_overlaps))
        .route("/", get(service_info))
        .route("/service-info", get(service_info))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Missing or non-numeric query parameters surface as `InvalidInput`.
fn invalid_query(rejection: QueryRejection) -> Error {
    Error::InvalidInput(rejection.body_text())
}
