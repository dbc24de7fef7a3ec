use super::AppState;
use crate::types::ServiceInfo;
use axum::{Json, extract::State};

pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    let engine = &state.engine;
    Json(ServiceInfo {
        name: "overlapr".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: Some(
            "Genomic region overlap queries over remote interval tracks".to_string(),
        ),
        catalog_tracks: engine.catalog().len(),
        boundary_index_tracks: engine.boundaries().map_or(0, |b| b.len()),
        indexed_query_available: engine.has_store(),
    })
}
