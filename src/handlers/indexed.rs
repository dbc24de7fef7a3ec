use super::{AppState, invalid_query};
use crate::{
    Result,
    types::{GenomicRange, IndexedQuery, IndexedResponse},
};
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};

pub async fn indexed_overlaps(
    State(state): State<AppState>,
    query: std::result::Result<Query<IndexedQuery>, QueryRejection>,
) -> Result<Json<IndexedResponse>> {
    let Query(query) = query.map_err(invalid_query)?;
    let range = GenomicRange::new(query.chr, query.start, query.end)?;
    // An empty tissue parameter means no filter
    let tissue = query.tissue.filter(|t| !t.trim().is_empty());

    let response = state
        .engine
        .indexed_overlaps(&range, tissue, query.limit)
        .await?;
    Ok(Json(response))
}
