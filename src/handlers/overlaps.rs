use super::{AppState, invalid_query};
use crate::{
    Result,
    types::{GenomicRange, OverlapQuery, StreamResponse},
};
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};

pub async fn stream_overlaps(
    State(state): State<AppState>,
    query: std::result::Result<Query<OverlapQuery>, QueryRejection>,
) -> Result<Json<StreamResponse>> {
    let Query(query) = query.map_err(invalid_query)?;
    let range = GenomicRange::new(query.chr, query.start, query.end)?;

    let response = state.engine.stream_overlaps(&range, query.max_tracks).await?;
    Ok(Json(response))
}
