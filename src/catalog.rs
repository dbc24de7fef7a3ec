//! Read-only track catalog.
//!
//! The catalog service publishes two tab-separated tables: track metadata
//! (one row per track, including the data file URL) and a formats table
//! that maps each file format to its column layout. Rows without an
//! identifier or file URL are dropped.

use crate::formats::resolve_schema;
use crate::storage::Storage;
use crate::types::{ColumnSchema, Track};
use crate::{Error, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use tracing::{info, warn};

const COL_ID: &str = "identifier";
const COL_NAME: &str = "track_name";
const COL_ASSAY: &str = "assay";
const COL_TISSUE: &str = "tissue_category";
const COL_CELL_TYPE: &str = "cell_type";
const COL_SOURCE: &str = "data_source";
const COL_URL: &str = "processed_file_download_url";
const COL_FORMAT: &str = "file_format";

const COL_FORMATS_KEY: &str = "FILER_BED_format";
const COL_FORMATS_SCHEMA: &str = "FILER_BED_schema";

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
}

impl Catalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    /// Fetch and parse the catalog tables.
    ///
    /// The metadata table is required. The formats table is optional; when it
    /// cannot be read every track falls back to standard BED columns.
    pub async fn load(
        storage: &dyn Storage,
        metadata_url: &str,
        formats_url: Option<&str>,
    ) -> Result<Self> {
        let metadata = storage
            .read_to_string(metadata_url)
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("{}: {}", metadata_url, e)))?;

        let schemas = match formats_url {
            Some(url) => match storage.read_to_string(url).await {
                Ok(text) => parse_formats(&text)?,
                Err(e) => {
                    warn!("Formats table unavailable, using default columns: {}", e);
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let catalog = Self::new(parse_metadata(&metadata, &schemas)?);
        info!("Loaded catalog with {} tracks", catalog.len());
        Ok(catalog)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Uniform random subset of at most `count` tracks.
    pub fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Track> {
        let mut tracks = self.tracks.clone();
        tracks.shuffle(rng);
        tracks.truncate(count);
        tracks
    }
}

fn tsv_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes())
}

fn rows(text: &str) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = tsv_reader(text);
    let headers = reader
        .headers()
        .map_err(|e| Error::CatalogUnavailable(format!("bad table header: {}", e)))?
        .clone();

    let mut out = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| Error::CatalogUnavailable(format!("bad table row: {}", e)))?;
        let row = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.to_string(), v.trim().to_string()))
            .collect();
        out.push(row);
    }
    Ok(out)
}

/// Map file format name -> column layout.
pub fn parse_formats(text: &str) -> Result<HashMap<String, ColumnSchema>> {
    Ok(rows(text)?
        .into_iter()
        .filter_map(|row| {
            let key = row.get(COL_FORMATS_KEY)?.clone();
            let schema = row
                .get(COL_FORMATS_SCHEMA)
                .map(|s| resolve_schema(s))
                .unwrap_or_default();
            Some((key, schema))
        })
        .collect())
}

/// Parse the metadata table, joining each row's `file_format` against
/// `schemas`.
pub fn parse_metadata(text: &str, schemas: &HashMap<String, ColumnSchema>) -> Result<Vec<Track>> {
    let field = |row: &HashMap<String, String>, key: &str, default: &str| {
        row.get(key).cloned().unwrap_or_else(|| default.to_string())
    };

    Ok(rows(text)?
        .into_iter()
        .filter_map(|row| {
            let id = row.get(COL_ID)?.clone();
            let url = row.get(COL_URL)?.clone();
            let schema = row
                .get(COL_FORMAT)
                .and_then(|f| schemas.get(f))
                .copied()
                .unwrap_or_default();
            Some(Track {
                name: field(&row, COL_NAME, "Unnamed"),
                assay: field(&row, COL_ASSAY, "Unknown"),
                tissue: field(&row, COL_TISSUE, "Unknown"),
                cell_type: field(&row, COL_CELL_TYPE, "N/A"),
                source: field(&row, COL_SOURCE, "Unknown"),
                id,
                url,
                schema,
            })
        })
        .collect())
}
