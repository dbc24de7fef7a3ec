//! Tab-delimited interval records and the BGZF files that carry them.
//!
//! Track files are BGZF-compressed BED-like tables. Which columns hold the
//! chromosome and coordinates depends on the track's [`ColumnSchema`].
//!
//! - [`bed`] - decompressing line readers over streams and prefixes

pub mod bed;

use crate::types::ColumnSchema;
use crate::{Error, Result};

/// Annotation columns kept per record after the coordinates
pub const EXTRA_COLUMNS: usize = 3;

const HEADER_PREFIXES: [&str; 4] = ["#", "track", "browser", "<!DOCTYPE"];

/// Comment, header, or an HTML error page served in place of data.
pub fn is_header_line(line: &str) -> bool {
    HEADER_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// A single parsed interval record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedRecord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub extra: Vec<String>,
}

/// Parse one data line with the given column layout.
///
/// Fails with [`Error::MalformedRecord`] on missing columns, non-numeric
/// coordinates, or an empty interval.
pub fn parse_record(line: &str, schema: &ColumnSchema) -> Result<BedRecord> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if fields.len() <= schema.max_column() {
        return Err(Error::MalformedRecord(format!(
            "expected more than {} columns, found {}",
            schema.max_column(),
            fields.len()
        )));
    }

    let start = parse_coordinate(fields[schema.start])?;
    let end = parse_coordinate(fields[schema.end])?;
    if end <= start {
        return Err(Error::MalformedRecord(format!(
            "empty interval {}-{}",
            start, end
        )));
    }

    let extra = fields
        .iter()
        .skip(schema.max_column() + 1)
        .take(EXTRA_COLUMNS)
        .map(|f| f.to_string())
        .collect();

    Ok(BedRecord {
        chrom: fields[schema.chrom].to_string(),
        start,
        end,
        extra,
    })
}

fn parse_coordinate(field: &str) -> Result<u64> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::MalformedRecord(format!("non-numeric coordinate: {:?}", field)))
}

/// Resolve a catalog schema descriptor to column positions.
///
/// Accepts the `bed4+19 interact` short name or a `;`-separated list of
/// column names; anything unrecognized is standard BED.
pub fn resolve_schema(descriptor: &str) -> ColumnSchema {
    let descriptor = descriptor.trim();
    if descriptor.eq_ignore_ascii_case("bed4+19 interact") {
        return ColumnSchema::INTERACT;
    }
    if !descriptor.contains(';') {
        return ColumnSchema::DEFAULT;
    }

    let cols: Vec<String> = descriptor.split(';').map(|c| c.to_lowercase()).collect();
    let chrom = cols
        .iter()
        .position(|c| c.contains("chrom") && !c.contains("start") && !c.contains("end"));
    let start = cols.iter().position(|c| c.contains("start"));
    let end = cols.iter().position(|c| c.contains("end"));

    match (chrom, start, end) {
        (Some(chrom), Some(start), Some(end)) => ColumnSchema { chrom, start, end },
        _ => ColumnSchema::DEFAULT,
    }
}
