use async_compression::tokio::bufread::GzipDecoder;
use bytes::Bytes;
use noodles::bgzf;
use std::io::{self, Cursor};
use std::pin::Pin;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, Lines};

/// Bytes needed to recognize a BGZF block header
const SNIFF_LEN: usize = 18;

/// Compression of a track file, decided from its first bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Bgzf,
    Gzip,
    None,
}

/// Line reader over a decompressed track file.
pub type TrackLines = Lines<Pin<Box<dyn AsyncBufRead + Send>>>;

/// Classify a file from its leading bytes.
///
/// BGZF is gzip with an `FEXTRA` field holding a `BC` subfield of length 2.
/// Other gzip streams are plain gzip; anything else is read as text.
pub fn detect_compression(header: &[u8]) -> Compression {
    if header.len() < 2 || header[0] != 0x1f || header[1] != 0x8b {
        return Compression::None;
    }
    // FLG.FEXTRA
    if header.len() < 12 || header[3] & 0x04 == 0 {
        return Compression::Gzip;
    }

    let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
    let extra = &header[12..header.len().min(12 + xlen)];
    let mut i = 0;
    while i + 4 <= extra.len() {
        let slen = u16::from_le_bytes([extra[i + 2], extra[i + 3]]) as usize;
        if extra[i] == b'B' && extra[i + 1] == b'C' && slen == 2 {
            return Compression::Bgzf;
        }
        i += 4 + slen;
    }
    Compression::Gzip
}

/// Sniff the compression of `inner` and read it line by line.
///
/// BGZF goes through the noodles block reader. Plain gzip is decoded as a
/// multi-member stream, so concatenated members read as one file.
pub async fn track_lines<R>(mut inner: R) -> io::Result<TrackLines>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut header = Vec::with_capacity(SNIFF_LEN);
    (&mut inner)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header)
        .await?;

    let compression = detect_compression(&header);
    let source = Cursor::new(header).chain(inner);

    let reader: Pin<Box<dyn AsyncBufRead + Send>> = match compression {
        // bgzf::r#async::Reader buffers the source itself
        Compression::Bgzf => Box::pin(bgzf::r#async::Reader::new(source)),
        Compression::Gzip => {
            let mut decoder = GzipDecoder::new(BufReader::new(source));
            decoder.multiple_members(true);
            Box::pin(BufReader::new(decoder))
        }
        Compression::None => Box::pin(BufReader::new(source)),
    };
    Ok(reader.lines())
}

/// Line reader over a byte-range prefix of a track file.
///
/// The prefix usually ends mid-block, so the reader yields every line it can
/// decode before the cut and then fails with an unexpected EOF.
pub async fn prefix_lines(prefix: Bytes) -> io::Result<TrackLines> {
    track_lines(Cursor::new(prefix)).await
}
