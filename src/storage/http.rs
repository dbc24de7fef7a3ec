//! HTTP/HTTPS storage backend for remote track files.
//!
//! Every request carries a connect timeout; bounded reads additionally carry
//! a total timeout. Non-success responses are reported as
//! [`Error::TrackFetch`] so callers can degrade them to "no result".

use super::{ByteRange, ByteStream, Storage};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tokio_util::io::StreamReader;

pub struct HttpStorage {
    client: Client,
    timeout: Duration,
}

impl HttpStorage {
    /// Create a new HttpStorage instance.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Connect timeout for all requests, and total timeout for bounded reads
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("overlapr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    fn check_status(url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() || status == StatusCode::PARTIAL_CONTENT {
            Ok(response)
        } else {
            Err(Error::TrackFetch(format!("{} returned {}", url, status)))
        }
    }

    /// Read at most `limit` body bytes, dropping the connection after that.
    async fn read_capped(url: &str, response: Response, limit: u64) -> Result<Bytes> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut buf = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::TrackFetch(format!("{}: failed to read body: {}", url, e)))?;
            let room = limit - buf.len();
            buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if buf.len() >= limit {
                break;
            }
        }
        Ok(buf.freeze())
    }
}

#[async_trait]
impl Storage for HttpStorage {
    async fn open(&self, location: &str) -> Result<ByteStream> {
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| Error::TrackFetch(format!("HTTP GET request failed: {}", e)))?;
        let response = Self::check_status(location, response)?;

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn read_bytes(&self, location: &str, range: Option<ByteRange>) -> Result<Bytes> {
        let mut request = self.client.get(location).timeout(self.timeout);

        if let Some(r) = &range {
            request = request.header(reqwest::header::RANGE, r.header_value());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::TrackFetch(format!("HTTP GET request failed: {}", e)))?;
        let response = Self::check_status(location, response)?;

        match range {
            Some(ByteRange { start, end: Some(end) }) => {
                // A 200 means the server ignored Range and sent the file from byte 0
                if response.status() != StatusCode::PARTIAL_CONTENT && start > 0 {
                    return Err(Error::TrackFetch(format!(
                        "{}: server ignored range request",
                        location
                    )));
                }
                Self::read_capped(location, response, end.saturating_sub(start) + 1).await
            }
            _ => response
                .bytes()
                .await
                .map_err(|e| Error::TrackFetch(format!("failed to read HTTP response: {}", e))),
        }
    }

    async fn read_to_string(&self, location: &str) -> Result<String> {
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| Error::TrackFetch(format!("HTTP GET request failed: {}", e)))?;
        let response = Self::check_status(location, response)?;

        response
            .text()
            .await
            .map_err(|e| Error::TrackFetch(format!("failed to read HTTP response: {}", e)))
    }
}
