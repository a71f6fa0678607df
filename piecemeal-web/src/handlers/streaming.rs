//! Byte-range streaming of torrent files
//!
//! Each request becomes one or more stream reader calls. Dropping the
//! response future drops the read and releases its priority boosts.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use piecemeal_core::torrent::InvalidInfoHash;
use piecemeal_core::{InfoHash, StreamError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::range::{
    ByteRange, build_full_response, build_partial_response, build_unsatisfiable_response,
    extract_range_header, parse_range_header,
};
use crate::server::{AppState, TorrentStream};

/// Seconds a client should wait before retrying a stalled read.
const STALL_RETRY_AFTER_SECS: u64 = 5;

/// Failure of a streaming request, mapped onto an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum StreamingHttpError {
    #[error(transparent)]
    InvalidInfoHash(#[from] InvalidInfoHash),

    #[error("Unknown torrent: {info_hash}")]
    UnknownTorrent { info_hash: InfoHash },

    #[error("Torrent {info_hash} has no file {file_index}")]
    UnknownFile {
        info_hash: InfoHash,
        file_index: usize,
    },

    #[error("Range not satisfiable for {total_size} byte file")]
    Unsatisfiable { total_size: u64 },

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Failed to build response")]
    Response,
}

impl StreamingHttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            StreamingHttpError::InvalidInfoHash(_) => StatusCode::BAD_REQUEST,
            StreamingHttpError::UnknownTorrent { .. } | StreamingHttpError::UnknownFile { .. } => {
                StatusCode::NOT_FOUND
            }
            StreamingHttpError::Unsatisfiable { .. }
            | StreamingHttpError::Stream(StreamError::Range(_)) => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            StreamingHttpError::Stream(StreamError::StreamStalled { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            StreamingHttpError::Stream(StreamError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            StreamingHttpError::Stream(StreamError::Store(_)) => StatusCode::BAD_GATEWAY,
            StreamingHttpError::Response => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StreamingHttpError {
    fn into_response(self) -> Response {
        if let StreamingHttpError::Unsatisfiable { total_size } = self {
            return build_unsatisfiable_response(total_size)
                .unwrap_or_else(|status| status.into_response());
        }

        let status = self.status();
        let body = match &self {
            StreamingHttpError::Stream(StreamError::StreamStalled { missing, .. }) => json!({
                "error": self.to_string(),
                "missing_pieces": missing,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::GATEWAY_TIMEOUT {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                header::HeaderValue::from(STALL_RETRY_AFTER_SECS),
            );
        }
        response
    }
}

/// Streams one file of a registered torrent, honoring the Range header.
///
/// # Errors
/// Returns `StreamingHttpError` mapped onto 400, 404, 416, 502, 503 or 504
pub async fn stream_file(
    State(state): State<AppState>,
    Path((info_hash_str, file_index)): Path<(String, usize)>,
    headers: HeaderMap,
) -> Result<Response, StreamingHttpError> {
    let info_hash = InfoHash::from_hex(&info_hash_str)?;
    let torrent = state
        .torrent(&info_hash)
        .await
        .ok_or(StreamingHttpError::UnknownTorrent { info_hash })?;
    let file = torrent
        .layout
        .file(file_index)
        .ok_or(StreamingHttpError::UnknownFile {
            info_hash,
            file_index,
        })?;

    let total_size = file.size();
    let content_type = mime_guess::from_path(file.path())
        .first_or_octet_stream()
        .to_string();

    if file.is_empty() {
        return build_full_response(Bytes::new(), &content_type)
            .map_err(|_| StreamingHttpError::Response);
    }

    let requested = match extract_range_header(&headers) {
        Some(value) => parse_range_header(value, total_size)
            .map_err(|unsatisfiable| StreamingHttpError::Unsatisfiable {
                total_size: unsatisfiable.total_size,
            })?,
        None => None,
    };

    let chunks = FileChunks {
        torrent,
        info_hash,
        file_index,
        read_timeout: state.read_timeout,
        max_chunk_bytes: state.max_range_bytes,
        cancel: state.shutdown.child_token(),
    };

    match requested {
        Some(range) => {
            let range = range.clamp(chunks.max_chunk_bytes);
            info!(
                "Streaming {} file {} bytes {}-{} of {}",
                info_hash, file_index, range.start, range.end, total_size
            );
            let data = chunks.read(range).await?;
            build_partial_response(data, &content_type, range, total_size)
                .map_err(|_| StreamingHttpError::Response)
        }
        None => {
            info!(
                "Streaming {} file {} in full ({} bytes)",
                info_hash, file_index, total_size
            );
            // The first chunk is read up front so stalls still produce a status.
            let first = ByteRange {
                start: 0,
                end: total_size,
            }
            .clamp(chunks.max_chunk_bytes);
            let data = chunks.read(first).await?;
            if first.end == total_size {
                return build_full_response(data, &content_type)
                    .map_err(|_| StreamingHttpError::Response);
            }

            let rest = chunks.remaining(first.end, total_size);
            let body = Body::from_stream(stream::once(async move { Ok(data) }).chain(rest));
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CONTENT_LENGTH, total_size.to_string())
                .body(body)
                .map_err(|_| StreamingHttpError::Response)
        }
    }
}

/// Reads one file of a torrent in bounded chunks.
#[derive(Clone)]
struct FileChunks {
    torrent: TorrentStream,
    info_hash: InfoHash,
    file_index: usize,
    read_timeout: Duration,
    max_chunk_bytes: u64,
    cancel: CancellationToken,
}

impl FileChunks {
    async fn read(&self, range: ByteRange) -> Result<Bytes, StreamingHttpError> {
        let file = self.torrent.layout.file(self.file_index).ok_or(
            StreamingHttpError::UnknownFile {
                info_hash: self.info_hash,
                file_index: self.file_index,
            },
        )?;
        let result = self
            .torrent
            .reader
            .read(
                file,
                self.torrent.layout.piece_length(),
                range.as_range(),
                self.read_timeout,
                &self.cancel,
            )
            .await;

        match &result {
            Err(error @ StreamError::StreamStalled { .. }) => {
                warn!("Read of file {} stalled: {}", self.file_index, error)
            }
            Err(error) if error.is_cancellation() => {
                debug!("Read of file {} cancelled", self.file_index)
            }
            Err(error) => warn!("Read of file {} failed: {}", self.file_index, error),
            Ok(_) => {}
        }
        result.map_err(StreamingHttpError::from)
    }

    /// Sequential chunks from `start` to the end of the file.
    fn remaining(
        self,
        start: u64,
        total_size: u64,
    ) -> impl futures::Stream<Item = Result<Bytes, StreamingHttpError>> + Send {
        stream::try_unfold(start, move |offset| {
            let chunks = self.clone();
            async move {
                if offset >= total_size {
                    return Ok(None);
                }
                let range = ByteRange {
                    start: offset,
                    end: total_size,
                }
                .clamp(chunks.max_chunk_bytes);
                let data = chunks.read(range).await?;
                Ok(Some((data, range.end)))
            }
        })
    }
}
