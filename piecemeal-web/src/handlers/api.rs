//! JSON catalog and statistics endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use piecemeal_core::streaming::StreamReaderStats;
use piecemeal_core::{InfoHash, TorrentFile};
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
pub struct TorrentSummary {
    pub info_hash: String,
    pub files: usize,
    pub total_size: u64,
    pub piece_length: u32,
    pub piece_count: u32,
}

#[derive(Serialize)]
pub struct TorrentStats {
    pub info_hash: String,
    pub readahead_pieces: u32,
    pub boosted_pieces: usize,
    pub reader: StreamReaderStats,
}

#[derive(Serialize)]
pub struct Stats {
    pub total_torrents: usize,
    pub bytes_served: u64,
    pub torrents: Vec<TorrentStats>,
}

pub async fn api_torrents(State(state): State<AppState>) -> Json<Vec<TorrentSummary>> {
    let torrents = state.torrents.read().await;
    let mut summaries: Vec<TorrentSummary> = torrents
        .iter()
        .map(|(info_hash, torrent)| TorrentSummary {
            info_hash: info_hash.to_string(),
            files: torrent.layout.files().len(),
            total_size: torrent.layout.total_size(),
            piece_length: torrent.layout.piece_length(),
            piece_count: torrent.layout.piece_count(),
        })
        .collect();
    summaries.sort_by(|a, b| a.info_hash.cmp(&b.info_hash));
    Json(summaries)
}

/// Lists the files of one torrent with their piece ranges.
///
/// # Errors
/// Returns 400 for a malformed hash and 404 for an unknown torrent
pub async fn api_torrent_files(
    State(state): State<AppState>,
    Path(info_hash_str): Path<String>,
) -> Result<Json<Vec<TorrentFile>>, StatusCode> {
    let info_hash = InfoHash::from_hex(&info_hash_str).map_err(|_| StatusCode::BAD_REQUEST)?;
    let torrent = state
        .torrent(&info_hash)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(torrent.layout.files().to_vec()))
}

pub async fn api_stats(State(state): State<AppState>) -> Json<Stats> {
    let torrents = state.torrents.read().await;
    let mut per_torrent: Vec<TorrentStats> = torrents
        .iter()
        .map(|(info_hash, torrent)| TorrentStats {
            info_hash: info_hash.to_string(),
            readahead_pieces: torrent.reader.readahead_pieces(),
            boosted_pieces: torrent.reader.boost_ledger().boosted_pieces(),
            reader: torrent.reader.stats(),
        })
        .collect();
    per_torrent.sort_by(|a, b| a.info_hash.cmp(&b.info_hash));

    Json(Stats {
        total_torrents: per_torrent.len(),
        bytes_served: per_torrent.iter().map(|t| t.reader.bytes_served).sum(),
        torrents: per_torrent,
    })
}
