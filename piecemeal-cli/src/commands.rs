//! CLI command implementations

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Subcommand;
use piecemeal_core::layout::{FileEntry, TorrentLayout};
use piecemeal_core::streaming::{InMemoryPieceStore, PieceAvailability, StreamReader};
use piecemeal_core::{InfoHash, PiecemealConfig, translate};
use piecemeal_web::commands::{
    HeadlessHost, InMemoryLibraryDatabase, InMemoryMediaCache, MaintenanceService,
};
use piecemeal_web::{AppState, run_server};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print where each file lands in the piece space
    Layout {
        /// Piece length in bytes
        #[arg(short, long)]
        piece_length: u32,
        /// Files in torrent order as NAME=SIZE
        #[arg(required = true, value_parser = parse_file_entry)]
        files: Vec<FileEntry>,
    },
    /// Translate a file byte range into pieces
    Translate {
        /// Piece length in bytes
        #[arg(short, long)]
        piece_length: u32,
        /// Index of the file to read from
        #[arg(short, long)]
        index: usize,
        /// First byte of the range, file relative
        #[arg(long)]
        start: u64,
        /// End of the range, exclusive
        #[arg(long)]
        end: u64,
        /// Files in torrent order as NAME=SIZE
        #[arg(required = true, value_parser = parse_file_entry)]
        files: Vec<FileEntry>,
    },
    /// Serve generated demo content over HTTP
    Serve {
        /// Address to bind, overriding PIECEMEAL_BIND_ADDRESS
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Piece length in bytes, defaults to the configured demo length
        #[arg(short, long)]
        piece_length: Option<u32>,
        /// Pieces withheld from the demo so reads stall on them
        #[arg(long, value_delimiter = ',')]
        missing: Vec<u32>,
        /// Info hash the demo torrent is registered under
        #[arg(long, default_value = "00000000000000000000000000000000000000aa")]
        info_hash: String,
        /// Files in torrent order as NAME=SIZE
        #[arg(required = true, value_parser = parse_file_entry)]
        files: Vec<FileEntry>,
    },
}

/// Parses `NAME=SIZE` into a file entry.
fn parse_file_entry(value: &str) -> Result<FileEntry, String> {
    let (name, size) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=SIZE, got '{value}'"))?;
    if name.is_empty() {
        return Err(format!("missing file name in '{value}'"));
    }
    let size = size
        .parse::<u64>()
        .map_err(|e| format!("invalid size in '{value}': {e}"))?;
    Ok(FileEntry::new(name, size))
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Layout {
            piece_length,
            files,
        } => show_layout(files, piece_length),
        Commands::Translate {
            piece_length,
            index,
            start,
            end,
            files,
        } => translate_range(files, piece_length, index, start, end),
        Commands::Serve {
            bind,
            piece_length,
            missing,
            info_hash,
            files,
        } => serve_demo(files, piece_length, missing, &info_hash, bind).await,
    }
}

fn show_layout(files: Vec<FileEntry>, piece_length: u32) -> anyhow::Result<()> {
    let layout = TorrentLayout::build(files, piece_length)?;

    println!(
        "{} files, {} bytes, {} pieces of {} bytes",
        layout.files().len(),
        layout.total_size(),
        layout.piece_count(),
        layout.piece_length()
    );
    println!(
        "{:>5}  {:<32} {:>12} {:>12}  pieces",
        "index", "name", "size", "offset"
    );
    for file in layout.files() {
        let pieces = match file.required_pieces() {
            Some(range) => format!("{}-{}", range.start(), range.end()),
            None => format!("none (assigned {})", file.piece_start()),
        };
        println!(
            "{:>5}  {:<32} {:>12} {:>12}  {}",
            file.index(),
            file.name(),
            file.size(),
            file.offset(),
            pieces
        );
    }
    Ok(())
}

fn translate_range(
    files: Vec<FileEntry>,
    piece_length: u32,
    index: usize,
    start: u64,
    end: u64,
) -> anyhow::Result<()> {
    let layout = TorrentLayout::build(files, piece_length)?;
    let Some(file) = layout.file(index) else {
        bail!("file index {index} out of range ({} files)", layout.files().len());
    };

    let span = translate(file, piece_length, start, end)?;
    println!(
        "{} bytes {}..{} -> pieces {}-{} (first offset {}, last offset {})",
        file.name(),
        start,
        end,
        span.piece_start,
        span.piece_end,
        span.first_piece_offset,
        span.last_piece_offset
    );
    for piece in span.pieces() {
        if let Some((offset, length)) = span.piece_slice(piece, piece_length) {
            println!("  piece {piece}: {length} bytes at offset {offset}");
        }
    }
    Ok(())
}

async fn serve_demo(
    files: Vec<FileEntry>,
    piece_length: Option<u32>,
    missing: Vec<u32>,
    info_hash: &str,
    bind: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let mut config = PiecemealConfig::from_env();
    if let Some(address) = bind {
        config.server.bind_address = address;
    }
    let piece_length = piece_length.unwrap_or(config.streaming.demo_piece_length);
    let info_hash = InfoHash::from_hex(info_hash)?;

    let layout = TorrentLayout::build(files, piece_length)?;
    let total_size = usize::try_from(layout.total_size())
        .context("demo content does not fit in memory")?;
    let content: Vec<u8> = (0..total_size).map(|i| (i % 251) as u8).collect();

    let available = (0..layout.piece_count()).filter(|piece| !missing.contains(piece));
    let tracker = Arc::new(PieceAvailability::with_pieces(available));
    let store = Arc::new(InMemoryPieceStore::from_content(content, piece_length));
    let reader = StreamReader::new(tracker, store, &config.streaming);

    let maintenance = Arc::new(MaintenanceService::new(
        Arc::new(HeadlessHost::new(false)),
        Arc::new(InMemoryMediaCache::new()),
        Arc::new(InMemoryLibraryDatabase::new()),
        config.library.clone(),
    ));
    let state = AppState::new(&config, maintenance);
    state
        .register_torrent(info_hash, Arc::new(layout), Arc::new(reader))
        .await;

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    info!("Serving demo torrent {}", info_hash);
    run_server(&config, state).await?;
    Ok(())
}
