//! Tapedeck command line interface.
//!
//! Manages the music library from a terminal: scan folders, list songs and
//! playlists, and move playlists in and out of M3U files.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use {
    anyhow::{Result, bail},
    clap::{Parser, Subcommand, ValueEnum},
    tokio::sync::broadcast::error::RecvError,
    tracing::info,
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

use tapedeck::{
    config::SettingsManager,
    error::{ErrorReporter, ResultExt},
    library::{
        LibraryDatabase, LibraryScanner, ScanFolder, ScannerEvent, SongSortOrder,
        m3u::{export_all_playlists, export_playlist, import_playlist},
    },
};

#[derive(Parser)]
#[command(name = "tapedeck")]
#[command(about = "Local music library manager", long_about = None)]
struct Cli {
    /// Library database file (defaults to the XDG data directory)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every enabled folder, or only the given directory
    Scan {
        /// Directory to scan
        path: Option<PathBuf>,
    },
    /// Scan, then keep the library in step with the folders until interrupted
    Watch,
    /// List or change scan folders
    Folders {
        #[command(subcommand)]
        action: Option<FolderAction>,
    },
    /// List songs, optionally filtered by a search term
    Songs {
        /// Matches title, artist, album or file name
        query: Option<String>,
        /// Sort order when listing every song
        #[arg(short, long, value_enum, default_value_t = SortArg::Title)]
        sort: SortArg,
    },
    /// List playlists
    Playlists,
    /// Export one playlist as M3U
    Export {
        /// Playlist id
        id: i64,
        /// Output file
        file: PathBuf,
    },
    /// Export every playlist into a directory
    ExportAll {
        /// Output directory
        dir: PathBuf,
    },
    /// Import an M3U playlist
    Import {
        /// Playlist file
        file: PathBuf,
    },
    /// List equalizer presets
    Presets,
    /// Reset play counts and last-played times
    ClearHistory,
}

#[derive(Subcommand)]
enum FolderAction {
    /// Register a folder
    Add { path: PathBuf },
    /// Forget a folder, by id or path
    Remove { folder: String },
    /// Include a folder in full scans, by id or path
    Enable { folder: String },
    /// Exclude a folder from full scans, by id or path
    Disable { folder: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Title,
    Artist,
    DateAdded,
    Duration,
    FileName,
}

impl From<SortArg> for SongSortOrder {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Title => Self::Title,
            SortArg::Artist => Self::Artist,
            SortArg::DateAdded => Self::DateAdded,
            SortArg::Duration => Self::Duration,
            SortArg::FileName => Self::FileName,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ErrorReporter::error(&e, "tapedeck");
            eprintln!("{}", ErrorReporter::to_user_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let database = match &cli.database {
        Some(path) => LibraryDatabase::open(path).await,
        None => LibraryDatabase::new().await,
    }
    .add_context("Failed to open the library database")?;
    let database = Arc::new(database);

    match cli.command {
        Commands::Scan { path } => scan(database, path).await,
        Commands::Watch => watch(database).await,
        Commands::Folders { action } => folders(&database, action).await,
        Commands::Songs { query, sort } => songs(&database, query, sort).await,
        Commands::Playlists => playlists(&database).await,
        Commands::Export { id, file } => export(&database, id, &file).await,
        Commands::ExportAll { dir } => {
            let result = export_all_playlists(&database, &dir)
                .await
                .add_context("Failed to export playlists")?;
            for file in &result.written_files {
                println!("{}", file.display());
            }
            println!(
                "Exported {} playlists, {} failed",
                result.success_count, result.failure_count
            );
            for name in &result.failed_playlists {
                println!("  failed: {name}");
            }
            Ok(())
        }
        Commands::Import { file } => {
            let reader = BufReader::new(
                File::open(&file).add_contextf(format!("Cannot open {}", file.display()))?,
            );
            let result = import_playlist(&database, reader)
                .await
                .add_contextf(format!("Failed to import {}", file.display()))?;
            println!(
                "Imported \"{}\" (id {}): {} of {} tracks matched ({:.0}%)",
                result.playlist_name,
                result.playlist_id,
                result.matched_tracks,
                result.total_tracks,
                result.success_rate() * 100.0
            );
            for path in &result.unmatched_paths {
                println!("  not in library: {path}");
            }
            Ok(())
        }
        Commands::Presets => {
            let presets = database
                .get_all_presets()
                .await
                .add_context("Failed to list presets")?;
            for preset in presets {
                let kind = if preset.is_custom { "custom" } else { "built-in" };
                let bands = preset.bands().map(|mb| format!("{:+.1}", mb as f32 / 100.0));
                println!(
                    "{}\t{}\t{}\t[{}] dB\tbass {}\tvirtualizer {}",
                    preset.id,
                    preset.name,
                    kind,
                    bands.join(" "),
                    preset.bass_boost,
                    preset.virtualizer
                );
            }
            Ok(())
        }
        Commands::ClearHistory => {
            database
                .clear_play_history()
                .await
                .add_context("Failed to clear play history")?;
            println!("Play history cleared");
            Ok(())
        }
    }
}

async fn scan(database: Arc<LibraryDatabase>, path: Option<PathBuf>) -> Result<()> {
    let scanner = LibraryScanner::new(database, None);
    let result = match path {
        Some(path) => {
            if !path.is_dir() {
                bail!("{} is not a directory", path.display());
            }
            scanner.scan_single_folder(&path).await
        }
        None => scanner.scan_all_folders().await,
    }
    .add_context("Scan failed")?;

    info!("Scan finished: {:?}", result);
    println!(
        "Scanned {} files, found {} audio files, added {} new songs",
        result.files_scanned, result.files_found, result.new_songs_added
    );
    Ok(())
}

async fn watch(database: Arc<LibraryDatabase>) -> Result<()> {
    let settings = SettingsManager::new()
        .add_context("Failed to load settings")?
        .get_settings()
        .clone();
    let scanner = LibraryScanner::new(database, None);
    scanner
        .scan_all_folders()
        .await
        .add_context("Initial scan failed")?;

    if !scanner
        .apply_auto_scan(&settings)
        .await
        .add_context("Failed to watch scan folders")?
    {
        bail!("Automatic scanning is turned off in the settings");
    }

    let mut changes = scanner.subscribe();
    println!("Watching {} folders, press Ctrl+C to stop", scanner.watched_folders().len());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = changes.recv() => match event {
                Ok(ScannerEvent::LibraryChanged) => {
                    let count = scanner.database().get_song_count().await.unwrap_or_default();
                    println!("Library updated, {count} songs");
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
    scanner.stop_watching();
    Ok(())
}

async fn export(database: &LibraryDatabase, id: i64, file: &Path) -> Result<()> {
    let playlist = database
        .get_playlist_by_id(id)
        .await
        .add_context("Failed to look up playlist")?;
    let Some(playlist) = playlist else {
        bail!("No playlist {id}");
    };

    let mut writer = BufWriter::new(
        File::create(file).add_contextf(format!("Cannot create {}", file.display()))?,
    );
    export_playlist(database, id, &mut writer)
        .await
        .add_contextf(format!("Failed to export playlist {id}"))?;
    println!("Exported \"{}\" to {}", playlist.name, file.display());
    Ok(())
}

async fn resolve_folder(database: &LibraryDatabase, folder: &str) -> Result<ScanFolder> {
    let found = match folder.parse::<i64>() {
        Ok(id) => database.get_folder_by_id(id).await,
        Err(_) => database.get_folder_by_path(folder).await,
    }
    .add_context("Failed to look up scan folder")?;

    match found {
        Some(folder) => Ok(folder),
        None => bail!("No scan folder {folder}"),
    }
}

async fn folders(database: &LibraryDatabase, action: Option<FolderAction>) -> Result<()> {
    match action {
        None => {
            let folders = database
                .get_all_folders()
                .await
                .add_context("Failed to list scan folders")?;
            for folder in folders {
                let state = if folder.enabled { "enabled" } else { "disabled" };
                let scanned = folder
                    .last_scanned
                    .and_then(chrono::DateTime::from_timestamp_millis)
                    .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
                println!("{}\t{}\t{}\tlast scanned {}", folder.id, folder.path, state, scanned);
            }
        }
        Some(FolderAction::Add { path }) => {
            let path = std::path::absolute(&path)
                .add_contextf(format!("Cannot resolve {}", path.display()))?;
            let id = database
                .add_folder(&path.to_string_lossy())
                .await
                .add_context("Failed to add scan folder")?;
            println!("Added {} as folder {id}", path.display());
        }
        Some(FolderAction::Remove { folder }) => {
            let folder = resolve_folder(database, &folder).await?;
            database
                .delete_folder(folder.id)
                .await
                .add_context("Failed to remove scan folder")?;
            println!("Removed {}", folder.path);
        }
        Some(FolderAction::Enable { folder }) => set_enabled(database, &folder, true).await?,
        Some(FolderAction::Disable { folder }) => set_enabled(database, &folder, false).await?,
    }
    Ok(())
}

async fn set_enabled(database: &LibraryDatabase, folder: &str, enabled: bool) -> Result<()> {
    let folder = resolve_folder(database, folder).await?;
    database
        .set_folder_enabled(folder.id, enabled)
        .await
        .add_context("Failed to update scan folder")?;
    println!(
        "{} {}",
        if enabled { "Enabled" } else { "Disabled" },
        folder.path
    );
    Ok(())
}

async fn songs(database: &LibraryDatabase, query: Option<String>, sort: SortArg) -> Result<()> {
    let songs = match query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => database.search_songs(query).await,
        None => database.get_all_songs(sort.into()).await,
    }
    .add_context("Failed to list songs")?;

    for song in &songs {
        println!(
            "{}\t{} - {}\t{}\t{}",
            song.id,
            song.display_artist(),
            song.display_title(),
            song.formatted_duration(),
            song.file_path
        );
    }
    println!("{} songs", songs.len());
    Ok(())
}

async fn playlists(database: &LibraryDatabase) -> Result<()> {
    let playlists = database
        .get_all_playlists()
        .await
        .add_context("Failed to list playlists")?;
    for playlist in playlists {
        println!(
            "{}\t{}\t{} songs\t{}",
            playlist.id,
            playlist.name,
            playlist.song_count,
            playlist.formatted_duration()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use tapedeck::library::LibraryDatabase;

    use crate::export;

    #[tokio::test]
    async fn test_export_of_unknown_playlist_writes_no_file() {
        let dir = tempdir().unwrap();
        let database = LibraryDatabase::open_in_memory().await.unwrap();
        let file = dir.path().join("missing.m3u");

        assert!(export(&database, 42, &file).await.is_err());
        assert!(!file.exists());

        let id = database.create_playlist("Kept", None).await.unwrap();
        let kept = dir.path().join("kept.m3u");
        export(&database, id, &kept).await.unwrap();
        assert!(kept.exists());
    }
}
