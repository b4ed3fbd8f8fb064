mod app;
mod format;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reel", about = "Resume-aware local media library", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan configured library folders for new items.
    Scan,
    /// List library items with resume progress.
    List {
        /// Include archived items.
        #[arg(long)]
        all: bool,
        /// Filter titles by substring.
        #[arg(long)]
        query: Option<String>,
    },
    /// Launch the player for a file or folder, resuming where it left off.
    Play {
        path: PathBuf,
        /// Start from the beginning instead of resuming.
        #[arg(long)]
        restart: bool,
    },
    /// Show watch-time statistics.
    Stats,
    /// Force a metadata refetch for an item.
    Refresh { path: PathBuf },
    /// Hide an item from the default listing.
    Archive { path: PathBuf },
    /// Restore an archived item.
    Unarchive { path: PathBuf },
    /// Search subtitles for a file, optionally downloading one.
    Subs {
        path: PathBuf,
        /// Subtitle language (defaults to the configured one).
        #[arg(long)]
        lang: Option<String>,
        /// Download the subtitle with this file id next to the media file.
        #[arg(long)]
        download: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = app::run(cli.command).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
