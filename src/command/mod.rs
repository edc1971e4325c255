mod executor;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use executor::execute;

#[derive(Parser, Debug)]
#[command(name = "rustorrent", version, about = "Fetch pieces of a torrent from its peers")]
pub struct Cli {
    /// Port reported to the tracker
    #[arg(short, long, default_value_t = 6881, global = true)]
    pub port: u16,

    /// Seconds to wait for each peer message before giving up on it
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Maximum number of block requests in flight per peer
    #[arg(long, default_value_t = 5, global = true)]
    pub window: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode { value: String },

    /// Print the metainfo of a torrent file
    Info {
        torrent: PathBuf,
        /// Also print the name, human-readable sizes, files and checksums
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the peers the tracker returns for a torrent
    Peers { torrent: PathBuf },

    /// Handshake with a peer and print its peer id
    Handshake { torrent: PathBuf, peer: SocketAddr },

    /// Download and verify a single piece
    #[command(name = "download_piece")]
    DownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
        piece: usize,
    },

    /// Download and verify every piece
    Download {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
    },
}
