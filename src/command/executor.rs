use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use size::Size;
use tokio::fs::File;
use tokio::net::TcpStream;

use crate::bencoding::Value;
use crate::client::Config;
use crate::codec::AsyncDecoder;
use crate::command::{Cli, Command};
use crate::crypto::{Md5, Sha1};
use crate::peer::{Connection, PeerPieces, download_piece_pipelined, prepare};
use crate::torrent::{DownloadType, Info, Torrent};
use crate::tracker::{Tracker, TrackerRequest, TrackerResponse};

/// Runs one command to completion, printing its result to stdout.
pub async fn execute(cli: Cli) -> Result<()> {
    let mut config = Config::new()
        .with_port(cli.port)
        .with_max_outstanding_requests(cli.window);
    if let Some(seconds) = cli.timeout {
        let timeout = Duration::from_secs(seconds);
        config = config
            .with_connect_timeout(timeout)
            .with_receive_timeout(Some(timeout));
    }

    match cli.command {
        Command::Decode { value } => decode_value(&value),
        Command::Info { torrent, verbose } => show_info(&torrent, verbose).await,
        Command::Peers { torrent } => list_peers(&torrent, &config).await,
        Command::Handshake { torrent, peer } => handshake_peer(&torrent, peer, &config).await,
        Command::DownloadPiece {
            output,
            torrent,
            piece,
        } => fetch_piece(&torrent, piece, &output, &config).await,
        Command::Download { output, torrent } => fetch_all(&torrent, &output, &config).await,
    }
}

async fn load_torrent(path: &Path) -> Result<Torrent> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("unable to open {}", path.display()))?;
    let value = Value::decode(&mut file)
        .await
        .with_context(|| format!("unable to decode {}", path.display()))?;
    let torrent = Torrent::try_from(value)
        .with_context(|| format!("invalid metainfo in {}", path.display()))?;
    Ok(torrent)
}

fn decode_value(text: &str) -> Result<()> {
    let value = Value::from_bytes(text.as_bytes()).context("unable to decode value")?;
    println!("{}", to_json(&value));
    Ok(())
}

/// Byte strings are shown as text, with invalid UTF-8 replaced.
fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
        Value::Integer(integer) => (*integer).into(),
        Value::List(values) => values.iter().map(to_json).collect(),
        Value::Dictionary(entries) => entries
            .iter()
            .map(|(key, value)| (String::from_utf8_lossy(key).into_owned(), to_json(value)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
    }
}

async fn show_info(path: &Path, verbose: bool) -> Result<()> {
    let torrent = load_torrent(path).await?;
    for line in info_lines(&torrent, verbose) {
        println!("{}", line);
    }
    Ok(())
}

/// The plain lines come first, so the extras never change what a parser of the short form sees.
fn info_lines(torrent: &Torrent, verbose: bool) -> Vec<String> {
    let info = &torrent.info;
    let mut lines = vec![
        format!("Tracker URL: {}", torrent.announce),
        format!("Length: {}", info.total_size()),
        format!("Info Hash: {}", info.info_hash),
        format!("Piece Length: {}", info.piece_size),
        "Piece Hashes:".to_string(),
    ];
    lines.extend(info.pieces.iter().map(Sha1::to_hex));
    if !verbose {
        return lines;
    }
    lines.push(format!("Name: {}", info.name));
    lines.push(format!("Size: {}", Size::from_bytes(info.total_size())));
    match &info.download_type {
        DownloadType::SingleFile { md5sum, .. } => {
            if let Some(md5sum) = md5sum {
                lines.push(format!("MD5: {}", md5sum));
            }
        }
        DownloadType::MultiFile { files } => {
            lines.push("Files:".to_string());
            for file in files {
                let size = Size::from_bytes(file.size);
                let mut line = format!("{} ({})", file.path.display(), size);
                if let Some(md5sum) = &file.md5sum {
                    line.push_str(&format!(" md5 {}", md5sum));
                }
                lines.push(line);
            }
        }
    }
    lines
}

fn started_request(torrent: &Torrent, config: &Config) -> TrackerRequest {
    TrackerRequest::started(
        torrent.announce.clone(),
        torrent.info.info_hash,
        config.client_id,
        config.port,
        Size::from_bytes(torrent.info.total_size()),
    )
}

async fn announce(tracker: &Tracker, request: &TrackerRequest) -> Result<TrackerResponse> {
    tracker
        .announce(request)
        .await
        .with_context(|| format!("announce to {} failed", request.announce))
}

async fn peer_addrs(torrent: &Torrent, config: &Config) -> Result<Vec<SocketAddr>> {
    let tracker = Tracker::new(reqwest::Client::new());
    let response = announce(&tracker, &started_request(torrent, config)).await?;
    Ok(response.peers.into_iter().map(|peer| peer.addr).collect())
}

async fn list_peers(path: &Path, config: &Config) -> Result<()> {
    let torrent = load_torrent(path).await?;
    for addr in peer_addrs(&torrent, config).await? {
        println!("{}", addr);
    }
    Ok(())
}

async fn handshake_peer(path: &Path, addr: SocketAddr, config: &Config) -> Result<()> {
    let torrent = load_torrent(path).await?;
    let mut connection = Connection::connect(addr, torrent.info.info_hash, config)
        .await
        .with_context(|| format!("unable to handshake with {}", addr))?;
    if let Some(peer_id) = connection.remote_peer_id() {
        println!("Peer ID: {}", peer_id.to_hex());
    }
    connection.close().await;
    Ok(())
}

/// A handshaken connection to a peer that has unchoked us.
async fn open(
    addr: SocketAddr,
    torrent: &Torrent,
    config: &Config,
) -> Result<(Connection<TcpStream>, PeerPieces)> {
    let mut connection = Connection::connect(addr, torrent.info.info_hash, config).await?;
    match prepare(&mut connection, torrent.info.total_pieces()).await {
        Ok(pieces) => Ok((connection, pieces)),
        Err(err) => {
            connection.close().await;
            Err(err.into())
        }
    }
}

async fn fetch_piece(path: &Path, piece: usize, output: &Path, config: &Config) -> Result<()> {
    let torrent = load_torrent(path).await?;
    let total = torrent.info.total_pieces();
    if piece >= total {
        bail!("piece {} out of range, torrent has {} pieces", piece, total);
    }
    for addr in peer_addrs(&torrent, config).await? {
        match fetch_piece_from(addr, &torrent, piece, config).await {
            Ok(data) => {
                tokio::fs::write(output, &data)
                    .await
                    .with_context(|| format!("unable to write {}", output.display()))?;
                println!("Piece {} downloaded to {}.", piece, output.display());
                return Ok(());
            }
            Err(err) => warn!("[{}] giving up on peer: {:#}", addr, err),
        }
    }
    bail!("no peer could provide piece {}", piece)
}

async fn fetch_piece_from(
    addr: SocketAddr,
    torrent: &Torrent,
    piece: usize,
    config: &Config,
) -> Result<Vec<u8>> {
    let (mut connection, pieces) = open(addr, torrent, config).await?;
    if !pieces.has(piece) {
        connection.close().await;
        bail!("peer does not have piece {}", piece);
    }
    let result = download_piece_pipelined(
        &torrent.info,
        &mut connection,
        piece,
        config.max_outstanding_requests,
    )
    .await;
    connection.close().await;
    Ok(result?)
}

/// Fetches pieces in order. When a peer fails, the next one picks up at the first missing piece.
async fn fetch_all(path: &Path, output: &Path, config: &Config) -> Result<()> {
    let torrent = load_torrent(path).await?;
    let total = torrent.info.total_pieces();
    let tracker = Tracker::new(reqwest::Client::new());
    let request = started_request(&torrent, config);
    let response = announce(&tracker, &request).await?;
    let mut data = Vec::with_capacity(torrent.info.total_size());
    for peer in response.peers {
        if data.len() == torrent.info.total_size() {
            break;
        }
        if let Err(err) = fetch_from(peer.addr, &torrent, &mut data, config).await {
            warn!("[{}] giving up on peer: {:#}", peer.addr, err);
        }
    }
    let next = next_piece(&torrent.info, &data);
    if next < total {
        bail!("downloaded {} of {} pieces, no peers left", next, total);
    }
    verify_md5sums(&torrent.info, &data)?;
    write_files(&torrent.info, output, &data).await?;
    println!("Downloaded {} to {}.", path.display(), output.display());

    let completed = request.completed(Size::from_bytes(data.len()), response.tracker_id);
    if let Err(err) = announce(&tracker, &completed).await {
        warn!("{:#}", err);
    }
    Ok(())
}

fn next_piece(info: &Info, data: &[u8]) -> usize {
    data.len().div_ceil(info.piece_size)
}

async fn fetch_from(
    addr: SocketAddr,
    torrent: &Torrent,
    data: &mut Vec<u8>,
    config: &Config,
) -> Result<()> {
    let (mut connection, pieces) = open(addr, torrent, config).await?;
    let result = fetch_pieces(&mut connection, &pieces, &torrent.info, data, config).await;
    connection.close().await;
    result
}

async fn fetch_pieces(
    connection: &mut Connection<TcpStream>,
    pieces: &PeerPieces,
    info: &Info,
    data: &mut Vec<u8>,
    config: &Config,
) -> Result<()> {
    let total = info.total_pieces();
    loop {
        let piece = next_piece(info, data);
        if piece == total {
            return Ok(());
        }
        if !pieces.has(piece) {
            bail!("peer does not have piece {}", piece);
        }
        let bytes =
            download_piece_pipelined(info, connection, piece, config.max_outstanding_requests)
                .await?;
        data.extend_from_slice(&bytes);
        info!("[{}] {}/{} pieces", connection.peer(), piece + 1, total);
    }
}

/// Checks the optional per-file checksums. Pieces were already verified, so a mismatch means
/// the metainfo disagrees with itself.
fn verify_md5sums(info: &Info, data: &[u8]) -> Result<()> {
    match &info.download_type {
        DownloadType::SingleFile { md5sum, .. } => verify_md5sum(&info.name, md5sum, data),
        DownloadType::MultiFile { files } => {
            let mut offset = 0;
            for file in files {
                let name = file.path.display().to_string();
                verify_md5sum(&name, &file.md5sum, &data[offset..offset + file.size])?;
                offset += file.size;
            }
            Ok(())
        }
    }
}

fn verify_md5sum(name: &str, expected: &Option<Md5>, data: &[u8]) -> Result<()> {
    if let Some(expected) = expected {
        let actual = Md5::digest(data);
        if actual != *expected {
            bail!("md5 mismatch for {}: expected {}, got {}", name, expected, actual);
        }
    }
    Ok(())
}

/// Single-file torrents are written to `output`. Multi-file torrents are split below `output`
/// as a directory.
async fn write_files(info: &Info, output: &Path, data: &[u8]) -> Result<()> {
    match &info.download_type {
        DownloadType::SingleFile { .. } => {
            tokio::fs::write(output, data)
                .await
                .with_context(|| format!("unable to write {}", output.display()))?;
        }
        DownloadType::MultiFile { files } => {
            let mut offset = 0;
            for file in files {
                let path = output.join(&file.path);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("unable to create {}", parent.display()))?;
                }
                tokio::fs::write(&path, &data[offset..offset + file.size])
                    .await
                    .with_context(|| format!("unable to write {}", path.display()))?;
                offset += file.size;
            }
        }
    }
    Ok(())
}
