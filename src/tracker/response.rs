use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::bencoding::Value;
use crate::tracker::TrackerError;

const COMPACT_PEER_LEN: usize = 6;

#[derive(Debug, PartialEq)]
pub struct TrackerResponse {
    /// Seconds the client should wait between regular requests.
    pub interval: Duration,
    pub tracker_id: Option<String>,
    pub complete: Option<usize>,
    pub incomplete: Option<usize>,
    pub peers: Vec<Peer>,
}

impl TryFrom<Value> for TrackerResponse {
    type Error = TrackerError;

    fn try_from(mut value: Value) -> Result<Self, Self::Error> {
        if let Some(reason) = value.try_remove_entry("failure reason")? {
            let reason: Vec<u8> = reason.try_into()?;
            return Err(TrackerError::Failure(
                String::from_utf8_lossy(&reason).into_owned(),
            ));
        }
        let interval = value.remove_entry("interval")?.try_into()?;
        let tracker_id = value
            .try_remove_entry("tracker id")?
            .map(String::try_from)
            .transpose()?;
        let complete = value
            .try_remove_entry("complete")?
            .map(usize::try_from)
            .transpose()?;
        let incomplete = value
            .try_remove_entry("incomplete")?
            .map(usize::try_from)
            .transpose()?;
        let peers = match value.remove_entry("peers")? {
            Value::String(compact) => compact_peers(&compact)?,
            other => {
                let peers: Vec<Value> = other.try_into()?;
                peers
                    .into_iter()
                    .map(Peer::try_from)
                    .collect::<Result<_, _>>()?
            }
        };
        Ok(TrackerResponse {
            interval,
            tracker_id,
            complete,
            incomplete,
            peers,
        })
    }
}

/// Four bytes of IPv4 address followed by two bytes of port, both in network byte order.
fn compact_peers(bytes: &[u8]) -> Result<Vec<Peer>, TrackerError> {
    if bytes.len() % COMPACT_PEER_LEN != 0 {
        return Err(TrackerError::InvalidPeers(bytes.len()));
    }
    let peers = bytes
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            Peer {
                peer_id: None,
                addr: SocketAddr::new(IpAddr::V4(ip), port),
            }
        })
        .collect();
    Ok(peers)
}

#[derive(Debug, PartialEq)]
pub struct Peer {
    pub peer_id: Option<Vec<u8>>,
    pub addr: SocketAddr,
}

impl TryFrom<Value> for Peer {
    type Error = TrackerError;

    fn try_from(mut value: Value) -> Result<Self, Self::Error> {
        let peer_id = value
            .try_remove_entry("peer id")?
            .map(Vec::<u8>::try_from)
            .transpose()?;
        let port = value.remove_entry("port")?.try_into()?;
        let ip: String = value.remove_entry("ip")?.try_into()?;
        let ip: IpAddr = ip.parse()?;
        Ok(Peer {
            peer_id,
            addr: SocketAddr::new(ip, port),
        })
    }
}
