use size::Size;
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::core::PeerId;
use crate::crypto::Sha1;

#[derive(Debug)]
pub struct TrackerRequest {
    pub announce: Url,
    pub info_hash: Sha1,
    pub peer_id: PeerId,
    /// The port number that the client is listening on. Ports reserved for BitTorrent are
    /// typically 6881-6889.
    pub port: u16,
    /// The total amount uploaded since the client sent the 'started' event.
    pub uploaded: Size,
    /// The total amount downloaded since the client sent the 'started' event.
    pub downloaded: Size,
    /// The number of bytes still needed to download all the files in the torrent.
    pub left: Size,
    pub event: Option<Event>,
    pub tracker_id: Option<String>,
}

impl TrackerRequest {
    /// A first announce for a download that has not started yet.
    pub fn started(
        announce: Url,
        info_hash: Sha1,
        peer_id: PeerId,
        port: u16,
        left: Size,
    ) -> Self {
        Self {
            announce,
            info_hash,
            peer_id,
            port,
            uploaded: Size::from_bytes(0),
            downloaded: Size::from_bytes(0),
            left,
            event: Some(Event::Started),
            tracker_id: None,
        }
    }

    /// The follow-up announce once every byte is downloaded. The tracker id from an earlier
    /// response, if any, must be echoed back.
    pub fn completed(self, downloaded: Size, tracker_id: Option<String>) -> Self {
        Self {
            downloaded,
            left: Size::from_bytes(0),
            event: Some(Event::Completed),
            tracker_id,
            ..self
        }
    }

    /// The announce URL with the request parameters appended to whatever query it already has.
    pub fn url(&self) -> Url {
        let mut url = self.announce.clone();
        let mut query = format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            url_encode(&self.info_hash.0),
            url_encode(&self.peer_id.0),
            self.port,
            self.uploaded.bytes(),
            self.downloaded.bytes(),
            self.left.bytes(),
        );
        if let Some(event) = &self.event {
            query.push_str("&event=");
            query.push_str(event.into());
        }
        if let Some(id) = &self.tracker_id {
            query.push_str("&trackerid=");
            query.push_str(&url_encode(id.as_bytes()));
        }
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
            _ => query,
        };
        url.set_query(Some(&query));
        url
    }
}

fn url_encode(bytes: &[u8]) -> String {
    String::from_iter(byte_serialize(bytes))
}

#[derive(Debug, Clone, Copy)]
pub enum Event {
    /// The first request to the tracker must include the event key with this value.
    Started,
    /// Must be sent to the tracker when the download completes.
    Completed,
}

impl From<&Event> for &str {
    fn from(value: &Event) -> Self {
        match value {
            Event::Started => "started",
            Event::Completed => "completed",
        }
    }
}
