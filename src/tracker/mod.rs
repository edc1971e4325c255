mod error;
mod request;
mod response;

use log::{debug, info};

use crate::bencoding::Value;

pub use error::TrackerError;
pub use request::*;
pub use response::*;

/// Announces to HTTP trackers through a client handle owned by the caller.
pub struct Tracker {
    client: reqwest::Client,
}

impl Tracker {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn announce(
        &self,
        request: &TrackerRequest,
    ) -> Result<TrackerResponse, TrackerError> {
        let url = request.url();
        debug!("announcing to {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TrackerError::Status(response.status()));
        }
        let body = response.bytes().await?;
        let value = Value::from_bytes(&body)?;
        let response = TrackerResponse::try_from(value)?;
        info!(
            "tracker returned {} peers, next announce in {:?}",
            response.peers.len(),
            response.interval
        );
        if let (Some(seeders), Some(leechers)) = (response.complete, response.incomplete) {
            info!("swarm has {} seeders and {} leechers", seeders, leechers);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use size::Size;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::core::PeerId;
    use crate::crypto::Sha1;

    async fn tracker_responding(body: Vec<u8>, status: u16) -> (MockServer, TrackerRequest) {
        let mock_tracker = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/announce"))
            .and(query_param("port", "6881"))
            .and(query_param("left", "1234"))
            .and(query_param("compact", "1"))
            .and(query_param("event", "started"))
            .respond_with(
                ResponseTemplate::new(status).set_body_raw(body, "application/octet-stream"),
            )
            .mount(&mock_tracker)
            .await;

        let announce = format!("{}/announce", mock_tracker.uri());
        let request = TrackerRequest::started(
            Url::parse(&announce).expect("invalid url"),
            Sha1([0x12; 20]),
            PeerId(*b"-RT0001-abcdefghijkl"),
            6881,
            Size::from_bytes(1234),
        );
        (mock_tracker, request)
    }

    #[tokio::test]
    async fn announce_compact() {
        let body = b"d8:intervali900e5:peers6:\x7f\x00\x00\x01\x1a\xe1e".to_vec();
        let (_server, request) = tracker_responding(body, 200).await;

        let response = Tracker::new(reqwest::Client::new())
            .announce(&request)
            .await
            .expect("failed to contact tracker");

        assert_eq!(response.interval.as_secs(), 900);
        assert_eq!(
            response.peers,
            vec![Peer {
                peer_id: None,
                addr: "127.0.0.1:6881".parse().expect("invalid address"),
            }]
        );
    }

    #[tokio::test]
    async fn announce_completed_with_tracker_id() {
        let mock_tracker = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/announce"))
            .and(query_param("downloaded", "1234"))
            .and(query_param("left", "0"))
            .and(query_param("event", "completed"))
            .and(query_param("trackerid", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                b"d8:completei3e10:incompletei0e8:intervali900e5:peers0:e".to_vec(),
                "application/octet-stream",
            ))
            .expect(1)
            .mount(&mock_tracker)
            .await;
        let announce = format!("{}/announce", mock_tracker.uri());
        let request = TrackerRequest::started(
            Url::parse(&announce).expect("invalid url"),
            Sha1([0x12; 20]),
            PeerId(*b"-RT0001-abcdefghijkl"),
            6881,
            Size::from_bytes(1234),
        )
        .completed(Size::from_bytes(1234), Some("abc".to_string()));

        let response = Tracker::new(reqwest::Client::new())
            .announce(&request)
            .await
            .expect("failed to contact tracker");

        assert_eq!(response.complete, Some(3));
        assert_eq!(response.incomplete, Some(0));
        assert!(response.peers.is_empty());
    }

    #[tokio::test]
    async fn announce_failure_reason() {
        let body = b"d14:failure reason12:unregisterede".to_vec();
        let (_server, request) = tracker_responding(body, 200).await;

        let result = Tracker::new(reqwest::Client::new())
            .announce(&request)
            .await;

        assert!(matches!(result, Err(TrackerError::Failure(reason)) if reason == "unregistered"));
    }

    #[tokio::test]
    async fn announce_error_status() {
        let (_server, request) = tracker_responding(Vec::new(), 500).await;

        let result = Tracker::new(reqwest::Client::new())
            .announce(&request)
            .await;

        assert!(matches!(result, Err(TrackerError::Status(status)) if status.as_u16() == 500));
    }

    #[tokio::test]
    async fn announce_malformed_body() {
        let (_server, request) = tracker_responding(b"d8:interval".to_vec(), 200).await;

        let result = Tracker::new(reqwest::Client::new())
            .announce(&request)
            .await;

        assert!(matches!(result, Err(TrackerError::Parse(_))));
    }
}
