use std::time::Duration;

use chorepoints_shared::api::ServerEvent;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::remote::FeedEvent;

const MAX_BACKOFF_SECS: u64 = 30;

/// Listen to the server's change feed in the background, reconnecting with
/// exponential backoff. Every successful connect is reported as
/// [`FeedEvent::Resync`]. Stops when `cancel` fires or the receiver is dropped.
pub(crate) fn spawn_listener(url: String, tx: mpsc::Sender<FeedEvent>, cancel: CancellationToken) {
    tokio::spawn(async move {
        // Own client: the shared one has a request timeout that would cut the stream.
        let client = reqwest::Client::new();
        let mut backoff_secs = 1u64;
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                r = listen_once(&client, &url, &tx) => r,
            };
            match outcome {
                Ok(Session::Closed) => {
                    tracing::info!("SSE: receiver dropped; stopping listener");
                    break;
                }
                Ok(Session::Ended) => backoff_secs = 1,
                Err(e) => tracing::warn!(error = %e, "SSE: connection failed"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
            }
            backoff_secs = next_backoff(backoff_secs);
        }
        tracing::debug!("SSE: listener finished");
    });
}

enum Session {
    /// The stream ended after a successful connect.
    Ended,
    /// Nobody is listening any more.
    Closed,
}

async fn listen_once(
    client: &reqwest::Client,
    url: &str,
    tx: &mpsc::Sender<FeedEvent>,
) -> Result<Session, String> {
    let res = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !res.status().is_success() {
        return Err(format!("status {}", res.status()));
    }
    tracing::info!("SSE: connected");
    if tx.send(FeedEvent::Resync).await.is_err() {
        return Ok(Session::Closed);
    }

    let mut stream = res.bytes_stream().eventsource();
    while let Some(ev) = stream.next().await {
        let ev = match ev {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(error = %e, "SSE read error");
                return Ok(Session::Ended);
            }
        };
        let Some(feed) = parse_event(&ev.data) else {
            continue;
        };
        if tx.send(feed).await.is_err() {
            return Ok(Session::Closed);
        }
    }
    Ok(Session::Ended)
}

fn parse_event(data: &str) -> Option<FeedEvent> {
    if data.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<ServerEvent>(data) {
        Ok(ServerEvent::Changed { collections }) => Some(FeedEvent::Changed(collections)),
        Err(e) => {
            tracing::debug!(error = %e, "SSE: ignoring unknown event");
            None
        }
    }
}

fn next_backoff(current: u64) -> u64 {
    (current * 2).min(MAX_BACKOFF_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorepoints_shared::api::Collection;

    #[test]
    fn parses_change_events() {
        let ev = parse_event(r#"{"type":"changed","collections":["tasks","children"]}"#);
        assert_eq!(
            ev,
            Some(FeedEvent::Changed(vec![
                Collection::Tasks,
                Collection::Children
            ]))
        );
        assert_eq!(parse_event(""), None);
        assert_eq!(parse_event(r#"{"type":"hello"}"#), None);
    }

    /// Serves one event-stream response with a single change event, then
    /// holds the connection open.
    async fn one_shot_feed() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/events", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\r\n\
                  data: {\"type\":\"changed\",\"collections\":[\"children\"]}\n\n",
            )
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        url
    }

    #[tokio::test]
    async fn first_connect_asks_for_a_resync() {
        let url = one_shot_feed().await;
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        spawn_listener(url, tx, cancel.clone());

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(first, Some(FeedEvent::Resync));
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(second, Some(FeedEvent::Changed(vec![Collection::Children])));
        cancel.cancel();
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut b = 1;
        let mut seen = vec![];
        for _ in 0..7 {
            b = next_backoff(b);
            seen.push(b);
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 30, 30, 30]);
    }
}
