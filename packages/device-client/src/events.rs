//! Server-sent event channel of the device API

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use handysync_shared_config::DeviceConfig;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{truncate_error_body, DeviceError, DeviceResult};
use crate::models::DeviceEvent;
use crate::session::{auth_headers, SessionIdentity};

/// Live subscription to device events
pub type EventSubscription = Pin<Box<dyn Stream<Item = DeviceResult<DeviceEvent>> + Send>>;

/// Open the event channel for one session identity
///
/// The connection key and credential travel as `ck` / `apikey` query
/// parameters (browser event sources cannot set headers) and as the usual
/// headers.
pub(crate) async fn subscribe(
    http_client: &Client,
    config: &DeviceConfig,
    identity: &SessionIdentity,
) -> DeviceResult<EventSubscription> {
    let url = config.events_url();
    let headers = auth_headers(identity)?;

    debug!(url = %url, "Opening device event stream");

    let response = http_client
        .get(&url)
        .headers(headers)
        .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
        .query(&[
            ("ck", identity.connection_key.as_str()),
            ("apikey", identity.app_key.as_str()),
        ])
        .send()
        .await
        .map_err(|e| DeviceError::from_transport(e, &config.api_url))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!(status, "Device event stream rejected");
        return Err(DeviceError::Status {
            status,
            body: truncate_error_body(body),
        });
    }

    Ok(Box::pin(SseStream::new(response.bytes_stream())))
}

/// Event being assembled from `field: value` lines
#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl PendingEvent {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_empty()
    }

    fn take(&mut self) -> DeviceEvent {
        let pending = std::mem::take(self);
        DeviceEvent {
            event: pending.event.unwrap_or_else(|| "message".to_string()),
            data: pending.data.join("\n"),
            id: pending.id,
        }
    }
}

/// A stream adapter that parses `text/event-stream` from a byte stream
pub(crate) struct SseStream<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: PendingEvent,
    ready: VecDeque<DeviceEvent>,
    finished: bool,
}

impl<S> SseStream<S> {
    pub(crate) fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            pending: PendingEvent::default(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    /// Consume every complete line in the buffer
    fn drain_lines(&mut self) {
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let text = String::from_utf8_lossy(&raw[..newline_pos]).into_owned();
            let line = text.strip_suffix('\r').unwrap_or(text.as_str());
            self.process_line(line);
        }
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            if !self.pending.is_empty() {
                let event = self.pending.take();
                self.ready.push_back(event);
            }
            return;
        }

        // Comment / keep-alive
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data.push(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            _ => {}
        }
    }

    /// Flush a trailing line and event when the byte stream ends
    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            self.process_line(&line);
        }
        if !self.pending.is_empty() {
            let event = self.pending.take();
            self.ready.push_back(event);
        }
        self.finished = true;
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = DeviceResult<DeviceEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(DeviceError::Stream(e.to_string()))));
                }
                Poll::Ready(None) => self.finish(),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio_stream::iter;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        let owned: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        iter(owned)
    }

    async fn collect(parts: &[&str]) -> Vec<DeviceEvent> {
        SseStream::new(chunks(parts))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_parses_named_events() {
        let events = collect(&[
            "event: device_status\ndata: {\"connected\":true}\n\n",
            "event: hssp_state\ndata: {\"play_state\":1}\nid: 7\n\n",
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "device_status");
        assert_eq!(
            events[0].json().unwrap()["connected"],
            serde_json::Value::Bool(true)
        );
        assert_eq!(events[1].event, "hssp_state");
        assert_eq!(events[1].id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_defaults_event_name_and_joins_data_lines() {
        let events = collect(&["data: first\ndata: second\n\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "first\nsecond");
        assert!(events[0].json().is_none());
    }

    #[tokio::test]
    async fn test_ignores_comments_and_handles_crlf() {
        let events = collect(&[": keep-alive\r\n\r\nevent: ping\r\ndata: 1\r\n\r\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "ping");
        assert_eq!(events[0].data, "1");
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let events = collect(&["event: mo", "de_changed\nda", "ta: {\"mode\":1}\n", "\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "mode_changed");
        assert_eq!(events[0].data, "{\"mode\":1}");
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let bytes = "data: 日本\n\n".as_bytes();
        let (a, b) = bytes.split_at(8);
        let stream = iter(vec![
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(a)),
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(b)),
        ]);
        let events: Vec<DeviceEvent> = SseStream::new(stream).map(|r| r.unwrap()).collect().await;
        assert_eq!(events[0].data, "日本");
    }

    #[tokio::test]
    async fn test_flushes_trailing_event_without_blank_line() {
        let events = collect(&["event: last\ndata: bye"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "last");
        assert_eq!(events[0].data, "bye");
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        let stream = iter(vec![
            Ok(Bytes::from("data: a\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "reset")),
        ]);
        let mut sse = SseStream::new(stream);

        assert_eq!(sse.next().await.unwrap().unwrap().data, "a");
        assert!(matches!(sse.next().await.unwrap(), Err(DeviceError::Stream(_))));
    }
}
