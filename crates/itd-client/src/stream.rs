//! Server-sent notification stream

use std::time::Duration;

use eventsource_stream::{Event, EventStream, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};

use crate::error::{Result, TransportError};
use crate::http::{ByteStream, StreamResponse};
use crate::types::{ConnectedEvent, NotificationEvent};

/// The server pings every 15 seconds; one second of slack on top
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(16);

/// One decoded event from the stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected(ConnectedEvent),
    Notification(NotificationEvent),
    /// Any event type this client does not model
    Other { event: String, data: String },
}

impl StreamEvent {
    fn decode(event: Event) -> Result<Self> {
        Ok(match event.event.as_str() {
            "connected" => Self::Connected(serde_json::from_str(&event.data)?),
            "notification" => Self::Notification(serde_json::from_str(&event.data)?),
            _ => Self::Other {
                event: event.event,
                data: event.data,
            },
        })
    }
}

/// Live notification feed
///
/// Ends with `TransportError::Timeout` when the server goes quiet for longer
/// than [`IDLE_TIMEOUT`]. A payload that fails to decode yields an error for
/// that event only.
pub struct NotificationStream {
    events: EventStream<ByteStream>,
    idle_timeout: Duration,
    finished: bool,
}

impl NotificationStream {
    pub(crate) fn new(response: StreamResponse) -> Self {
        Self {
            events: response.body.eventsource(),
            idle_timeout: IDLE_TIMEOUT,
            finished: false,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Waits for the next event; `None` once the server closed the stream
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        if self.finished {
            return None;
        }

        match tokio::time::timeout(self.idle_timeout, self.events.next()).await {
            Ok(Some(Ok(event))) => Some(StreamEvent::decode(event)),
            Ok(Some(Err(err))) => {
                self.finished = true;
                let err = match err {
                    EventStreamError::Transport(err) => err,
                    other => TransportError::Stream(other.to_string()),
                };
                Some(Err(err.into()))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(_) => {
                self.finished = true;
                tracing::warn!("notification stream idle for {:?}", self.idle_timeout);
                Some(Err(TransportError::Timeout.into()))
            }
        }
    }

    /// Adapts the feed into a [`Stream`]
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next_event().await?;
            Some((item, stream))
        })
    }
}

impl std::fmt::Debug for NotificationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStream")
            .field("idle_timeout", &self.idle_timeout)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
