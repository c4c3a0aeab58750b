//! Server-sent event client for the worker stream.
//!
//! [`SseDecoder`] turns arbitrary byte chunks into complete frames;
//! [`EventStreamClient`] keeps a connection open, forwards decoded events as
//! [`ViewInput`]s and reconnects after a fixed delay. Every reconnect starts
//! with a fresh snapshot from the server, so nothing has to be replayed.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::driver::ViewInput;
use super::error::ClientError;
use crate::worker::WorkerEvent;

/// Path of the event stream relative to the server base URL.
pub const STREAM_PATH: &str = "api/pull-requests/stream";

/// Delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// One complete SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// `data:` lines joined with newlines.
    pub data: String,
}

impl SseFrame {
    /// Decodes the frame's data as a worker event.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] when the data is not a valid event.
    pub fn decode(&self) -> Result<WorkerEvent, ClientError> {
        serde_json::from_str(&self.data).map_err(|error| ClientError::Decode {
            kind: self.event.clone().unwrap_or_else(|| "message".to_owned()),
            message: error.to_string(),
        })
    }
}

/// Incremental SSE frame decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: SseFrame,
    has_data: bool,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `chunk` and returns every frame it completes. Comment lines
    /// and frames without data are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.process_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            let frame = std::mem::take(&mut self.pending);
            return std::mem::take(&mut self.has_data).then_some(frame);
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line
            .split_once(':')
            .map_or((line, ""), |(field, value)| {
                (field, value.strip_prefix(' ').unwrap_or(value))
            });
        match field {
            "event" => self.pending.event = Some(value.to_owned()),
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            _ => {}
        }
        None
    }
}

/// Why a single connection ended.
enum StreamEnd {
    /// The server closed the stream.
    Closed,
    /// Nobody is listening for inputs any more.
    ReceiverGone,
    /// Shutdown was requested.
    Cancelled,
}

/// Follows the worker event stream with automatic reconnects.
#[derive(Debug, Clone)]
pub struct EventStreamClient {
    http: reqwest::Client,
    url: Url,
    reconnect_delay: Duration,
}

impl EventStreamClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] for an unparsable base URL and
    /// [`ClientError::Configuration`] when the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)?;
        let url = if base.path().ends_with('/') {
            base.join(STREAM_PATH)?
        } else {
            Url::parse(&format!("{base}/"))?.join(STREAM_PATH)?
        };
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| ClientError::Configuration {
                message: error.to_string(),
            })?;
        Ok(Self {
            http,
            url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        })
    }

    /// Overrides the reconnect delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Resolved stream URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Streams events into `inputs` until `cancel` fires or the receiver
    /// is dropped. Connection failures are reported as
    /// [`ViewInput::ConnectionLost`] and retried.
    pub async fn run(&self, inputs: UnboundedSender<ViewInput>, cancel: CancellationToken) {
        loop {
            let message = match self.follow(&inputs, &cancel).await {
                Ok(StreamEnd::Cancelled | StreamEnd::ReceiverGone) => return,
                Ok(StreamEnd::Closed) => "event stream closed by server".to_owned(),
                Err(error) => error.to_string(),
            };
            warn!(url = %self.url, %message, "event stream interrupted");
            if inputs.send(ViewInput::ConnectionLost(message)).is_err() {
                return;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    async fn follow(
        &self,
        inputs: &UnboundedSender<ViewInput>,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, ClientError> {
        let request = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .send();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            response = request => response?.error_for_status()?,
        };
        info!(url = %self.url, "event stream connected");

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                chunk = body.next() => chunk,
            };
            let Some(bytes) = chunk.transpose()? else {
                return Ok(StreamEnd::Closed);
            };

            for frame in decoder.feed(&bytes) {
                let input = match frame.decode() {
                    Ok(event) => ViewInput::Event(event),
                    Err(error) => {
                        debug!(%error, "skipping undecodable frame");
                        continue;
                    }
                };
                if inputs.send(input).is_err() {
                    return Ok(StreamEnd::ReceiverGone);
                }
            }
        }
    }
}
