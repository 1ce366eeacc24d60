//! Framed delivery of one payload to a list of endpoints.
//!
//! Every endpoint gets its own connection: connect, write the MLLP frame, read
//! a single bounded reply, close. A failure at any step is recorded against
//! that endpoint and delivery moves on to the next one.

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::codec::MllpCodec;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result, SendError, Stage};

/// Largest reply captured per endpoint unless configured otherwise.
pub const DEFAULT_RESPONSE_BYTE_LIMIT: usize = 1024;
/// Default bound on each of connect, write and read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for [`Transport`]. A `None` timeout waits forever.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub connect_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub response_byte_limit: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            connect_timeout: Some(DEFAULT_TIMEOUT),
            write_timeout: Some(DEFAULT_TIMEOUT),
            read_timeout: Some(DEFAULT_TIMEOUT),
            response_byte_limit: DEFAULT_RESPONSE_BYTE_LIMIT,
        }
    }
}

impl TransportConfig {
    /// Applies the same bound to connect, write and read.
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.connect_timeout = limit;
        self.write_timeout = limit;
        self.read_timeout = limit;
        self
    }

    pub fn with_response_byte_limit(mut self, limit: usize) -> Self {
        self.response_byte_limit = limit;
        self
    }
}

/// Raw bytes an endpoint sent back, up to the configured limit. May be empty
/// if the peer closed without replying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    bytes: Bytes,
}

impl Response {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Response {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Best-effort decode for display.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// The reply with its MLLP envelope removed, if it held a whole frame.
    pub fn message(&self) -> Option<Bytes> {
        MllpCodec::unframe(&self.bytes)
    }
}

/// Outcome of one attempted delivery to one endpoint.
#[derive(Debug)]
pub struct DeliveryResult {
    pub endpoint: Endpoint,
    pub outcome: std::result::Result<Response, SendError>,
}

impl DeliveryResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Sends MLLP framed payloads. Holds no connection state between calls.
#[derive(Clone, Debug, Default)]
pub struct Transport {
    config: TransportConfig,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        Transport { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Frames `payload` and delivers it to each endpoint in order.
    ///
    /// Returns one [`DeliveryResult`] per endpoint, in the order given. Only
    /// precondition violations (an empty payload or endpoint list) are
    /// returned as `Err`; network failures are reported per endpoint and
    /// never stop the remaining deliveries. Nothing is retried.
    pub async fn send(&self, payload: &str, endpoints: &[Endpoint]) -> Result<Vec<DeliveryResult>> {
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }

        let frame = MllpCodec::frame(payload.as_bytes());
        let mut results = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let outcome = self.deliver(&frame, endpoint).await;
            match &outcome {
                Ok(response) => debug!("{}: {} byte response", endpoint, response.bytes().len()),
                Err(e) => debug!("{}: {}", endpoint, e),
            }
            results.push(DeliveryResult {
                endpoint: endpoint.clone(),
                outcome,
            });
        }
        Ok(results)
    }

    async fn deliver(&self, frame: &[u8], endpoint: &Endpoint) -> std::result::Result<Response, SendError> {
        let connect = async {
            TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                .await
                .map_err(SendError::Connect)
        };
        // dropped, and so closed, on every return below
        let mut stream = bounded(self.config.connect_timeout, Stage::Connect, connect).await?;
        trace!("{}: connected", endpoint);

        let write = async {
            stream.write_all(frame).await.map_err(SendError::Write)?;
            stream.flush().await.map_err(SendError::Write)
        };
        bounded(self.config.write_timeout, Stage::Write, write).await?;
        trace!("{}: wrote {} bytes", endpoint, frame.len());

        let mut buf = vec![0u8; self.config.response_byte_limit];
        let read = async {
            // a failed read counts as no reply, same as the peer closing
            Ok::<_, SendError>(stream.read(&mut buf).await.unwrap_or_else(|e| {
                debug!("{}: read failed, treating as empty response: {}", endpoint, e);
                0
            }))
        };
        let n = bounded(self.config.read_timeout, Stage::Read, read).await?;
        buf.truncate(n);

        Ok(Response::new(buf))
    }
}

async fn bounded<T, F>(limit: Option<Duration>, stage: Stage, fut: F) -> std::result::Result<T, SendError>
where
    F: Future<Output = std::result::Result<T, SendError>>,
{
    match limit {
        Some(limit) => timeout(limit, fut).await.map_err(|_| SendError::Timeout(stage))?,
        None => fut.await,
    }
}
