//! In-memory fakes for exercising the connector without a broker.
//!
//! [`memory_pair`] returns the Vizier half of a stream together with the
//! [`BrokerEnd`] a test drives. The Vizier half counts every `send` and `recv`
//! call so tests can assert on the exact shape of an exchange.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use vzconn_core::envelope::{self, Envelope, Message, Topic};

use crate::certs::CertApplier;
use crate::error::{ConnectorError, Result};
use crate::stream::{BrokerStream, Connector};

/// Vizier half of an in-memory broker stream.
pub struct MemoryStream {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    outbound: mpsc::UnboundedSender<Envelope>,
    sends: AtomicUsize,
    recvs: AtomicUsize,
    fail_sends: AtomicBool,
}

impl MemoryStream {
    /// Number of `send` calls made so far, failed ones included.
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Number of `recv` calls started so far.
    #[must_use]
    pub fn recv_count(&self) -> usize {
        self.recvs.load(Ordering::SeqCst)
    }

    /// Make every following `send` fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerStream for MemoryStream {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectorError::Send("injected send failure".to_string()));
        }
        self.outbound
            .send(envelope)
            .map_err(|_| ConnectorError::StreamClosed)
    }

    async fn recv(&self) -> Result<Envelope> {
        self.recvs.fetch_add(1, Ordering::SeqCst);
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(ConnectorError::StreamClosed)
    }
}

/// Broker half of an in-memory stream.
pub struct BrokerEnd {
    to_vizier: mpsc::UnboundedSender<Envelope>,
    from_vizier: mpsc::UnboundedReceiver<Envelope>,
}

impl BrokerEnd {
    /// Queue `message` for the Vizier under `topic`.
    pub fn reply<M: Message>(&self, message: M, topic: Topic) {
        self.push(envelope::wrap(message, topic));
    }

    /// Queue a raw envelope for the Vizier.
    pub fn push(&self, envelope: Envelope) {
        // The Vizier half may already be gone at the end of a test.
        let _ = self.to_vizier.send(envelope);
    }

    /// Wait for the next envelope the Vizier sent.
    pub async fn next_sent(&mut self) -> Option<Envelope> {
        self.from_vizier.recv().await
    }

    /// Take the next envelope the Vizier sent, if one is queued.
    pub fn try_next_sent(&mut self) -> Option<Envelope> {
        self.from_vizier.try_recv().ok()
    }
}

/// Create a connected in-memory stream pair.
#[must_use]
pub fn memory_pair() -> (Arc<MemoryStream>, BrokerEnd) {
    let (to_vizier, inbound) = mpsc::unbounded_channel();
    let (outbound, from_vizier) = mpsc::unbounded_channel();

    let stream = Arc::new(MemoryStream {
        inbound: tokio::sync::Mutex::new(inbound),
        outbound,
        sends: AtomicUsize::new(0),
        recvs: AtomicUsize::new(0),
        fail_sends: AtomicBool::new(false),
    });

    (
        stream,
        BrokerEnd {
            to_vizier,
            from_vizier,
        },
    )
}

/// Connector handing out a pre-built in-memory stream.
pub struct MemoryConnector {
    stream: Option<Arc<MemoryStream>>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    /// Connect to `stream`.
    #[must_use]
    pub fn new(stream: Arc<MemoryStream>) -> Self {
        Self {
            stream: Some(stream),
            connects: AtomicUsize::new(0),
        }
    }

    /// A connector whose broker can never be reached.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            stream: None,
            connects: AtomicUsize::new(0),
        }
    }

    /// Number of `connect` calls made so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerStream>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.stream {
            Some(stream) => Ok(Arc::clone(stream) as Arc<dyn BrokerStream>),
            None => Err(ConnectorError::StreamOpen("broker unreachable".to_string())),
        }
    }
}

/// Cert applier that records what it was given and answers a fixed `ok`.
pub struct RecordingCertApplier {
    ok: bool,
    calls: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl RecordingCertApplier {
    /// Create an applier answering `ok`.
    #[must_use]
    pub fn new(ok: bool) -> Self {
        Self {
            ok,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The `(key, cert)` pairs received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CertApplier for RecordingCertApplier {
    async fn update_certs(&self, key: &[u8], cert: &[u8]) -> Result<bool> {
        self.calls.lock().push((key.to_vec(), cert.to_vec()));
        Ok(self.ok)
    }
}
