//! Error types for the cloud connector.
//!
//! Every failure the connector can observe is a [`ConnectorError`]. The phase
//! that decides between retrying and giving up wraps lower-level errors with
//! [`ConnectorError::in_phase`], and [`ConnectorError::severity`] tells the
//! supervisor what to do with whatever reaches it.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use vzconn_core::{CodecError, RegistrationStatus};

/// A result type using `ConnectorError`.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// The connection phase an error was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Opening the broker stream.
    Connect,
    /// Registration handshake.
    Register,
    /// TLS credential provisioning.
    ProvisionCerts,
    /// Heartbeat loop.
    Heartbeat,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "stream open",
            Self::Register => "vizier registration",
            Self::ProvisionCerts => "SSL cert provisioning",
            Self::Heartbeat => "heartbeat",
        })
    }
}

/// How the connector reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recovered locally by the phase that observed it.
    Transient,
    /// Setup cannot complete; the process must terminate.
    FatalStartup,
    /// The established connection is no longer trustworthy; the process must terminate.
    FatalRuntime,
    /// Logged and otherwise ignored.
    Ignorable,
}

/// Errors that can occur while connecting to and talking with the broker.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The broker stream could not be opened.
    #[error("could not start stream: {0}")]
    StreamOpen(String),

    /// Sending on the broker stream failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Receiving from the broker stream failed.
    #[error("receive failed: {0}")]
    Recv(String),

    /// The broker closed the stream.
    #[error("broker stream closed")]
    StreamClosed,

    /// A timed wait elapsed before the operation completed.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// An envelope could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The broker answered the registration with a non-OK status.
    #[error("vizier registration unsuccessful: status {0:?}")]
    RegistrationRejected(RegistrationStatus),

    /// Every registration attempt failed.
    #[error("registration not acknowledged after {attempts} attempts: {last}")]
    RegistrationExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error observed on the final attempt.
        last: Box<ConnectorError>,
    },

    /// The cert manager reported that the update did not apply.
    #[error("failed to update certs")]
    CertUpdateRejected,

    /// The cert manager could not be reached or answered with an error.
    #[error("cert manager error: {0}")]
    CertManager(String),

    /// A heartbeat ack echoed the wrong sequence number.
    #[error("received out of sequence heartbeat ack: expected {expected}, got {got}")]
    SequenceMismatch {
        /// Sequence number of the heartbeat just sent.
        expected: u64,
        /// Sequence number carried by the ack.
        got: u64,
    },

    /// The proxy address could not be resolved.
    #[error("unable to get vizier proxy address: {0}")]
    AddressLookup(String),

    /// An error wrapped with the phase that observed it.
    #[error("{phase} failed: {source}")]
    Phase {
        /// Phase the error was observed in.
        phase: Phase,
        /// Underlying error.
        #[source]
        source: Box<ConnectorError>,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Wrap this error with the phase that observed it.
    #[must_use]
    pub fn in_phase(self, phase: Phase) -> Self {
        Self::Phase {
            phase,
            source: Box::new(self),
        }
    }

    /// Returns the phase this error was attributed to, if any.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns the innermost error, unwrapping phase context.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify the error.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Phase { phase, .. } => match phase {
                Phase::Heartbeat => Severity::FatalRuntime,
                Phase::Connect | Phase::Register | Phase::ProvisionCerts => Severity::FatalStartup,
            },
            Self::Send(_)
            | Self::Recv(_)
            | Self::StreamClosed
            | Self::Timeout(_)
            | Self::Codec(_)
            | Self::RegistrationRejected(_) => Severity::Transient,
            Self::SequenceMismatch { .. } => Severity::FatalRuntime,
            Self::AddressLookup(_) => Severity::Ignorable,
            Self::StreamOpen(_)
            | Self::RegistrationExhausted { .. }
            | Self::CertUpdateRejected
            | Self::CertManager(_)
            | Self::Config(_)
            | Self::Internal(_) => Severity::FatalStartup,
        }
    }

    /// Returns true if the process must terminate because of this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.severity(),
            Severity::FatalStartup | Severity::FatalRuntime
        )
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        self.severity() == Severity::Transient
    }
}
