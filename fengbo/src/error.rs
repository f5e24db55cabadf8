// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;

use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;

/// Represent the types of errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Error occurred while performing I/O.
    IoError,

    /// Packet encode error.
    EncodeError,

    /// Packet decode error.
    DecodeError,

    /// Socket stream error.
    SocketError,

    /// Cert files error.
    CertError,

    /// Broker endpoint address is invalid.
    InvalidAddress,

    /// No broker endpoint is configured, or every endpoint was rejected
    /// with a terminal reason.
    NoBroker,

    /// All 65535 packet identifiers are taken by in-flight operations.
    PidOverrun,

    /// The connection was lost before the operation was acknowledged and
    /// the operation is not resent on the new connection.
    SessionExpired,

    /// The operation or the whole client was cancelled.
    OperationCancelled,

    /// The operation did not finish within the configured deadline.
    Timeout,

    /// Outgoing packet violates MQTT 5 field constraints.
    MalformedPacket,

    /// Topic name or topic filter violates MQTT topic syntax.
    InvalidTopic,

    /// Serialized packet exceeds the Maximum Packet Size announced
    /// by the broker.
    PacketTooLarge,

    /// Broker announced `wildcard_subscription_available=0`.
    WildcardSubscriptionNotAvailable,

    /// Broker announced `shared_subscription_available=0`.
    SharedSubscriptionNotAvailable,

    /// Broker announced `subscription_identifier_available=0`.
    SubscriptionIdentifierNotAvailable,

    /// Broker announced `retain_available=0`.
    RetainNotAvailable,

    /// Requested `QoS` exceeds the Maximum QoS announced by the broker.
    QoSNotSupported,

    /// Broker refused the connection with a terminal authentication reason.
    AuthFailed,

    /// mpsc/oneshot channel error, the session task is gone.
    ChannelError,
}

#[derive(Debug, Clone)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
        }
    }

    pub fn from_string(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_string(ErrorKind::IoError, format!("IoError {err}"))
    }
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Self::from_string(ErrorKind::SocketError, format!("Websocket error: {err}"))
    }
}

impl From<tokio_rustls::rustls::Error> for Error {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::from_string(ErrorKind::CertError, format!("Rustls error: {err}"))
    }
}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        let kind = match err {
            codec::EncodeError::InvalidTopic => ErrorKind::InvalidTopic,
            codec::EncodeError::TooManyData | codec::EncodeError::InvalidString => {
                ErrorKind::MalformedPacket
            }
            _ => ErrorKind::EncodeError,
        };
        Self::from_string(kind, format!("{err:?}"))
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::from_string(ErrorKind::DecodeError, format!("{err:?}"))
    }
}

impl From<codec::topic::TopicError> for Error {
    fn from(err: codec::topic::TopicError) -> Self {
        Self::from_string(ErrorKind::InvalidTopic, format!("{err:?}"))
    }
}

impl From<codec::utils::StringError> for Error {
    fn from(err: codec::utils::StringError) -> Self {
        Self::from_string(ErrorKind::MalformedPacket, format!("{err:?}"))
    }
}

impl From<codec::VarIntError> for Error {
    fn from(err: codec::VarIntError) -> Self {
        Self::from_string(ErrorKind::MalformedPacket, format!("{err:?}"))
    }
}

impl From<oneshot::error::RecvError> for Error {
    fn from(err: oneshot::error::RecvError) -> Self {
        Self::from_string(
            ErrorKind::ChannelError,
            format!("Session dropped reply channel: {err}"),
        )
    }
}

impl<T> From<mpsc::error::SendError<T>> for Error {
    fn from(err: mpsc::error::SendError<T>) -> Self {
        Self::from_string(ErrorKind::ChannelError, format!("Session is gone: {err}"))
    }
}
