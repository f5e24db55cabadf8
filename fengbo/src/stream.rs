// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{self, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use crate::connect_options::{ConnectOptions, ConnectType, Endpoint, TlsType};
use crate::error::{Error, ErrorKind};

/// A duplex byte-stream connection to a broker.
///
/// The session core only consumes `connect`/`read_buf`/`write_all`/
/// `shutdown`; everything transport specific, including the TLS handshake
/// and the WebSocket upgrade, lives here.
pub enum Stream {
    Mqtt(TcpStream),
    Mqtts(Box<TlsStream<TcpStream>>),
    Ws(Box<WebSocketStream<TcpStream>>),
    Wss(Box<WebSocketStream<TlsStream<TcpStream>>>),
}

/// Pick the SNI host name for a TLS handshake against `endpoint`.
///
/// The endpoint host is used unless the options carry an override, which
/// is needed when brokers are addressed by IP but present a certificate
/// for their DNS name.
fn assign_sni(endpoint: &Endpoint, options: &ConnectOptions) -> Result<ServerName, Error> {
    let name = options.tls_server_name().unwrap_or_else(|| endpoint.host());
    ServerName::try_from(name).map_err(|err| {
        Error::from_string(
            ErrorKind::CertError,
            format!("Invalid SNI host name {name}: {err}"),
        )
    })
}

fn tls_connector(tls_type: &TlsType) -> Result<TlsConnector, Error> {
    let mut root_store = RootCertStore::empty();
    match tls_type {
        TlsType::CASigned => {
            root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
        }
        TlsType::SelfSigned { root_ca_pem } => {
            let fd = File::open(root_ca_pem)?;
            let mut reader = BufReader::new(fd);
            let certs = rustls_pemfile::certs(&mut reader)?;
            if certs.is_empty() {
                return Err(Error::from_string(
                    ErrorKind::CertError,
                    format!("No certificate found in {}", root_ca_pem.display()),
                ));
            }
            for cert in certs {
                root_store.add(&rustls::Certificate(cert))?;
            }
        }
    }

    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

fn ws_request(
    scheme: &str,
    endpoint: &Endpoint,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, Error> {
    let url = format!(
        "{scheme}://{}:{}{}",
        endpoint.host(),
        endpoint.port(),
        endpoint.path()
    );
    let mut request = url.into_client_request()?;
    // MQTT over WebSocket uses the `mqtt` subprotocol [MQTT-6.0.0-4].
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("mqtt"));
    Ok(request)
}

impl Stream {
    /// Establish byte-stream connectivity to `endpoint` with the transport
    /// configured in `options`.
    ///
    /// # Errors
    ///
    /// Returns error if the TCP connect, TLS handshake or WebSocket upgrade
    /// fails.
    pub async fn connect(endpoint: &Endpoint, options: &ConnectOptions) -> Result<Self, Error> {
        match options.connect_type() {
            ConnectType::Mqtt => Self::new_mqtt(endpoint).await,
            ConnectType::Mqtts(tls_type) => Self::new_mqtts(endpoint, tls_type, options).await,
            ConnectType::Ws => Self::new_ws(endpoint).await,
            ConnectType::Wss(tls_type) => Self::new_wss(endpoint, tls_type, options).await,
        }
    }

    async fn new_tcp(endpoint: &Endpoint) -> Result<TcpStream, Error> {
        TcpStream::connect((endpoint.host(), endpoint.port()))
            .await
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::SocketError,
                    format!("Failed to connect to {endpoint}: {err}"),
                )
            })
    }

    async fn new_mqtt(endpoint: &Endpoint) -> Result<Self, Error> {
        let tcp_stream = Self::new_tcp(endpoint).await?;
        Ok(Self::Mqtt(tcp_stream))
    }

    async fn new_mqtts(
        endpoint: &Endpoint,
        tls_type: &TlsType,
        options: &ConnectOptions,
    ) -> Result<Self, Error> {
        let connector = tls_connector(tls_type)?;
        let server_name = assign_sni(endpoint, options)?;
        let tcp_stream = Self::new_tcp(endpoint).await?;
        let tls_stream = connector.connect(server_name, tcp_stream).await?;
        Ok(Self::Mqtts(Box::new(tls_stream)))
    }

    async fn new_ws(endpoint: &Endpoint) -> Result<Self, Error> {
        let request = ws_request("ws", endpoint)?;
        let tcp_stream = Self::new_tcp(endpoint).await?;
        let (ws_stream, _response) = tokio_tungstenite::client_async(request, tcp_stream).await?;
        Ok(Self::Ws(Box::new(ws_stream)))
    }

    async fn new_wss(
        endpoint: &Endpoint,
        tls_type: &TlsType,
        options: &ConnectOptions,
    ) -> Result<Self, Error> {
        let connector = tls_connector(tls_type)?;
        let server_name = assign_sni(endpoint, options)?;
        let request = ws_request("wss", endpoint)?;
        let tcp_stream = Self::new_tcp(endpoint).await?;
        let tls_stream = connector.connect(server_name, tcp_stream).await?;
        let (ws_stream, _response) = tokio_tungstenite::client_async(request, tls_stream).await?;
        Ok(Self::Wss(Box::new(ws_stream)))
    }

    /// Read some bytes from stream into `buf`.
    ///
    /// Returns number of bytes read; zero means the peer closed
    /// the connection.
    ///
    /// # Errors
    ///
    /// Returns error if stream/socket gets error.
    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp_stream) => Ok(tcp_stream.read_buf(buf).await?),
            Self::Mqtts(tls_stream) => Ok(tls_stream.read_buf(buf).await?),
            Self::Ws(ws_stream) => {
                if let Some(msg) = ws_stream.next().await {
                    let msg = msg?;
                    let data = msg.into_data();
                    let data_len = data.len();
                    buf.extend(data);
                    Ok(data_len)
                } else {
                    Ok(0)
                }
            }
            Self::Wss(wss_stream) => {
                if let Some(msg) = wss_stream.next().await {
                    let msg = msg?;
                    let data = msg.into_data();
                    let data_len = data.len();
                    buf.extend(data);
                    Ok(data_len)
                } else {
                    Ok(0)
                }
            }
        }
    }

    /// Write the whole of `buf` to stream.
    ///
    /// # Errors
    ///
    /// Returns error if socket/stream gets error.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        match self {
            Self::Mqtt(tcp_stream) => Ok(tcp_stream.write_all(buf).await?),
            Self::Mqtts(tls_stream) => Ok(tls_stream.write_all(buf).await?),
            Self::Ws(ws_stream) => {
                let msg = Message::binary(buf);
                ws_stream.send(msg).await?;
                Ok(())
            }
            Self::Wss(wss_stream) => {
                let msg = Message::binary(buf);
                wss_stream.send(msg).await?;
                Ok(())
            }
        }
    }

    /// Tear the connection down.
    pub async fn shutdown(&mut self) {
        let ret = match self {
            Self::Mqtt(tcp_stream) => tcp_stream.shutdown().await.map_err(Error::from),
            Self::Mqtts(tls_stream) => tls_stream.shutdown().await.map_err(Error::from),
            Self::Ws(ws_stream) => ws_stream.close(None).await.map_err(Error::from),
            Self::Wss(wss_stream) => wss_stream.close(None).await.map_err(Error::from),
        };
        if let Err(err) = ret {
            log::info!("stream: ignore shutdown error: {err}");
        }
    }
}
