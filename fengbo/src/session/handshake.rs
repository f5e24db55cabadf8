// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Instant;

use codec::v5::{
    AuthPacket, ConnectAckPacket, ConnectPacket, DisconnectPacket, Frame, Property,
    PublishReleasePacket, ReasonCode,
};
use codec::{BinaryData, EncodePacket, StringData};

use super::inflight::PublishPhase;
use super::{Session, Status};
use crate::error::{Error, ErrorKind};
use crate::stream::Stream;
use crate::validator::ServerCaps;

/// Why a connection attempt did not reach `Connected`.
pub(super) enum HandshakeError {
    /// Retrying on another broker or after backoff makes sense.
    Retry(Error),

    /// The broker refused authentication; retrying cannot help and
    /// the client closes.
    Terminal(Error),
}

impl Session {
    /// Establish a connection to the current broker and run the CONNECT/
    /// CONNACK handshake, including the enhanced authentication exchange.
    pub(super) async fn connect_and_handshake(&mut self) -> Result<(), HandshakeError> {
        self.status = Status::Connecting;
        let endpoint = self.options.endpoints()[self.broker_index].clone();
        log::info!("session: connecting to {endpoint}");

        let deadline = tokio::time::Instant::now() + self.options.connect_timeout();
        let stream = tokio::time::timeout_at(
            deadline,
            Stream::connect(&endpoint, &self.options),
        )
        .await
        .map_err(|_| {
            HandshakeError::Retry(Error::from_string(
                ErrorKind::Timeout,
                format!("Timed out connecting to {endpoint}"),
            ))
        })?
        .map_err(HandshakeError::Retry)?;

        self.stream = Some(stream);
        self.read_buf.clear();
        self.send_queue.clear();
        self.status = Status::Handshaking;

        let connect_packet = self.build_connect_packet().map_err(HandshakeError::Terminal)?;
        self.write_packet_now(&connect_packet)
            .await
            .map_err(HandshakeError::Retry)?;

        // The first packet sent from the Server MUST be a CONNACK or AUTH
        // packet [MQTT-3.2.0-1].
        loop {
            let frame = self
                .read_frame(deadline)
                .await
                .map_err(HandshakeError::Retry)?;
            match frame {
                Frame::ConnectAck(packet) => return self.on_connect_ack(&packet).await,
                Frame::Auth(packet) => {
                    self.on_handshake_auth(&packet)
                        .await
                        .map_err(HandshakeError::Retry)?;
                }
                Frame::Disconnect(packet) => {
                    return Err(HandshakeError::Retry(Error::from_string(
                        ErrorKind::SocketError,
                        format!(
                            "Broker disconnected during handshake: {:?}",
                            packet.reason_code()
                        ),
                    )));
                }
                other => {
                    return Err(HandshakeError::Retry(Error::from_string(
                        ErrorKind::SocketError,
                        format!(
                            "Unexpected packet before CONNACK: {:?}",
                            other.packet_type()
                        ),
                    )));
                }
            }
        }
    }

    fn build_connect_packet(&mut self) -> Result<ConnectPacket, Error> {
        let mut packet = ConnectPacket::new(&self.client_id)?;
        // CleanStart as configured on the first connect; session resumption
        // on every reconnect after that.
        let clean_start = if self.epoch == 0 {
            self.options.clean_start()
        } else {
            false
        };
        packet
            .set_clean_start(clean_start)
            .set_keep_alive(self.options.keep_alive())
            .set_will(self.options.will().cloned());
        packet.set_username(self.options.username())?;
        packet.set_password(self.options.password())?;
        for property in self.options.connect_properties().props() {
            packet.properties_mut().push(property.clone());
        }

        if let Some(authenticator) = self.authenticator.as_mut() {
            let method = StringData::from(authenticator.method())?;
            packet
                .properties_mut()
                .push(Property::AuthenticationMethod(method));
            if let Some(data) = authenticator.initial_data()? {
                let data = BinaryData::from_slice(&data)?;
                packet
                    .properties_mut()
                    .push(Property::AuthenticationData(data));
            }
        }

        Ok(packet)
    }

    /// Answer a server AUTH challenge received before CONNACK.
    async fn on_handshake_auth(&mut self, packet: &AuthPacket) -> Result<(), Error> {
        if packet.reason_code() != ReasonCode::ContinueAuthentication {
            return Err(Error::from_string(
                ErrorKind::SocketError,
                format!("Unexpected AUTH reason: {:?}", packet.reason_code()),
            ));
        }
        let Some(authenticator) = self.authenticator.as_mut() else {
            return Err(Error::new(
                ErrorKind::AuthFailed,
                "Broker started an auth exchange but no authenticator is set",
            ));
        };

        let server_data = packet.properties().authentication_data().unwrap_or(&[]);
        let client_data = authenticator.continue_auth(server_data)?;
        let method = StringData::from(authenticator.method())?;

        let mut reply = AuthPacket::with_reason(ReasonCode::ContinueAuthentication);
        reply
            .properties_mut()
            .push(Property::AuthenticationMethod(method));
        reply.properties_mut().push(Property::AuthenticationData(
            BinaryData::from_slice(&client_data)?,
        ));
        self.write_packet_now(&reply).await
    }

    /// Apply a CONNACK: capture limits, settle session state, resend
    /// in-flight publishes and flush queued operations.
    async fn on_connect_ack(&mut self, packet: &ConnectAckPacket) -> Result<(), HandshakeError> {
        let reason_code = packet.reason_code();
        if reason_code.is_error() {
            let err = Error::from_string(
                ErrorKind::SocketError,
                format!("Broker refused connection: {reason_code:?}"),
            );
            // Authentication failures are not going to resolve by retrying.
            return match reason_code {
                ReasonCode::NotAuthorized | ReasonCode::BadAuthenticationMethod => {
                    Err(HandshakeError::Terminal(Error::new(
                        ErrorKind::AuthFailed,
                        err.message(),
                    )))
                }
                _ => Err(HandshakeError::Retry(err)),
            };
        }

        self.caps = ServerCaps::from_connect_ack(packet);
        self.session_present = packet.session_present();
        self.epoch += 1;

        if let Some(assigned) = self.caps.assigned_client_id.clone() {
            if self.client_id.is_empty() {
                log::info!("session: broker assigned client id {assigned}");
                self.client_id = assigned;
            }
        }
        self.keep_alive = self.caps.server_keep_alive.unwrap_or_else(|| self.options.keep_alive());

        if self.session_present {
            if self.options.strict_session_present()
                && self.epoch == 1
                && self.publishing_packets.is_empty()
            {
                // A brand new client cannot have a session to resume.
                let disconnect = DisconnectPacket::with_reason(ReasonCode::ProtocolError);
                let _ = self.write_packet_now(&disconnect).await;
                return Err(HandshakeError::Retry(Error::new(
                    ErrorKind::DecodeError,
                    "Broker claims session present for a fresh session",
                )));
            }
            self.resend_inflight().map_err(HandshakeError::Retry)?;
        } else {
            self.drop_inflight();
        }

        self.status = Status::Connected;
        self.last_write = Instant::now();
        self.ping_sent = None;
        log::info!(
            "session: connected to {}, session_present: {}",
            self.options.endpoints()[self.broker_index],
            self.session_present
        );

        self.flush_operation_backlog().map_err(HandshakeError::Retry)?;
        self.flush_send_queue().await.map_err(HandshakeError::Retry)?;
        Ok(())
    }

    /// Reissue unacknowledged `QoS` 1/2 exchanges, in ascending packet-id
    /// order [MQTT-4.4.0-1].
    fn resend_inflight(&mut self) -> Result<(), Error> {
        let packet_ids: Vec<_> = self.publishing_packets.keys().copied().collect();
        for packet_id in packet_ids {
            let Some(record) = self.publishing_packets.get_mut(&packet_id) else {
                continue;
            };
            match record.phase {
                PublishPhase::AwaitingAck | PublishPhase::AwaitingReceived => {
                    record.dup = true;
                    let packet = record.to_packet(packet_id)?;
                    let mut buf = Vec::new();
                    packet.encode(&mut buf)?;
                    self.send_queue.push_back(buf);
                }
                PublishPhase::AwaitingComplete => {
                    // The PUBLISH is already released; only PUBREL
                    // is repeated.
                    let packet = PublishReleasePacket::new(packet_id);
                    let mut buf = Vec::new();
                    packet.encode(&mut buf)?;
                    self.send_queue.push_back(buf);
                }
            }
        }
        Ok(())
    }

    /// The broker has no session for us: in-flight exchanges cannot
    /// complete any more.
    fn drop_inflight(&mut self) {
        for (packet_id, record) in std::mem::take(&mut self.publishing_packets) {
            self.registry.release(packet_id);
            let _ = record.reply.send(Err(Error::new(
                ErrorKind::SessionExpired,
                "Broker session expired before the publish was acknowledged",
            )));
        }
        self.incoming_qos2.clear();
    }

    /// Hand operations queued while offline to the normal send paths.
    fn flush_operation_backlog(&mut self) -> Result<(), Error> {
        while let Some(request) = self.subscribe_backlog.pop_front() {
            self.send_subscribe(request);
        }
        while let Some(request) = self.unsubscribe_backlog.pop_front() {
            self.send_unsubscribe(request);
        }
        self.drain_publish_backlog();
        Ok(())
    }

    /// Encode and write one packet, bypassing the send queue. Used during
    /// the handshake, before the queue discipline starts.
    pub(super) async fn write_packet_now<P>(&mut self, packet: &P) -> Result<(), Error>
    where
        P: EncodePacket,
    {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::new(ErrorKind::SocketError, "Stream is gone"));
        };
        stream.write_all(&buf).await?;
        self.last_write = Instant::now();
        Ok(())
    }

    /// Read one complete control packet, waiting for more bytes as needed.
    pub(super) async fn read_frame(
        &mut self,
        deadline: tokio::time::Instant,
    ) -> Result<Frame, Error> {
        loop {
            match Frame::parse(&self.read_buf) {
                Ok(Some((frame, consumed))) => {
                    self.read_buf.drain(..consumed);
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(err) => return Err(err.into()),
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(Error::new(ErrorKind::SocketError, "Stream is gone"));
            };
            let n_recv =
                tokio::time::timeout_at(deadline, stream.read_buf(&mut self.read_buf))
                    .await
                    .map_err(|_| Error::new(ErrorKind::Timeout, "Handshake timed out"))??;
            if n_recv == 0 {
                return Err(Error::new(
                    ErrorKind::SocketError,
                    "Connection closed during handshake",
                ));
            }
        }
    }
}
