// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v5::{
    AuthPacket, DisconnectPacket, Frame, Property, PublishAckPacket, PublishCompletePacket,
    PublishPacket, PublishReceivedPacket, PublishReleasePacket, ReasonCode, SubscribeAckPacket,
    UnsubscribeAckPacket,
};
use codec::{BinaryData, QoS, StringData};

use super::inflight::PublishPhase;
use super::run::Outcome;
use super::{Session, Status};
use crate::error::{Error, ErrorKind};
use crate::types::Message;

impl Session {
    /// Route one incoming packet while connected.
    ///
    /// CONNACK, AUTH and server DISCONNECT touch the session itself;
    /// acknowledgement packets find their waiting operation by packet id;
    /// PUBLISH goes to the inbound message channel.
    pub(super) fn dispatch_frame(&mut self, frame: Frame) -> Outcome {
        match frame {
            Frame::Publish(packet) => self.on_publish(&packet),
            Frame::PublishAck(packet) => self.on_publish_ack(&packet),
            Frame::PublishReceived(packet) => self.on_publish_received(&packet),
            Frame::PublishRelease(packet) => self.on_publish_release(&packet),
            Frame::PublishComplete(packet) => self.on_publish_complete(&packet),
            Frame::SubscribeAck(packet) => self.on_subscribe_ack(&packet),
            Frame::UnsubscribeAck(packet) => self.on_unsubscribe_ack(&packet),
            Frame::PingResponse(_) => {
                self.ping_sent = None;
                Outcome::Continue
            }
            Frame::Disconnect(packet) => self.on_server_disconnect(&packet),
            Frame::Auth(packet) => self.on_auth(&packet),
            Frame::ConnectAck(_) => self.protocol_violation(
                ReasonCode::ProtocolError,
                "Second CONNACK on a live connection",
            ),
            Frame::Connect(_)
            | Frame::Subscribe(_)
            | Frame::Unsubscribe(_)
            | Frame::PingRequest(_) => self.protocol_violation(
                ReasonCode::ProtocolError,
                "Client-only packet received from broker",
            ),
        }
    }

    fn deliver(&mut self, packet: &PublishPacket) {
        let message = Message {
            topic: packet.topic().to_owned(),
            payload: packet.message().to_vec(),
            properties: packet.properties().clone(),
        };
        // The channel is unbounded; send only fails when the client side
        // is gone, in which case messages are silently discarded.
        if self.msg_sender.send(message).is_err() {
            log::info!("session: inbound message dropped, receiver is gone");
        }
    }

    /// An application message arrived.
    fn on_publish(&mut self, packet: &PublishPacket) -> Outcome {
        match packet.qos() {
            QoS::AtMostOnce => {
                self.deliver(packet);
                Outcome::Continue
            }
            QoS::AtLeastOnce => {
                self.deliver(packet);
                let ack = PublishAckPacket::new(packet.packet_id());
                if self.enqueue(&ack).is_err() {
                    return Outcome::Reconnect;
                }
                Outcome::Continue
            }
            QoS::ExactOnce => {
                let packet_id = packet.packet_id();
                // Deliver once; a DUP resend of an id we have already seen
                // is acknowledged but not delivered again [MQTT-4.3.3].
                if !self.incoming_qos2.contains(&packet_id) {
                    self.incoming_qos2.insert(packet_id);
                    self.deliver(packet);
                }
                let ack = PublishReceivedPacket::new(packet_id);
                if self.enqueue(&ack).is_err() {
                    return Outcome::Reconnect;
                }
                Outcome::Continue
            }
        }
    }

    /// PUBACK finishes a `QoS` 1 publish.
    fn on_publish_ack(&mut self, packet: &PublishAckPacket) -> Outcome {
        let packet_id = packet.packet_id();
        if self.orphaned_ids.remove(&packet_id) {
            // The caller cancelled this publish; the ack just closes
            // the exchange.
            self.registry.release(packet_id);
            self.drain_publish_backlog();
            return Outcome::Continue;
        }
        let Some(record) = self.publishing_packets.remove(&packet_id) else {
            return self.protocol_violation(
                ReasonCode::ProtocolError,
                "PUBACK with unknown packet id",
            );
        };
        if record.phase != PublishPhase::AwaitingAck {
            self.publishing_packets.insert(packet_id, record);
            return self.protocol_violation(
                ReasonCode::ProtocolError,
                "PUBACK for a QoS 2 publish",
            );
        }

        self.registry.release(packet_id);
        let _ = record
            .reply
            .send(Ok((packet.reason_code(), packet.properties().clone())));
        self.drain_publish_backlog();
        Outcome::Continue
    }

    /// PUBREC moves a `QoS` 2 publish into its second half.
    fn on_publish_received(&mut self, packet: &PublishReceivedPacket) -> Outcome {
        let packet_id = packet.packet_id();
        if self.orphaned_ids.contains(&packet_id) {
            if packet.reason_code().is_error() {
                self.orphaned_ids.remove(&packet_id);
                self.registry.release(packet_id);
                self.drain_publish_backlog();
                return Outcome::Continue;
            }
            // Finish the QoS 2 exchange for the cancelled publish; the id
            // stays quarantined until PUBCOMP.
            let release = PublishReleasePacket::new(packet_id);
            if self.enqueue(&release).is_err() {
                return Outcome::Reconnect;
            }
            return Outcome::Continue;
        }
        let Some(record) = self.publishing_packets.get_mut(&packet_id) else {
            return self.protocol_violation(
                ReasonCode::ProtocolError,
                "PUBREC with unknown packet id",
            );
        };
        if record.phase != PublishPhase::AwaitingReceived {
            return self.protocol_violation(
                ReasonCode::ProtocolError,
                "PUBREC out of order",
            );
        }

        if packet.reason_code().is_error() {
            // The broker refused the message; the exchange ends here.
            let Some(record) = self.publishing_packets.remove(&packet_id) else {
                return Outcome::Continue;
            };
            self.registry.release(packet_id);
            let _ = record
                .reply
                .send(Ok((packet.reason_code(), packet.properties().clone())));
            self.drain_publish_backlog();
            return Outcome::Continue;
        }

        record.phase = PublishPhase::AwaitingComplete;
        let release = PublishReleasePacket::new(packet_id);
        if self.enqueue(&release).is_err() {
            return Outcome::Reconnect;
        }
        Outcome::Continue
    }

    /// Server-side PUBREL for an inbound `QoS` 2 message.
    fn on_publish_release(&mut self, packet: &PublishReleasePacket) -> Outcome {
        let packet_id = packet.packet_id();
        // A PUBREL for an unknown id is still acknowledged [MQTT-4.3.3].
        self.incoming_qos2.remove(&packet_id);
        let complete = PublishCompletePacket::new(packet_id);
        if self.enqueue(&complete).is_err() {
            return Outcome::Reconnect;
        }
        Outcome::Continue
    }

    /// PUBCOMP finishes a `QoS` 2 publish.
    fn on_publish_complete(&mut self, packet: &PublishCompletePacket) -> Outcome {
        let packet_id = packet.packet_id();
        if self.orphaned_ids.remove(&packet_id) {
            self.registry.release(packet_id);
            self.drain_publish_backlog();
            return Outcome::Continue;
        }
        let Some(record) = self.publishing_packets.remove(&packet_id) else {
            return self.protocol_violation(
                ReasonCode::ProtocolError,
                "PUBCOMP with unknown packet id",
            );
        };
        if record.phase != PublishPhase::AwaitingComplete {
            self.publishing_packets.insert(packet_id, record);
            return self.protocol_violation(
                ReasonCode::ProtocolError,
                "PUBCOMP before PUBREL was sent",
            );
        }

        self.registry.release(packet_id);
        let _ = record
            .reply
            .send(Ok((packet.reason_code(), packet.properties().clone())));
        self.drain_publish_backlog();
        Outcome::Continue
    }

    fn on_subscribe_ack(&mut self, packet: &SubscribeAckPacket) -> Outcome {
        let packet_id = packet.packet_id();
        if self.orphaned_ids.remove(&packet_id) {
            self.registry.release(packet_id);
            return Outcome::Continue;
        }
        let Some(pending) = self.subscribing_packets.remove(&packet_id) else {
            return self.protocol_violation(
                ReasonCode::ProtocolError,
                "SUBACK with unknown packet id",
            );
        };
        self.registry.release(packet_id);
        let _ = pending
            .reply
            .send(Ok((packet.reasons().to_vec(), packet.properties().clone())));
        Outcome::Continue
    }

    fn on_unsubscribe_ack(&mut self, packet: &UnsubscribeAckPacket) -> Outcome {
        let packet_id = packet.packet_id();
        if self.orphaned_ids.remove(&packet_id) {
            self.registry.release(packet_id);
            return Outcome::Continue;
        }
        let Some(pending) = self.unsubscribing_packets.remove(&packet_id) else {
            return self.protocol_violation(
                ReasonCode::ProtocolError,
                "UNSUBACK with unknown packet id",
            );
        };
        self.registry.release(packet_id);
        let _ = pending
            .reply
            .send(Ok((packet.reasons().to_vec(), packet.properties().clone())));
        Outcome::Continue
    }

    /// The broker is closing the connection.
    fn on_server_disconnect(&mut self, packet: &DisconnectPacket) -> Outcome {
        if let Some(reason_string) = packet.properties().reason_string() {
            log::warn!(
                "session: broker disconnect: {:?}, {reason_string}",
                packet.reason_code()
            );
        } else {
            log::warn!("session: broker disconnect: {:?}", packet.reason_code());
        }
        // No DISCONNECT is sent back; tear down and reconnect.
        self.status = Status::Disconnecting;
        Outcome::Reconnect
    }

    /// AUTH on a live connection: a re-authentication round.
    fn on_auth(&mut self, packet: &AuthPacket) -> Outcome {
        match packet.reason_code() {
            ReasonCode::Success => {
                if let Some(reply) = self.reauth_reply.take() {
                    let _ = reply.send(Ok(()));
                    Outcome::Continue
                } else {
                    self.protocol_violation(
                        ReasonCode::ProtocolError,
                        "AUTH success without a pending exchange",
                    )
                }
            }
            ReasonCode::ContinueAuthentication => {
                let Some(authenticator) = self.authenticator.as_mut() else {
                    return self.protocol_violation(
                        ReasonCode::ProtocolError,
                        "AUTH exchange without an authenticator",
                    );
                };
                let server_data = packet.properties().authentication_data().unwrap_or(&[]);
                let client_data = match authenticator.continue_auth(server_data) {
                    Ok(data) => data,
                    Err(err) => {
                        if let Some(reply) = self.reauth_reply.take() {
                            let _ = reply.send(Err(err));
                        }
                        return self.protocol_violation(
                            ReasonCode::ProtocolError,
                            "Authenticator rejected server data",
                        );
                    }
                };
                match self.build_auth_continue(&client_data) {
                    Ok(reply_packet) => {
                        if self.enqueue(&reply_packet).is_err() {
                            return Outcome::Reconnect;
                        }
                        Outcome::Continue
                    }
                    Err(err) => {
                        if let Some(reply) = self.reauth_reply.take() {
                            let _ = reply.send(Err(err));
                        }
                        Outcome::Reconnect
                    }
                }
            }
            _ => self.protocol_violation(ReasonCode::ProtocolError, "Invalid AUTH reason code"),
        }
    }

    fn build_auth_continue(&mut self, client_data: &[u8]) -> Result<AuthPacket, Error> {
        let Some(authenticator) = self.authenticator.as_ref() else {
            return Err(Error::new(
                ErrorKind::AuthFailed,
                "No authenticator configured",
            ));
        };
        let mut packet = AuthPacket::with_reason(ReasonCode::ContinueAuthentication);
        let method = StringData::from(authenticator.method())?;
        packet
            .properties_mut()
            .push(Property::AuthenticationMethod(method));
        packet.properties_mut().push(Property::AuthenticationData(
            BinaryData::from_slice(client_data)?,
        ));
        Ok(packet)
    }
}
