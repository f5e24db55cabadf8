// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::{Duration, Instant};

use codec::v5::{
    AuthPacket, DisconnectPacket, Frame, PingRequestPacket, Properties, Property, PublishPacket,
    ReasonCode, SubscribePacket, UnsubscribePacket,
};
use codec::{BinaryData, PacketId, QoS, StringData, SubTopic};

use super::handshake::HandshakeError;
use super::inflight::{
    PublishInflight, PublishPhase, PublishRequest, SubscribeRequest, UnsubscribeRequest,
};
use super::inflight::{PendingSubscribe, PendingUnsubscribe};
use super::{Session, Status};
use crate::commands::{ClientToSessionCmd, Reply};
use crate::error::{Error, ErrorKind};
use crate::validator;

/// What the connected loop decided about the session's future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Outcome {
    Continue,
    Reconnect,
    Closed,
}

/// One thing the connected select loop woke up for.
enum Event {
    Read(Result<usize, Error>),
    Cmd(Option<ClientToSessionCmd>),
    Tick,
}

impl Session {
    /// Drive the session until the client is cancelled, disconnected or
    /// fails terminally.
    ///
    /// Connects to the configured brokers round-robin with exponential
    /// backoff, runs the packet loop while connected and transparently
    /// reconnects, resending unfinished `QoS` 1/2 exchanges.
    pub async fn run_loop(mut self) {
        if self.options.endpoints().is_empty() {
            log::error!("session: no broker endpoint configured");
            self.status = Status::Closed;
            self.fail_all_pending(ErrorKind::NoBroker, "No broker endpoint configured");
            return;
        }

        let mut delay = self.options.reconnect_min_delay();
        loop {
            match self.connect_and_handshake().await {
                Ok(()) => {
                    delay = self.options.reconnect_min_delay();
                    let outcome = self.run_connected().await;
                    self.on_connection_lost();
                    if outcome == Outcome::Closed {
                        self.status = Status::Closed;
                        break;
                    }
                    self.status = Status::ReconnectWait;
                }
                Err(HandshakeError::Terminal(err)) => {
                    log::error!("session: giving up: {err}");
                    self.status = Status::Closed;
                    self.fail_all_pending(ErrorKind::AuthFailed, err.message());
                    break;
                }
                Err(HandshakeError::Retry(err)) => {
                    log::warn!("session: connect failed: {err}");
                    self.on_connection_lost();
                    self.status = Status::ReconnectWait;
                }
            }

            self.broker_index = (self.broker_index + 1) % self.options.endpoints().len();
            if self.broker_index == 0 {
                // One full round over the broker list failed.
                delay = (delay * 2).min(self.options.reconnect_max_delay());
            }
            if !self.backoff(delay).await {
                self.status = Status::Closed;
                break;
            }
        }

        self.fail_all_pending(ErrorKind::OperationCancelled, "Client is closed");
    }

    /// Sleep before the next connection attempt, still accepting commands.
    ///
    /// Returns false if the client was cancelled while waiting.
    async fn backoff(&mut self, delay: Duration) -> bool {
        log::info!("session: next connect attempt in {delay:?}");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command_offline(cmd) == Outcome::Closed {
                            return false;
                        }
                        self.sweep_cancelled();
                    }
                    None => return false,
                },
            }
        }
    }

    /// The packet loop of a live connection.
    async fn run_connected(&mut self) -> Outcome {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            self.sweep_cancelled();
            if let Err(err) = self.flush_send_queue().await {
                log::error!("session: write failed: {err}");
                return Outcome::Reconnect;
            }

            let event = {
                let Some(stream) = self.stream.as_mut() else {
                    return Outcome::Reconnect;
                };
                tokio::select! {
                    ret = stream.read_buf(&mut self.read_buf) => Event::Read(ret),
                    cmd = self.receiver.recv() => Event::Cmd(cmd),
                    _ = tick.tick() => Event::Tick,
                }
            };

            let outcome = match event {
                Event::Read(Ok(0)) => {
                    log::info!("session: connection closed by broker");
                    Outcome::Reconnect
                }
                Event::Read(Ok(_)) => self.process_read_buf(),
                Event::Read(Err(err)) => {
                    log::error!("session: read failed: {err}");
                    Outcome::Reconnect
                }
                Event::Cmd(Some(cmd)) => self.handle_command(cmd),
                Event::Cmd(None) => {
                    log::info!("session: all client handles dropped");
                    Outcome::Closed
                }
                Event::Tick => self.check_keep_alive(),
            };

            if outcome != Outcome::Continue {
                // Push out whatever is queued, a DISCONNECT in particular.
                let _ = self.flush_send_queue().await;
                if let Some(stream) = self.stream.as_mut() {
                    stream.shutdown().await;
                }
                return outcome;
            }
        }
    }

    /// Parse and route every complete packet in the read buffer.
    fn process_read_buf(&mut self) -> Outcome {
        loop {
            match Frame::parse(&self.read_buf) {
                Ok(Some((frame, consumed))) => {
                    self.read_buf.drain(..consumed);
                    let outcome = self.dispatch_frame(frame);
                    if outcome != Outcome::Continue {
                        return outcome;
                    }
                }
                Ok(None) => return Outcome::Continue,
                Err(err) => {
                    log::error!("session: malformed packet from broker: {err:?}");
                    return self.protocol_violation(
                        ReasonCode::MalformedPacket,
                        "Malformed packet received",
                    );
                }
            }
        }
    }

    /// Send DISCONNECT with `reason_code` and drop the connection.
    pub(super) fn protocol_violation(&mut self, reason_code: ReasonCode, message: &str) -> Outcome {
        log::error!("session: protocol violation: {message}");
        self.status = Status::Disconnecting;
        let packet = DisconnectPacket::with_reason(reason_code);
        if self.enqueue_urgent(&packet).is_err() {
            log::error!("session: failed to encode DISCONNECT packet");
        }
        Outcome::Reconnect
    }

    fn check_keep_alive(&mut self) -> Outcome {
        if self.keep_alive == 0 {
            return Outcome::Continue;
        }
        let period = Duration::from_secs(u64::from(self.keep_alive));

        if let Some(ping_sent) = self.ping_sent {
            // No PINGRESP within the keep alive window: the connection
            // is considered dead.
            if ping_sent.elapsed() >= period {
                log::warn!("session: PINGRESP missing, dropping connection");
                return Outcome::Reconnect;
            }
        } else if self.last_write.elapsed() >= period {
            let packet = PingRequestPacket::new();
            if self.enqueue_urgent(&packet).is_err() {
                return Outcome::Reconnect;
            }
            self.ping_sent = Some(Instant::now());
        }
        Outcome::Continue
    }

    /// Handle a command while connected.
    fn handle_command(&mut self, cmd: ClientToSessionCmd) -> Outcome {
        match cmd {
            ClientToSessionCmd::Publish {
                topic,
                qos,
                payload,
                retain,
                properties,
                reply,
            } => {
                self.send_publish(PublishRequest {
                    topic,
                    qos,
                    payload,
                    retain,
                    properties,
                    reply,
                });
                Outcome::Continue
            }
            ClientToSessionCmd::Subscribe {
                topics,
                properties,
                reply,
            } => {
                self.send_subscribe(SubscribeRequest {
                    topics,
                    properties,
                    reply,
                });
                Outcome::Continue
            }
            ClientToSessionCmd::Unsubscribe {
                topics,
                properties,
                reply,
            } => {
                self.send_unsubscribe(UnsubscribeRequest {
                    topics,
                    properties,
                    reply,
                });
                Outcome::Continue
            }
            ClientToSessionCmd::ReAuthenticate { reply } => {
                self.start_reauth(reply);
                Outcome::Continue
            }
            ClientToSessionCmd::Disconnect {
                reason,
                properties,
                reply,
            } => {
                self.status = Status::Disconnecting;
                let mut packet = DisconnectPacket::with_reason(reason);
                for property in properties.props() {
                    packet.properties_mut().push(property.clone());
                }
                if let Err(err) = self.enqueue_urgent(&packet) {
                    let _ = reply.send(Err(err));
                } else {
                    let _ = reply.send(Ok(()));
                }
                Outcome::Closed
            }
            ClientToSessionCmd::Cancel => Outcome::Closed,
        }
    }

    /// Handle a command while between connections: queue what can wait,
    /// fail what cannot.
    pub(super) fn handle_command_offline(&mut self, cmd: ClientToSessionCmd) -> Outcome {
        match cmd {
            ClientToSessionCmd::Publish {
                topic,
                qos,
                payload,
                retain,
                properties,
                reply,
            } => {
                self.publish_backlog.push_back(PublishRequest {
                    topic,
                    qos,
                    payload,
                    retain,
                    properties,
                    reply,
                });
                Outcome::Continue
            }
            ClientToSessionCmd::Subscribe {
                topics,
                properties,
                reply,
            } => {
                self.subscribe_backlog.push_back(SubscribeRequest {
                    topics,
                    properties,
                    reply,
                });
                Outcome::Continue
            }
            ClientToSessionCmd::Unsubscribe {
                topics,
                properties,
                reply,
            } => {
                self.unsubscribe_backlog.push_back(UnsubscribeRequest {
                    topics,
                    properties,
                    reply,
                });
                Outcome::Continue
            }
            ClientToSessionCmd::ReAuthenticate { reply } => {
                let _ = reply.send(Err(Error::new(
                    ErrorKind::SocketError,
                    "Cannot re-authenticate while disconnected",
                )));
                Outcome::Continue
            }
            ClientToSessionCmd::Disconnect { reply, .. } => {
                // Nothing to say goodbye to; close right away.
                let _ = reply.send(Ok(()));
                Outcome::Closed
            }
            ClientToSessionCmd::Cancel => Outcome::Closed,
        }
    }

    /// Validate and transmit a publish, or park it when the broker's
    /// Receive Maximum window is full.
    pub(super) fn send_publish(&mut self, request: PublishRequest) {
        if request.qos == QoS::AtMostOnce {
            let packet = match Self::build_publish_packet(&request, PacketId::new(0)) {
                Ok(packet) => packet,
                Err(err) => {
                    let _ = request.reply.send(Err(err));
                    return;
                }
            };
            if let Err(err) = validator::check_publish(&packet, &self.caps) {
                let _ = request.reply.send(Err(err));
                return;
            }
            if let Err(err) = self.enqueue(&packet) {
                let _ = request.reply.send(Err(err));
                return;
            }
            // No acknowledgement will come; done once handed to the writer.
            let _ = request
                .reply
                .send(Ok((ReasonCode::Success, Properties::new())));
            return;
        }

        if self.outstanding_publishes() >= usize::from(self.caps.receive_maximum) {
            self.publish_backlog.push_back(request);
            return;
        }

        let Some(packet_id) = self.registry.allocate() else {
            let _ = request.reply.send(Err(Error::new(
                ErrorKind::PidOverrun,
                "All packet identifiers are in flight",
            )));
            return;
        };

        let packet = match Self::build_publish_packet(&request, packet_id) {
            Ok(packet) => packet,
            Err(err) => {
                self.registry.release(packet_id);
                let _ = request.reply.send(Err(err));
                return;
            }
        };
        if let Err(err) = validator::check_publish(&packet, &self.caps) {
            self.registry.release(packet_id);
            let _ = request.reply.send(Err(err));
            return;
        }
        if let Err(err) = self.enqueue(&packet) {
            self.registry.release(packet_id);
            let _ = request.reply.send(Err(err));
            return;
        }

        let phase = if request.qos == QoS::AtLeastOnce {
            PublishPhase::AwaitingAck
        } else {
            PublishPhase::AwaitingReceived
        };
        self.publishing_packets.insert(
            packet_id,
            PublishInflight {
                topic: request.topic,
                payload: request.payload,
                retain: request.retain,
                properties: request.properties,
                qos: request.qos,
                dup: false,
                phase,
                reply: request.reply,
            },
        );
    }

    fn build_publish_packet(
        request: &PublishRequest,
        packet_id: PacketId,
    ) -> Result<PublishPacket, Error> {
        let mut packet = PublishPacket::new(&request.topic, request.qos, &request.payload)?;
        packet.set_packet_id(packet_id).set_retain(request.retain);
        for property in request.properties.props() {
            packet.properties_mut().push(property.clone());
        }
        Ok(packet)
    }

    /// Validate and transmit a subscribe.
    pub(super) fn send_subscribe(&mut self, request: SubscribeRequest) {
        if request.topics.is_empty() {
            let _ = request.reply.send(Err(Error::new(
                ErrorKind::InvalidTopic,
                "Empty topic filter list",
            )));
            return;
        }

        let Some(packet_id) = self.registry.allocate() else {
            let _ = request.reply.send(Err(Error::new(
                ErrorKind::PidOverrun,
                "All packet identifiers are in flight",
            )));
            return;
        };

        let mut packet = SubscribePacket::with_topics(packet_id, request.topics);
        for property in request.properties.props() {
            packet.properties_mut().push(property.clone());
        }
        if let Err(err) = validator::check_subscribe(&packet, &self.caps) {
            self.registry.release(packet_id);
            let _ = request.reply.send(Err(err));
            return;
        }
        if let Err(err) = self.enqueue(&packet) {
            self.registry.release(packet_id);
            let _ = request.reply.send(Err(err));
            return;
        }

        self.subscribing_packets
            .insert(packet_id, PendingSubscribe { reply: request.reply });
    }

    /// Validate and transmit an unsubscribe.
    pub(super) fn send_unsubscribe(&mut self, request: UnsubscribeRequest) {
        if request.topics.is_empty() {
            let _ = request.reply.send(Err(Error::new(
                ErrorKind::InvalidTopic,
                "Empty topic filter list",
            )));
            return;
        }

        let mut topics = Vec::with_capacity(request.topics.len());
        for topic in &request.topics {
            match SubTopic::new(topic) {
                Ok(topic) => topics.push(topic),
                Err(err) => {
                    let _ = request.reply.send(Err(err.into()));
                    return;
                }
            }
        }

        let Some(packet_id) = self.registry.allocate() else {
            let _ = request.reply.send(Err(Error::new(
                ErrorKind::PidOverrun,
                "All packet identifiers are in flight",
            )));
            return;
        };

        let mut packet = UnsubscribePacket::with_topics(packet_id, topics);
        for property in request.properties.props() {
            packet.properties_mut().push(property.clone());
        }
        if let Err(err) = validator::check_unsubscribe(&packet, &self.caps) {
            self.registry.release(packet_id);
            let _ = request.reply.send(Err(err));
            return;
        }
        if let Err(err) = self.enqueue(&packet) {
            self.registry.release(packet_id);
            let _ = request.reply.send(Err(err));
            return;
        }

        self.unsubscribing_packets
            .insert(packet_id, PendingUnsubscribe { reply: request.reply });
    }

    /// Move parked publishes into the Receive Maximum window as long as
    /// slots are free.
    pub(super) fn drain_publish_backlog(&mut self) {
        while self.status == Status::Connected
            && self.outstanding_publishes() < usize::from(self.caps.receive_maximum)
        {
            let Some(request) = self.publish_backlog.pop_front() else {
                break;
            };
            self.send_publish(request);
        }
    }

    /// Kick off an AUTH re-authentication exchange [MQTT-4.12.1].
    fn start_reauth(&mut self, reply: Reply<()>) {
        if self.reauth_reply.is_some() {
            let _ = reply.send(Err(Error::new(
                ErrorKind::AuthFailed,
                "Re-authentication already in progress",
            )));
            return;
        }
        let Some(authenticator) = self.authenticator.as_mut() else {
            let _ = reply.send(Err(Error::new(
                ErrorKind::AuthFailed,
                "No authenticator configured",
            )));
            return;
        };

        let method = match StringData::from(authenticator.method()) {
            Ok(method) => method,
            Err(err) => {
                let _ = reply.send(Err(err.into()));
                return;
            }
        };
        let initial_data = match authenticator.initial_data() {
            Ok(data) => data,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };

        let mut packet = AuthPacket::with_reason(ReasonCode::ReAuthenticate);
        packet
            .properties_mut()
            .push(Property::AuthenticationMethod(method));
        if let Some(data) = initial_data {
            let data = match BinaryData::from_slice(&data) {
                Ok(data) => data,
                Err(err) => {
                    let _ = reply.send(Err(err.into()));
                    return;
                }
            };
            packet
                .properties_mut()
                .push(Property::AuthenticationData(data));
        }

        if let Err(err) = self.enqueue(&packet) {
            let _ = reply.send(Err(err));
            return;
        }
        self.reauth_reply = Some(reply);
    }
}
