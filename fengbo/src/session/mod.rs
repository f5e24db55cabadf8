// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use codec::v5::Packet;
use codec::{EncodePacket, PacketId};
use tokio::sync::{mpsc, Mutex};

use crate::auth::Authenticator;
use crate::client::AsyncClient;
use crate::commands::ClientToSessionCmd;
use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::packet_id::PacketIdRegistry;
use crate::stream::Stream;
use crate::types::Message;
use crate::validator::ServerCaps;

mod dispatch;
mod handshake;
mod inflight;
mod run;

use inflight::{
    PendingSubscribe, PendingUnsubscribe, PublishInflight, PublishRequest, SubscribeRequest,
    UnsubscribeRequest,
};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Created, `run_loop()` not entered yet.
    Idle,

    /// Establishing byte-stream connectivity to the current broker.
    Connecting,

    /// Stream is up, CONNECT sent, waiting for CONNACK; AUTH exchange
    /// happens here.
    Handshaking,

    /// CONNACK accepted, operations flow.
    Connected,

    /// Tearing the connection down after a DISCONNECT in either direction
    /// or a protocol violation.
    Disconnecting,

    /// Between connections, backing off before the next broker is tried.
    ReconnectWait,

    /// Terminal. Every pending operation has failed.
    Closed,
}

/// The session task owning the connection, the codec buffers, all in-flight
/// operation records and the packet id registry.
///
/// Everything in here is touched from a single task; client handles talk to
/// it only through the command channel. Create one with [`Session::new`] and
/// drive it with [`Session::run_loop`], usually under `tokio::spawn`.
pub struct Session {
    options: ConnectOptions,
    status: Status,
    stream: Option<Stream>,
    read_buf: Vec<u8>,
    send_queue: VecDeque<Vec<u8>>,

    /// Limits captured from the last CONNACK.
    caps: ServerCaps,
    session_present: bool,
    /// Incremented on each successful CONNACK.
    epoch: u64,
    /// Client id actually used; replaced by the broker-assigned one when
    /// the configured id is empty.
    client_id: String,
    broker_index: usize,

    registry: PacketIdRegistry,
    publishing_packets: BTreeMap<PacketId, PublishInflight>,
    subscribing_packets: HashMap<PacketId, PendingSubscribe>,
    unsubscribing_packets: HashMap<PacketId, PendingUnsubscribe>,
    /// Packet ids of inbound `QoS` 2 publishes between PUBREC and PUBREL,
    /// kept to suppress duplicate deliveries [MQTT-4.3.3].
    incoming_qos2: HashSet<PacketId>,
    /// Packet ids of cancelled operations whose wire exchange is still
    /// open. Kept allocated until the broker's acknowledgement closes the
    /// exchange, so a late ack neither completes an unrelated operation
    /// nor reads as an unknown-id protocol violation. Emptied on every
    /// connection loss.
    orphaned_ids: HashSet<PacketId>,

    publish_backlog: VecDeque<PublishRequest>,
    subscribe_backlog: VecDeque<SubscribeRequest>,
    unsubscribe_backlog: VecDeque<UnsubscribeRequest>,

    authenticator: Option<Box<dyn Authenticator>>,
    reauth_reply: Option<crate::commands::Reply<()>>,

    msg_sender: mpsc::UnboundedSender<Message>,
    receiver: mpsc::UnboundedReceiver<ClientToSessionCmd>,

    /// Effective keep alive in seconds, the server value when the CONNACK
    /// carried one [MQTT-3.2.2-21].
    keep_alive: u16,
    last_write: Instant,
    ping_sent: Option<Instant>,
}

impl Session {
    /// Create a new session and the client handle talking to it.
    #[must_use]
    pub fn new(mut options: ConnectOptions) -> (Self, AsyncClient) {
        let (cmd_sender, cmd_receiver) = mpsc::unbounded_channel();
        let (msg_sender, msg_receiver) = mpsc::unbounded_channel();
        let operation_timeout = options.operation_timeout();
        let client = AsyncClient::new(cmd_sender, Arc::new(Mutex::new(msg_receiver)), operation_timeout);

        let keep_alive = options.keep_alive();
        let client_id = options.client_id().to_owned();
        let authenticator = options.take_authenticator();
        let session = Self {
            options,
            status: Status::Idle,
            stream: None,
            read_buf: Vec::with_capacity(4096),
            send_queue: VecDeque::new(),

            caps: ServerCaps::default(),
            session_present: false,
            epoch: 0,
            client_id,
            broker_index: 0,

            registry: PacketIdRegistry::new(),
            publishing_packets: BTreeMap::new(),
            subscribing_packets: HashMap::new(),
            unsubscribing_packets: HashMap::new(),
            incoming_qos2: HashSet::new(),
            orphaned_ids: HashSet::new(),

            publish_backlog: VecDeque::new(),
            subscribe_backlog: VecDeque::new(),
            unsubscribe_backlog: VecDeque::new(),

            authenticator,
            reauth_reply: None,

            msg_sender,
            receiver: cmd_receiver,

            keep_alive,
            last_write: Instant::now(),
            ping_sent: None,
        };
        (session, client)
    }

    /// Get current connection status.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Get limits captured from the last CONNACK.
    #[must_use]
    pub const fn caps(&self) -> &ServerCaps {
        &self.caps
    }

    /// Serialize `packet` onto the back of the send queue.
    fn enqueue<P: EncodePacket + Packet>(&mut self, packet: &P) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.send_queue.push_back(buf);
        Ok(())
    }

    /// Serialize `packet` onto the front of the send queue.
    ///
    /// Only PINGREQ and DISCONNECT jump the queue; everything else is
    /// strictly first in, first out.
    fn enqueue_urgent<P: EncodePacket + Packet>(&mut self, packet: &P) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.send_queue.push_front(buf);
        Ok(())
    }

    /// Write queued frames to the stream, one write at a time.
    ///
    /// A frame is removed from the queue only after its write succeeded, so
    /// a failed write leaves the queue intact for the reconnect logic
    /// to rebuild.
    async fn flush_send_queue(&mut self) -> Result<(), Error> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        while let Some(frame) = self.send_queue.front() {
            stream.write_all(frame).await?;
            self.send_queue.pop_front();
            self.last_write = Instant::now();
        }
        Ok(())
    }

    /// Number of `QoS` > 0 publishes counted against the broker's
    /// Receive Maximum.
    fn outstanding_publishes(&self) -> usize {
        self.publishing_packets.len()
    }

    /// Free records whose caller stopped waiting.
    ///
    /// A dropped or timed-out operation future closes its reply channel;
    /// the record is removed here. On a live connection the packet id is
    /// quarantined in `orphaned_ids` until the broker's acknowledgement
    /// closes the exchange; between connections no ack can arrive and the
    /// id is released right away.
    fn sweep_cancelled(&mut self) {
        let connected = self.status == Status::Connected;

        let cancelled: Vec<PacketId> = self
            .publishing_packets
            .iter()
            .filter(|(_, record)| record.reply.is_closed())
            .map(|(packet_id, _)| *packet_id)
            .collect();
        for packet_id in cancelled {
            self.publishing_packets.remove(&packet_id);
            if connected {
                self.orphaned_ids.insert(packet_id);
            } else {
                self.registry.release(packet_id);
            }
        }

        let cancelled: Vec<PacketId> = self
            .subscribing_packets
            .iter()
            .filter(|(_, pending)| pending.reply.is_closed())
            .map(|(packet_id, _)| *packet_id)
            .collect();
        for packet_id in cancelled {
            self.subscribing_packets.remove(&packet_id);
            if connected {
                self.orphaned_ids.insert(packet_id);
            } else {
                self.registry.release(packet_id);
            }
        }

        let cancelled: Vec<PacketId> = self
            .unsubscribing_packets
            .iter()
            .filter(|(_, pending)| pending.reply.is_closed())
            .map(|(packet_id, _)| *packet_id)
            .collect();
        for packet_id in cancelled {
            self.unsubscribing_packets.remove(&packet_id);
            if connected {
                self.orphaned_ids.insert(packet_id);
            } else {
                self.registry.release(packet_id);
            }
        }

        self.publish_backlog
            .retain(|request| !request.reply.is_closed());
        self.subscribe_backlog
            .retain(|request| !request.reply.is_closed());
        self.unsubscribe_backlog
            .retain(|request| !request.reply.is_closed());

        if self
            .reauth_reply
            .as_ref()
            .map_or(false, |reply| reply.is_closed())
        {
            self.reauth_reply = None;
        }
    }

    /// Fail operations tied to the connection that just died.
    ///
    /// Unacknowledged SUBSCRIBE/UNSUBSCRIBE are not resent, so their
    /// callers get `session_expired`; in-flight publishes stay for resend.
    fn on_connection_lost(&mut self) {
        self.send_queue.clear();
        self.read_buf.clear();
        self.ping_sent = None;
        self.stream = None;

        // Acknowledgements for cancelled exchanges died with the
        // connection; their quarantined ids go back to the pool.
        for packet_id in std::mem::take(&mut self.orphaned_ids) {
            self.registry.release(packet_id);
        }

        for (packet_id, pending) in std::mem::take(&mut self.subscribing_packets) {
            self.registry.release(packet_id);
            let _ = pending.reply.send(Err(Error::new(
                ErrorKind::SessionExpired,
                "Connection lost before SUBACK",
            )));
        }
        for (packet_id, pending) in std::mem::take(&mut self.unsubscribing_packets) {
            self.registry.release(packet_id);
            let _ = pending.reply.send(Err(Error::new(
                ErrorKind::SessionExpired,
                "Connection lost before UNSUBACK",
            )));
        }
        if let Some(reply) = self.reauth_reply.take() {
            let _ = reply.send(Err(Error::new(
                ErrorKind::SessionExpired,
                "Connection lost during re-authentication",
            )));
        }
    }

    /// Fail every pending operation with `kind` and release all resources.
    fn fail_all_pending(&mut self, kind: ErrorKind, message: &str) {
        self.on_connection_lost();

        for (packet_id, record) in std::mem::take(&mut self.publishing_packets) {
            self.registry.release(packet_id);
            let _ = record.reply.send(Err(Error::new(kind, message)));
        }
        for request in std::mem::take(&mut self.publish_backlog) {
            let _ = request.reply.send(Err(Error::new(kind, message)));
        }
        for request in std::mem::take(&mut self.subscribe_backlog) {
            let _ = request.reply.send(Err(Error::new(kind, message)));
        }
        for request in std::mem::take(&mut self.unsubscribe_backlog) {
            let _ = request.reply.send(Err(Error::new(kind, message)));
        }
        self.incoming_qos2.clear();
        self.registry.clear();
    }
}
