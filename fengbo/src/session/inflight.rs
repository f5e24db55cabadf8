// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v5::{Properties, PublishPacket, SubscribeTopic};
use codec::{PacketId, QoS};

use crate::commands::Reply;
use crate::error::Error;
use crate::types::{PublishAck, SubscribeAck, UnsubscribeAck};

/// Where a `QoS` 1/2 publish stands in its acknowledgement exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublishPhase {
    /// `QoS` 1, PUBLISH sent, PUBACK outstanding.
    AwaitingAck,

    /// `QoS` 2, PUBLISH sent, PUBREC outstanding.
    AwaitingReceived,

    /// `QoS` 2, PUBREL sent, PUBCOMP outstanding.
    AwaitingComplete,
}

/// A `QoS` 1/2 publish that has been written to some connection and not yet
/// terminally acknowledged.
///
/// The payload is owned so the packet can be rebuilt and resent on every
/// reconnect until the exchange finishes [MQTT-4.4.0-1].
#[derive(Debug)]
pub(crate) struct PublishInflight {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
    pub properties: Properties,
    pub qos: QoS,
    pub dup: bool,
    pub phase: PublishPhase,
    pub reply: Reply<PublishAck>,
}

impl PublishInflight {
    /// Rebuild the PUBLISH packet for (re)transmission.
    pub fn to_packet(&self, packet_id: PacketId) -> Result<PublishPacket, Error> {
        let mut packet = PublishPacket::new(&self.topic, self.qos, &self.payload)?;
        packet.set_packet_id(packet_id).set_retain(self.retain);
        if self.dup {
            packet.set_dup(true)?;
        }
        for property in self.properties.props() {
            packet.properties_mut().push(property.clone());
        }
        Ok(packet)
    }
}

/// A SUBSCRIBE waiting for its SUBACK. Not resent on reconnect; failed with
/// `session_expired` instead.
#[derive(Debug)]
pub(crate) struct PendingSubscribe {
    pub reply: Reply<SubscribeAck>,
}

/// An UNSUBSCRIBE waiting for its UNSUBACK. Not resent on reconnect.
#[derive(Debug)]
pub(crate) struct PendingUnsubscribe {
    pub reply: Reply<UnsubscribeAck>,
}

/// A publish accepted from the caller but not yet written: either the
/// client is between connections or the broker's Receive Maximum is
/// exhausted.
#[derive(Debug)]
pub(crate) struct PublishRequest {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
    pub retain: bool,
    pub properties: Properties,
    pub reply: Reply<PublishAck>,
}

/// A subscribe accepted while between connections.
#[derive(Debug)]
pub(crate) struct SubscribeRequest {
    pub topics: Vec<SubscribeTopic>,
    pub properties: Properties,
    pub reply: Reply<SubscribeAck>,
}

/// An unsubscribe accepted while between connections.
#[derive(Debug)]
pub(crate) struct UnsubscribeRequest {
    pub topics: Vec<String>,
    pub properties: Properties,
    pub reply: Reply<UnsubscribeAck>,
}
