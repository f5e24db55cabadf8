// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v5::{ConnectAckPacket, Packet, PublishPacket, SubscribePacket, UnsubscribePacket};
use codec::QoS;

use crate::error::{Error, ErrorKind};

/// Broker limits captured from the last CONNACK packet.
///
/// Absent properties fall back to the MQTT 5 defaults, which allow
/// everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCaps {
    pub maximum_packet_size: u32,
    pub receive_maximum: u16,
    pub topic_alias_maximum: u16,
    pub maximum_qos: QoS,
    pub retain_available: bool,
    pub wildcard_subscription_available: bool,
    pub subscription_identifier_available: bool,
    pub shared_subscription_available: bool,
    pub server_keep_alive: Option<u16>,
    pub assigned_client_id: Option<String>,
}

impl Default for ServerCaps {
    fn default() -> Self {
        Self {
            maximum_packet_size: u32::MAX,
            receive_maximum: u16::MAX,
            topic_alias_maximum: 0,
            maximum_qos: QoS::ExactOnce,
            retain_available: true,
            wildcard_subscription_available: true,
            subscription_identifier_available: true,
            shared_subscription_available: true,
            server_keep_alive: None,
            assigned_client_id: None,
        }
    }
}

impl ServerCaps {
    /// Capture negotiated limits from a CONNACK packet.
    #[must_use]
    pub fn from_connect_ack(packet: &ConnectAckPacket) -> Self {
        let properties = packet.properties();
        let defaults = Self::default();
        Self {
            maximum_packet_size: properties
                .maximum_packet_size()
                .unwrap_or(defaults.maximum_packet_size),
            receive_maximum: properties
                .receive_maximum()
                .unwrap_or(defaults.receive_maximum),
            topic_alias_maximum: properties
                .topic_alias_maximum()
                .unwrap_or(defaults.topic_alias_maximum),
            maximum_qos: properties.maximum_qos().unwrap_or(defaults.maximum_qos),
            retain_available: properties
                .retain_available()
                .unwrap_or(defaults.retain_available),
            wildcard_subscription_available: properties
                .wildcard_subscription_available()
                .unwrap_or(defaults.wildcard_subscription_available),
            subscription_identifier_available: properties
                .subscription_identifier_available()
                .unwrap_or(defaults.subscription_identifier_available),
            shared_subscription_available: properties
                .shared_subscription_available()
                .unwrap_or(defaults.shared_subscription_available),
            server_keep_alive: properties.server_keep_alive(),
            assigned_client_id: properties
                .assigned_client_identifier()
                .map(str::to_owned),
        }
    }
}

fn check_packet_size(packet: &dyn Packet, caps: &ServerCaps) -> Result<(), Error> {
    let bytes = packet
        .bytes()
        .map_err(|_| Error::new(ErrorKind::PacketTooLarge, "Remaining length out of range"))?;
    if bytes > caps.maximum_packet_size as usize {
        return Err(Error::from_string(
            ErrorKind::PacketTooLarge,
            format!(
                "Serialized packet is {bytes} bytes, broker maximum packet size is {}",
                caps.maximum_packet_size
            ),
        ));
    }
    Ok(())
}

/// Check an outgoing publish packet against broker limits.
///
/// Topic-name syntax is enforced earlier, when the packet is constructed.
///
/// # Errors
///
/// Returns error naming the violated limit.
pub fn check_publish(packet: &PublishPacket, caps: &ServerCaps) -> Result<(), Error> {
    if packet.qos() > caps.maximum_qos {
        return Err(Error::from_string(
            ErrorKind::QoSNotSupported,
            format!(
                "QoS {:?} exceeds broker maximum {:?}",
                packet.qos(),
                caps.maximum_qos
            ),
        ));
    }
    if packet.retain() && !caps.retain_available {
        return Err(Error::new(
            ErrorKind::RetainNotAvailable,
            "Broker does not support retained messages",
        ));
    }
    check_packet_size(packet, caps)
}

/// Check an outgoing subscribe packet against broker limits.
///
/// # Errors
///
/// Returns error naming the violated limit.
pub fn check_subscribe(packet: &SubscribePacket, caps: &ServerCaps) -> Result<(), Error> {
    for topic in packet.topics() {
        if topic.topic().has_wildcard() && !caps.wildcard_subscription_available {
            return Err(Error::from_string(
                ErrorKind::WildcardSubscriptionNotAvailable,
                format!(
                    "Broker does not support wildcard subscriptions: {}",
                    topic.topic()
                ),
            ));
        }
        if topic.topic().is_shared() && !caps.shared_subscription_available {
            return Err(Error::from_string(
                ErrorKind::SharedSubscriptionNotAvailable,
                format!(
                    "Broker does not support shared subscriptions: {}",
                    topic.topic()
                ),
            ));
        }
    }

    if let Some(id) = packet.properties().subscription_identifier() {
        if !caps.subscription_identifier_available {
            return Err(Error::new(
                ErrorKind::SubscriptionIdentifierNotAvailable,
                "Broker does not support subscription identifiers",
            ));
        }
        // Values above 268,435,455 are unrepresentable: `VarInt` enforces
        // the Variable Byte Integer range at construction, so only zero
        // can slip through to here.
        if id == 0 {
            return Err(Error::new(
                ErrorKind::MalformedPacket,
                "Subscription identifier must be non-zero",
            ));
        }
    }

    check_packet_size(packet, caps)
}

/// Check an outgoing unsubscribe packet against broker limits.
///
/// # Errors
///
/// Returns error naming the violated limit.
pub fn check_unsubscribe(packet: &UnsubscribePacket, caps: &ServerCaps) -> Result<(), Error> {
    check_packet_size(packet, caps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::v5::{ConnectAckPacket, Property, ReasonCode, SubscribeTopic};
    use codec::{BoolData, PacketId, U32Data, VarInt};

    fn caps_with(properties: Vec<Property>) -> ServerCaps {
        let mut packet = ConnectAckPacket::new(false, ReasonCode::Success);
        for property in properties {
            packet.properties_mut().push(property);
        }
        ServerCaps::from_connect_ack(&packet)
    }

    #[test]
    fn test_caps_defaults() {
        let caps = caps_with(vec![]);
        assert_eq!(caps, ServerCaps::default());
    }

    #[test]
    fn test_wildcard_not_available() {
        let caps = caps_with(vec![Property::WildcardSubscriptionAvailable(
            BoolData::new(false),
        )]);

        for filter in ["topic/#", "$share/grp/topic/#"] {
            let packet = SubscribePacket::new(filter, QoS::ExactOnce, PacketId::new(1)).unwrap();
            let err = check_subscribe(&packet, &caps).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::WildcardSubscriptionNotAvailable);
        }
    }

    #[test]
    fn test_shared_not_available() {
        let caps = caps_with(vec![Property::SharedSubscriptionAvailable(BoolData::new(
            false,
        ))]);
        let packet =
            SubscribePacket::new("$share/group/topic", QoS::ExactOnce, PacketId::new(1)).unwrap();
        let err = check_subscribe(&packet, &caps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SharedSubscriptionNotAvailable);
    }

    #[test]
    fn test_subscription_identifier_not_available() {
        let caps = caps_with(vec![Property::SubscriptionIdentifierAvailable(
            BoolData::new(false),
        )]);
        let mut packet = SubscribePacket::new("topic", QoS::ExactOnce, PacketId::new(1)).unwrap();
        packet
            .properties_mut()
            .push(Property::SubscriptionIdentifier(VarInt::from(23).unwrap()));
        let err = check_subscribe(&packet, &caps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SubscriptionIdentifierNotAvailable);
    }

    #[test]
    fn test_subscription_identifier_zero() {
        let caps = ServerCaps::default();
        let mut packet = SubscribePacket::new("topic", QoS::ExactOnce, PacketId::new(1)).unwrap();
        packet
            .properties_mut()
            .push(Property::SubscriptionIdentifier(VarInt::new()));
        let err = check_subscribe(&packet, &caps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPacket);
    }

    #[test]
    fn test_packet_too_large() {
        let caps = caps_with(vec![Property::MaximumPacketSize(U32Data::new(10))]);

        let packet =
            SubscribePacket::new("very large topic", QoS::ExactOnce, PacketId::new(1)).unwrap();
        let err = check_subscribe(&packet, &caps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PacketTooLarge);

        let packet = PublishPacket::new("very/long/topic/name", QoS::AtMostOnce, b"pay").unwrap();
        let err = check_publish(&packet, &caps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PacketTooLarge);
    }

    #[test]
    fn test_qos_not_supported() {
        let caps = caps_with(vec![Property::MaximumQoS(QoS::AtMostOnce)]);
        let mut packet = PublishPacket::new("t", QoS::AtLeastOnce, b"x").unwrap();
        packet.set_packet_id(PacketId::new(3));
        let err = check_publish(&packet, &caps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QoSNotSupported);
    }

    #[test]
    fn test_retain_not_available() {
        let caps = caps_with(vec![Property::RetainAvailable(BoolData::new(false))]);
        let mut packet = PublishPacket::new("t", QoS::AtMostOnce, b"x").unwrap();
        packet.set_retain(true);
        let err = check_publish(&packet, &caps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetainNotAvailable);
    }

    #[test]
    fn test_valid_subscribe_passes() {
        let caps = ServerCaps::default();
        let mut topic = SubscribeTopic::new("sensors/+/state", QoS::AtLeastOnce).unwrap();
        topic.set_no_local(true);
        let packet = SubscribePacket::with_topics(PacketId::new(2), vec![topic]);
        assert!(check_subscribe(&packet, &caps).is_ok());
    }
}
