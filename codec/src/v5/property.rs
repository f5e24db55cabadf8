// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::utils::validate_client_id;
use crate::{
    BinaryData, BoolData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket,
    PubTopic, QoS, StringData, StringPairData, U16Data, U32Data, VarInt,
};

/// Properties that are allowed to appear more than once in a property list.
///
/// User Property may represent multiple name-value pairs [MQTT-3.1.2-23];
/// Subscription Identifier may appear multiple times in an inbound PUBLISH
/// that matched several subscriptions.
pub const MULTIPLE_PROPERTIES: &[PropertyType] = &[
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
];

/// Check that every property in `properties` is allowed by `types` and
/// that single-value properties are not duplicated.
///
/// # Errors
///
/// Returns the offending property type.
pub fn check_property_type_list(
    properties: &[Property],
    types: &[PropertyType],
) -> Result<(), PropertyType> {
    for property in properties {
        if !types.contains(&property.property_type()) {
            return Err(property.property_type());
        }
    }

    for property_type in types {
        if MULTIPLE_PROPERTIES.contains(property_type) {
            continue;
        }
        let count = properties
            .iter()
            .filter(|p| p.property_type() == *property_type)
            .count();
        if count > 1 {
            return Err(*property_type);
        }
    }

    Ok(())
}

/// Property identifier byte, which defines the property usage and data type
/// [MQTT-2.2.2.2].
#[allow(clippy::module_name_repetitions)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl PropertyType {
    /// Get byte length used in packet.
    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// A single property, an `(identifier, value)` pair with the value type
/// fixed by the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// Byte. Used in PUBLISH, Will Properties.
    ///
    /// 0 means the payload is unspecified bytes, 1 means it is UTF-8 encoded
    /// character data. It is a Protocol Error to include the Payload Format
    /// Indicator more than once.
    PayloadFormatIndicator(BoolData),

    /// Four Byte Integer. Used in PUBLISH, Will Properties.
    ///
    /// Lifetime of the message in seconds; if absent, the message
    /// does not expire.
    MessageExpiryInterval(U32Data),

    /// UTF-8 Encoded String. Used in PUBLISH, Will Properties.
    ContentType(StringData),

    /// UTF-8 Encoded String used as the Topic Name for a response message.
    /// Used in PUBLISH, Will Properties.
    ResponseTopic(PubTopic),

    /// Binary Data used by the sender of the request message to identify
    /// which request the response message is for. Used in PUBLISH,
    /// Will Properties.
    CorrelationData(BinaryData),

    /// Variable Byte Integer. Used in PUBLISH, SUBSCRIBE.
    ///
    /// The Subscription Identifier can have a value of 1 to 268,435,455.
    /// It is a Protocol Error if it has a value of 0.
    SubscriptionIdentifier(VarInt),

    /// Four Byte Integer. Used in CONNECT, CONNACK, DISCONNECT.
    ///
    /// Session Expiry Interval in seconds. If absent, the value 0 is used:
    /// the Session ends when the Network Connection is closed. 0xFFFFFFFF
    /// means the Session does not expire.
    SessionExpiryInterval(U32Data),

    /// UTF-8 Encoded String. Used in CONNACK.
    ///
    /// The Client Identifier which was assigned by the Server because
    /// a zero length Client Identifier was found in the CONNECT packet
    /// [MQTT-3.2.2-16].
    AssignedClientIdentifier(StringData),

    /// Two Byte Integer. Used in CONNACK.
    ///
    /// If the Server sends a Server Keep Alive on the CONNACK packet,
    /// the Client MUST use this value instead of the Keep Alive value
    /// it sent on CONNECT [MQTT-3.2.2-21].
    ServerKeepAlive(U16Data),

    /// UTF-8 Encoded String. Used in CONNECT, CONNACK, AUTH.
    ///
    /// Name of the authentication method used for extended authentication.
    /// If absent, extended authentication is not performed.
    AuthenticationMethod(StringData),

    /// Binary Data. Used in CONNECT, CONNACK, AUTH.
    ///
    /// The contents are defined by the authentication method. It is
    /// a Protocol Error to include Authentication Data if there is
    /// no Authentication Method.
    AuthenticationData(BinaryData),

    /// Byte with a value of 0 or 1. Used in CONNECT.
    ///
    /// The Client uses this value to indicate whether Reason String or
    /// User Properties are sent in the case of failures.
    RequestProblemInformation(BoolData),

    /// Four Byte Integer, seconds the Server delays publishing the
    /// Will Message. Will Properties only.
    WillDelayInterval(U32Data),

    /// Byte with a value of 0 or 1. Used in CONNECT.
    RequestResponseInformation(BoolData),

    /// UTF-8 Encoded String used as the basis for creating a Response Topic.
    /// Used in CONNACK.
    ResponseInformation(StringData),

    /// UTF-8 Encoded String. Used in CONNACK, DISCONNECT with Reason Codes
    /// 0x9C (Use another server) and 0x9D (Server moved).
    ServerReference(StringData),

    /// UTF-8 Encoded String. Used in every acknowledgement packet.
    ///
    /// A human readable string designed for diagnostics which SHOULD NOT
    /// be parsed by the Client.
    ReasonString(StringData),

    /// Two Byte Integer. Used in CONNECT, CONNACK.
    ///
    /// Limits the number of QoS 1 and QoS 2 publications that the sender
    /// is willing to process concurrently. It is a Protocol Error for it
    /// to have the value 0. If absent, its value defaults to 65,535.
    ReceiveMaximum(U16Data),

    /// Two Byte Integer. Used in CONNECT, CONNACK.
    ///
    /// The highest value the sender will accept as a Topic Alias.
    /// If absent, the default value is 0.
    TopicAliasMaximum(U16Data),

    /// Two Byte Integer identifying the topic instead of the Topic Name.
    /// Used in PUBLISH. A Topic Alias of 0 is not permitted [MQTT-3.3.2-8].
    TopicAlias(U16Data),

    /// Byte with a value of 0 or 1. Used in CONNACK.
    ///
    /// If a Server does not support QoS 1 or QoS 2 PUBLISH packets it MUST
    /// send a Maximum QoS in the CONNACK packet specifying the highest QoS
    /// it supports [MQTT-3.2.2-9]. If absent, the Client uses a Maximum
    /// QoS of 2.
    MaximumQoS(QoS),

    /// Byte declaring whether the Server supports retained messages.
    /// Used in CONNACK. If absent, retained messages are supported.
    RetainAvailable(BoolData),

    /// UTF-8 String Pair. Allowed in every packet type that has properties.
    ///
    /// The User Property is allowed to appear multiple times to represent
    /// multiple name, value pairs. The same name is allowed to appear
    /// more than once.
    UserProperty(StringPairData),

    /// Four Byte Integer, the Maximum Packet Size the sender is willing
    /// to accept. Used in CONNECT, CONNACK. It is a Protocol Error for
    /// the value to be 0. If absent, no limit is imposed beyond the
    /// remaining length encoding.
    MaximumPacketSize(U32Data),

    /// Byte declaring whether the Server supports Wildcard Subscriptions.
    /// Used in CONNACK. If absent, they are supported.
    WildcardSubscriptionAvailable(BoolData),

    /// Byte declaring whether the Server supports Subscription Identifiers.
    /// Used in CONNACK. If absent, they are supported.
    SubscriptionIdentifierAvailable(BoolData),

    /// Byte declaring whether the Server supports Shared Subscriptions.
    /// Used in CONNACK. If absent, they are supported.
    SharedSubscriptionAvailable(BoolData),
}

impl Property {
    /// Get type of the property.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    /// Get byte length used in packets, identifier byte included.
    #[allow(clippy::match_same_arms)]
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = match self {
            Self::AssignedClientIdentifier(value) => value.bytes(),
            Self::AuthenticationData(value) => value.bytes(),
            Self::AuthenticationMethod(value) => value.bytes(),
            Self::ContentType(value) => value.bytes(),
            Self::CorrelationData(value) => value.bytes(),
            Self::MaximumPacketSize(..) => U32Data::bytes(),
            Self::MaximumQoS(..) => QoS::bytes(),
            Self::MessageExpiryInterval(..) => U32Data::bytes(),
            Self::PayloadFormatIndicator(..) => BoolData::bytes(),
            Self::ReasonString(value) => value.bytes(),
            Self::ReceiveMaximum(..) => U16Data::bytes(),
            Self::RequestProblemInformation(..) => BoolData::bytes(),
            Self::RequestResponseInformation(..) => BoolData::bytes(),
            Self::ResponseInformation(value) => value.bytes(),
            Self::ResponseTopic(value) => value.bytes(),
            Self::RetainAvailable(..) => BoolData::bytes(),
            Self::ServerKeepAlive(..) => U16Data::bytes(),
            Self::ServerReference(value) => value.bytes(),
            Self::SessionExpiryInterval(..) => U32Data::bytes(),
            Self::SharedSubscriptionAvailable(..) => BoolData::bytes(),
            Self::SubscriptionIdentifier(value) => value.bytes(),
            Self::SubscriptionIdentifierAvailable(..) => BoolData::bytes(),
            Self::TopicAlias(..) => U16Data::bytes(),
            Self::TopicAliasMaximum(..) => U16Data::bytes(),
            Self::UserProperty(value) => value.bytes(),
            Self::WildcardSubscriptionAvailable(..) => BoolData::bytes(),
            Self::WillDelayInterval(..) => U32Data::bytes(),
        };

        PropertyType::bytes() + value_bytes
    }
}

impl DecodePacket for Property {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type_byte = ba.read_byte()?;
        let property_type = PropertyType::try_from(property_type_byte)?;
        match property_type {
            PropertyType::PayloadFormatIndicator => {
                Ok(Self::PayloadFormatIndicator(BoolData::decode(ba)?))
            }
            PropertyType::MessageExpiryInterval => {
                Ok(Self::MessageExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::ContentType => Ok(Self::ContentType(StringData::decode(ba)?)),
            PropertyType::ResponseTopic => Ok(Self::ResponseTopic(PubTopic::decode(ba)?)),
            PropertyType::CorrelationData => Ok(Self::CorrelationData(BinaryData::decode(ba)?)),
            PropertyType::SubscriptionIdentifier => {
                let id = VarInt::decode(ba)?;
                if id.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::SubscriptionIdentifier(id))
            }
            PropertyType::SessionExpiryInterval => {
                Ok(Self::SessionExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::AssignedClientIdentifier => {
                let client_id = StringData::decode(ba)?;
                validate_client_id(client_id.as_ref())
                    .map_err(|_| DecodeError::InvalidClientId)?;
                Ok(Self::AssignedClientIdentifier(client_id))
            }
            PropertyType::ServerKeepAlive => Ok(Self::ServerKeepAlive(U16Data::decode(ba)?)),
            PropertyType::AuthenticationMethod => {
                Ok(Self::AuthenticationMethod(StringData::decode(ba)?))
            }
            PropertyType::AuthenticationData => {
                Ok(Self::AuthenticationData(BinaryData::decode(ba)?))
            }
            PropertyType::RequestProblemInformation => {
                Ok(Self::RequestProblemInformation(BoolData::decode(ba)?))
            }
            PropertyType::WillDelayInterval => Ok(Self::WillDelayInterval(U32Data::decode(ba)?)),
            PropertyType::RequestResponseInformation => {
                Ok(Self::RequestResponseInformation(BoolData::decode(ba)?))
            }
            PropertyType::ResponseInformation => {
                Ok(Self::ResponseInformation(StringData::decode(ba)?))
            }
            PropertyType::ServerReference => Ok(Self::ServerReference(StringData::decode(ba)?)),
            PropertyType::ReasonString => Ok(Self::ReasonString(StringData::decode(ba)?)),
            PropertyType::ReceiveMaximum => {
                let max = U16Data::decode(ba)?;
                // It is a Protocol Error for Receive Maximum to have the value 0.
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::ReceiveMaximum(max))
            }
            PropertyType::TopicAliasMaximum => Ok(Self::TopicAliasMaximum(U16Data::decode(ba)?)),
            PropertyType::TopicAlias => {
                let alias = U16Data::decode(ba)?;
                if alias.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::TopicAlias(alias))
            }
            PropertyType::MaximumQoS => {
                let qos = QoS::decode(ba)?;
                // Maximum QoS property may only hold 0 or 1 [MQTT-3.2.2-9].
                if qos == QoS::ExactOnce {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumQoS(qos))
            }
            PropertyType::RetainAvailable => Ok(Self::RetainAvailable(BoolData::decode(ba)?)),
            PropertyType::UserProperty => Ok(Self::UserProperty(StringPairData::decode(ba)?)),
            PropertyType::MaximumPacketSize => {
                let max = U32Data::decode(ba)?;
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumPacketSize(max))
            }
            PropertyType::WildcardSubscriptionAvailable => {
                Ok(Self::WildcardSubscriptionAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                Ok(Self::SubscriptionIdentifierAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SharedSubscriptionAvailable => {
                Ok(Self::SharedSubscriptionAvailable(BoolData::decode(ba)?))
            }
        }
    }
}

impl EncodePacket for Property {
    #[allow(clippy::match_same_arms)]
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let property_type_byte = self.property_type() as u8;
        buf.push(property_type_byte);
        let value_bytes = match self {
            Self::AssignedClientIdentifier(client_id) => client_id.encode(buf)?,
            Self::AuthenticationData(data) => data.encode(buf)?,
            Self::AuthenticationMethod(method) => method.encode(buf)?,
            Self::ContentType(content_type) => content_type.encode(buf)?,
            Self::CorrelationData(data) => data.encode(buf)?,
            Self::MaximumPacketSize(max) => max.encode(buf)?,
            Self::MaximumQoS(qos) => qos.encode(buf)?,
            Self::MessageExpiryInterval(interval) => interval.encode(buf)?,
            Self::PayloadFormatIndicator(on) => on.encode(buf)?,
            Self::ReasonString(reason) => reason.encode(buf)?,
            Self::ReceiveMaximum(max) => max.encode(buf)?,
            Self::RequestProblemInformation(on) => on.encode(buf)?,
            Self::RequestResponseInformation(on) => on.encode(buf)?,
            Self::ResponseInformation(info) => info.encode(buf)?,
            Self::ResponseTopic(topic) => topic.encode(buf)?,
            Self::RetainAvailable(available) => available.encode(buf)?,
            Self::ServerKeepAlive(keep_alive) => keep_alive.encode(buf)?,
            Self::ServerReference(reference) => reference.encode(buf)?,
            Self::SessionExpiryInterval(interval) => interval.encode(buf)?,
            Self::SharedSubscriptionAvailable(available) => available.encode(buf)?,
            Self::SubscriptionIdentifier(id) => id.encode(buf)?,
            Self::SubscriptionIdentifierAvailable(available) => available.encode(buf)?,
            Self::TopicAlias(alias) => alias.encode(buf)?,
            Self::TopicAliasMaximum(value) => value.encode(buf)?,
            Self::UserProperty(pair) => pair.encode(buf)?,
            Self::WildcardSubscriptionAvailable(available) => available.encode(buf)?,
            Self::WillDelayInterval(interval) => interval.encode(buf)?,
        };
        Ok(PropertyType::bytes() + value_bytes)
    }
}

/// A property list, preceded on the wire by its byte length encoded as
/// a Variable Byte Integer [MQTT-2.2.2.1].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl AsRef<[Property]> for Properties {
    fn as_ref(&self) -> &[Property] {
        self.0.as_ref()
    }
}

impl Properties {
    /// Create an empty property list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get byte length in packet, the length prefix included.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = self.value_bytes();
        // Property byte length never exceeds the packet length limit
        // because each property is bounded by its two-byte length prefix.
        let len = VarInt::from(value_bytes).unwrap_or_default();
        len.bytes() + value_bytes
    }

    /// Get byte length of the encoded properties, without the length prefix.
    #[must_use]
    pub fn value_bytes(&self) -> usize {
        self.0.iter().map(Property::bytes).sum()
    }

    /// Get number of properties in list.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether property list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get a reference to property list.
    #[must_use]
    pub fn props(&self) -> &[Property] {
        &self.0
    }

    /// Push a property to the back of the list.
    pub fn push(&mut self, property: Property) {
        self.0.push(property);
    }

    /// Clear property list.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    fn find(&self, property_type: PropertyType) -> Option<&Property> {
        self.0.iter().find(|p| p.property_type() == property_type)
    }

    /// Get Session Expiry Interval property value.
    #[must_use]
    pub fn session_expiry_interval(&self) -> Option<u32> {
        match self.find(PropertyType::SessionExpiryInterval) {
            Some(Property::SessionExpiryInterval(interval)) => Some(interval.value()),
            _ => None,
        }
    }

    /// Get Receive Maximum property value.
    #[must_use]
    pub fn receive_maximum(&self) -> Option<u16> {
        match self.find(PropertyType::ReceiveMaximum) {
            Some(Property::ReceiveMaximum(max)) => Some(max.value()),
            _ => None,
        }
    }

    /// Get Maximum Packet Size property value.
    #[must_use]
    pub fn maximum_packet_size(&self) -> Option<u32> {
        match self.find(PropertyType::MaximumPacketSize) {
            Some(Property::MaximumPacketSize(max)) => Some(max.value()),
            _ => None,
        }
    }

    /// Get Topic Alias Maximum property value.
    #[must_use]
    pub fn topic_alias_maximum(&self) -> Option<u16> {
        match self.find(PropertyType::TopicAliasMaximum) {
            Some(Property::TopicAliasMaximum(max)) => Some(max.value()),
            _ => None,
        }
    }

    /// Get Maximum QoS property value.
    #[must_use]
    pub fn maximum_qos(&self) -> Option<QoS> {
        match self.find(PropertyType::MaximumQoS) {
            Some(Property::MaximumQoS(qos)) => Some(*qos),
            _ => None,
        }
    }

    /// Get Retain Available property value.
    #[must_use]
    pub fn retain_available(&self) -> Option<bool> {
        match self.find(PropertyType::RetainAvailable) {
            Some(Property::RetainAvailable(on)) => Some(on.value()),
            _ => None,
        }
    }

    /// Get Wildcard Subscription Available property value.
    #[must_use]
    pub fn wildcard_subscription_available(&self) -> Option<bool> {
        match self.find(PropertyType::WildcardSubscriptionAvailable) {
            Some(Property::WildcardSubscriptionAvailable(on)) => Some(on.value()),
            _ => None,
        }
    }

    /// Get Subscription Identifier Available property value.
    #[must_use]
    pub fn subscription_identifier_available(&self) -> Option<bool> {
        match self.find(PropertyType::SubscriptionIdentifierAvailable) {
            Some(Property::SubscriptionIdentifierAvailable(on)) => Some(on.value()),
            _ => None,
        }
    }

    /// Get Shared Subscription Available property value.
    #[must_use]
    pub fn shared_subscription_available(&self) -> Option<bool> {
        match self.find(PropertyType::SharedSubscriptionAvailable) {
            Some(Property::SharedSubscriptionAvailable(on)) => Some(on.value()),
            _ => None,
        }
    }

    /// Get Server Keep Alive property value.
    #[must_use]
    pub fn server_keep_alive(&self) -> Option<u16> {
        match self.find(PropertyType::ServerKeepAlive) {
            Some(Property::ServerKeepAlive(keep_alive)) => Some(keep_alive.value()),
            _ => None,
        }
    }

    /// Get Assigned Client Identifier property value.
    #[must_use]
    pub fn assigned_client_identifier(&self) -> Option<&str> {
        match self.find(PropertyType::AssignedClientIdentifier) {
            Some(Property::AssignedClientIdentifier(client_id)) => Some(client_id.as_ref()),
            _ => None,
        }
    }

    /// Get Authentication Method property value.
    #[must_use]
    pub fn authentication_method(&self) -> Option<&str> {
        match self.find(PropertyType::AuthenticationMethod) {
            Some(Property::AuthenticationMethod(method)) => Some(method.as_ref()),
            _ => None,
        }
    }

    /// Get Authentication Data property value.
    #[must_use]
    pub fn authentication_data(&self) -> Option<&[u8]> {
        match self.find(PropertyType::AuthenticationData) {
            Some(Property::AuthenticationData(data)) => Some(data.as_ref()),
            _ => None,
        }
    }

    /// Get Reason String property value.
    #[must_use]
    pub fn reason_string(&self) -> Option<&str> {
        match self.find(PropertyType::ReasonString) {
            Some(Property::ReasonString(reason)) => Some(reason.as_ref()),
            _ => None,
        }
    }

    /// Get Subscription Identifier property value.
    #[must_use]
    pub fn subscription_identifier(&self) -> Option<usize> {
        match self.find(PropertyType::SubscriptionIdentifier) {
            Some(Property::SubscriptionIdentifier(id)) => Some(id.value()),
            _ => None,
        }
    }

    /// Get all User Property pairs, in list order.
    #[must_use]
    pub fn user_properties(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .filter_map(|p| match p {
                Property::UserProperty(pair) => Some((pair.key(), pair.value())),
                _ => None,
            })
            .collect()
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_length = VarInt::decode(ba)?;
        let end_offset = ba.offset() + property_length.value();
        if property_length.value() > ba.remaining_bytes() {
            return Err(DecodeError::InvalidPropertyLength);
        }

        let mut properties = Vec::new();
        while ba.offset() < end_offset {
            let property = Property::decode(ba)?;
            properties.push(property);
        }
        if ba.offset() != end_offset {
            // The last property read past the announced property length.
            return Err(DecodeError::InvalidPropertyLength);
        }

        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let len = VarInt::from(self.value_bytes())?;
        let mut bytes_written = len.bytes();
        len.encode(buf)?;
        for property in &self.0 {
            bytes_written += property.encode(buf)?;
        }

        Ok(bytes_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_round_trip() {
        let mut properties = Properties::new();
        properties.push(Property::ReceiveMaximum(U16Data::new(32)));
        properties.push(Property::UserProperty(
            StringPairData::from("region", "cn-north").unwrap(),
        ));
        properties.push(Property::MaximumPacketSize(U32Data::new(4096)));

        let mut buf = Vec::new();
        let written = properties.encode(&mut buf).unwrap();
        assert_eq!(written, properties.bytes());

        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded, properties);
        assert_eq!(decoded.receive_maximum(), Some(32));
        assert_eq!(decoded.maximum_packet_size(), Some(4096));
        assert_eq!(decoded.user_properties(), vec![("region", "cn-north")]);
    }

    #[test]
    fn test_check_property_type_list() {
        let mut properties = Properties::new();
        properties.push(Property::ReasonString(StringData::from("ok").unwrap()));
        properties.push(Property::UserProperty(
            StringPairData::from("a", "1").unwrap(),
        ));
        properties.push(Property::UserProperty(
            StringPairData::from("a", "2").unwrap(),
        ));
        assert!(check_property_type_list(
            properties.props(),
            &[PropertyType::ReasonString, PropertyType::UserProperty]
        )
        .is_ok());

        // ReasonString is a single-value property.
        properties.push(Property::ReasonString(StringData::from("again").unwrap()));
        assert_eq!(
            check_property_type_list(
                properties.props(),
                &[PropertyType::ReasonString, PropertyType::UserProperty]
            ),
            Err(PropertyType::ReasonString)
        );
    }

    #[test]
    fn test_disallowed_property_type() {
        let mut properties = Properties::new();
        properties.push(Property::TopicAlias(U16Data::new(3)));
        assert_eq!(
            check_property_type_list(properties.props(), &[PropertyType::UserProperty]),
            Err(PropertyType::TopicAlias)
        );
    }

    #[test]
    fn test_properties_decode_rejects_bad_length() {
        // Announces 2 bytes of properties but holds a 3-byte property.
        let buf = [0x02, 0x21, 0x00, 0x10];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Properties::decode(&mut ba),
            Err(DecodeError::InvalidPropertyLength)
        );
    }

    #[test]
    fn test_empty_properties() {
        let properties = Properties::new();
        let mut buf = Vec::new();
        properties.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x00]);
        assert_eq!(properties.bytes(), 1);
    }
}
