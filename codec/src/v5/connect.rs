// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use super::property::check_property_type_list;
use super::{FixedHeader, Packet, PacketType, Properties, PropertyType};
use crate::utils::validate_client_id;
use crate::{
    BinaryData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, PubTopic, QoS,
    StringData, U16Data, VarIntError,
};

/// Protocol name of MQTT 5.0, `MQTT` as an UTF-8 string.
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol level of MQTT 5.0.
pub const PROTOCOL_LEVEL: u8 = 5;

/// Properties available in connect packets.
pub const CONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReceiveMaximum,
    PropertyType::MaximumPacketSize,
    PropertyType::TopicAliasMaximum,
    PropertyType::RequestResponseInformation,
    PropertyType::RequestProblemInformation,
    PropertyType::UserProperty,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
];

/// Properties available in the will message of connect packets.
pub const WILL_PROPERTIES: &[PropertyType] = &[
    PropertyType::WillDelayInterval,
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::ContentType,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
];

/// Will message carried in the payload of a connect packet.
///
/// The Will Message is published by the Server when the Network Connection
/// is closed without a normal DISCONNECT [MQTT-3.1.2-8].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Will {
    properties: Properties,
    topic: PubTopic,
    payload: BinaryData,
    qos: QoS,
    retain: bool,
}

impl Will {
    /// Create a new will message with `topic` and `payload`.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid topic name or `payload`
    /// is too long.
    pub fn new(topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<Self, EncodeError> {
        let topic = PubTopic::new(topic)?;
        let payload = BinaryData::from_slice(payload)?;
        Ok(Self {
            properties: Properties::new(),
            topic,
            payload,
            qos,
            retain,
        })
    }

    /// Get current will topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    /// Get current will payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.payload.as_ref()
    }

    /// Get current will `QoS`.
    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    /// Get current will retain flag.
    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    /// Get a reference to will property list.
    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Get a mutable reference to will property list.
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn bytes(&self) -> usize {
        self.properties.bytes() + self.topic.bytes() + self.payload.bytes()
    }
}

/// The first packet sent from the Client to the Server after a Network
/// Connection is established MUST be a CONNECT packet [MQTT-3.1.0-1].
///
/// Basic structure of packet:
///
/// ```txt
///  7                          0
/// +----------------------------+
/// | Fixed header               |
/// |                            |
/// +----------------------------+
/// | Protocol name length       |
/// |                            |
/// +----------------------------+
/// | Protocol name "MQTT"       |
/// +----------------------------+
/// | Protocol level             |
/// +----------------------------+
/// | Connect flags              |
/// +----------------------------+
/// | Keep alive                 |
/// |                            |
/// +----------------------------+
/// | Properties ...             |
/// +----------------------------+
/// | Client id                  |
/// +----------------------------+
/// | Will properties/topic/     |
/// | payload, username,         |
/// | password (optional)        |
/// +----------------------------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    /// If Clean Start is set to 1, the Client and Server MUST discard any
    /// existing Session and start a new Session [MQTT-3.1.2-4].
    clean_start: bool,

    /// Maximum time interval in seconds that is permitted to elapse between
    /// the point at which the Client finishes transmitting one control packet
    /// and the point it starts sending the next [MQTT-3.1.2-10].
    ///
    /// A value of zero has the effect of turning off the keep alive mechanism.
    keep_alive: U16Data,

    properties: Properties,

    /// The Client Identifier MUST be present and MUST be the first field in
    /// the CONNECT packet Payload [MQTT-3.1.3-3]. A zero length value asks
    /// the Server to assign one.
    client_id: StringData,

    will: Option<Will>,

    username: Option<StringData>,

    password: Option<BinaryData>,
}

impl ConnectPacket {
    /// Create a new connect packet with `client_id`.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn new(client_id: &str) -> Result<Self, EncodeError> {
        validate_client_id(client_id).map_err(|_| EncodeError::InvalidString)?;
        let client_id = StringData::from(client_id)?;
        Ok(Self {
            clean_start: true,
            client_id,
            ..Self::default()
        })
    }

    /// Update clean start flag.
    pub fn set_clean_start(&mut self, clean_start: bool) -> &mut Self {
        self.clean_start = clean_start;
        self
    }

    /// Get current clean start flag.
    #[must_use]
    pub const fn clean_start(&self) -> bool {
        self.clean_start
    }

    /// Update keep alive value, in seconds.
    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = U16Data::new(keep_alive);
        self
    }

    /// Get current keep alive value.
    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive.value()
    }

    /// Get current client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_ref()
    }

    /// Update will message.
    pub fn set_will(&mut self, will: Option<Will>) -> &mut Self {
        self.will = will;
        self
    }

    /// Get current will message.
    #[must_use]
    pub const fn will(&self) -> Option<&Will> {
        self.will.as_ref()
    }

    /// Update username.
    ///
    /// # Errors
    ///
    /// Returns error if `username` is not a valid MQTT string.
    pub fn set_username(&mut self, username: Option<&str>) -> Result<&mut Self, EncodeError> {
        self.username = match username {
            Some(name) => Some(StringData::from(name)?),
            None => None,
        };
        Ok(self)
    }

    /// Get current username.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_ref().map(AsRef::as_ref)
    }

    /// Update password.
    ///
    /// # Errors
    ///
    /// Returns error if `password` is too long.
    pub fn set_password(&mut self, password: Option<&[u8]>) -> Result<&mut Self, EncodeError> {
        self.password = match password {
            Some(data) => Some(BinaryData::from_slice(data)?),
            None => None,
        };
        Ok(self)
    }

    /// Get current password.
    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_ref().map(AsRef::as_ref)
    }

    /// Get a reference to property list.
    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Get a mutable reference to property list.
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0b0000_0000;
        if self.clean_start {
            flags |= 0b0000_0010;
        }
        if let Some(will) = &self.will {
            flags |= 0b0000_0100;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= 0b0010_0000;
            }
        }
        if self.password.is_some() {
            flags |= 0b0100_0000;
        }
        if self.username.is_some() {
            flags |= 0b1000_0000;
        }
        flags
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        // Protocol name, protocol level, connect flags and keep alive.
        let mut remaining_length =
            2 + PROTOCOL_NAME.len() + 1 + 1 + U16Data::bytes() + self.properties.bytes();
        remaining_length += self.client_id.bytes();
        if let Some(will) = &self.will {
            remaining_length += will.bytes();
        }
        if let Some(username) = &self.username {
            remaining_length += username.bytes();
        }
        if let Some(password) = &self.password {
            remaining_length += password.bytes();
        }

        FixedHeader::new(PacketType::Connect, remaining_length)
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;

        let protocol_name = StringData::from(PROTOCOL_NAME)?;
        protocol_name.encode(buf)?;
        buf.push(PROTOCOL_LEVEL);
        buf.push(self.connect_flags());
        self.keep_alive.encode(buf)?;
        self.properties.encode(buf)?;

        self.client_id.encode(buf)?;
        if let Some(will) = &self.will {
            will.properties.encode(buf)?;
            will.topic.encode(buf)?;
            will.payload.encode(buf)?;
        }
        if let Some(username) = &self.username {
            username.encode(buf)?;
        }
        if let Some(password) = &self.password {
            password.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = StringData::decode(ba)?;
        if protocol_name.as_ref() != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocol);
        }
        let protocol_level = ba.read_byte()?;
        if protocol_level != PROTOCOL_LEVEL {
            return Err(DecodeError::InvalidProtocol);
        }

        let flags = ba.read_byte()?;
        // The Server MUST validate that the reserved flag is set to zero
        // [MQTT-3.1.2-3].
        if flags & 0b0000_0001 != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let clean_start = flags & 0b0000_0010 != 0;
        let has_will = flags & 0b0000_0100 != 0;
        let will_qos = QoS::try_from((flags & 0b0001_1000) >> 3)?;
        let will_retain = flags & 0b0010_0000 != 0;
        // If the Will Flag is set to 0, then Will QoS and Will Retain MUST be
        // set to 0 [MQTT-3.1.2-11, MQTT-3.1.2-13].
        if !has_will && (will_qos != QoS::AtMostOnce || will_retain) {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let has_password = flags & 0b0100_0000 != 0;
        let has_username = flags & 0b1000_0000 != 0;

        let keep_alive = U16Data::decode(ba)?;
        let properties = Properties::decode(ba)?;
        if let Err(property_type) = check_property_type_list(properties.props(), CONNECT_PROPERTIES)
        {
            log::error!("v5/ConnectPacket: property type {property_type:?} cannot be used in properties!");
            return Err(DecodeError::InvalidPropertyType);
        }

        let client_id = StringData::decode(ba)?;
        validate_client_id(client_id.as_ref()).map_err(|_| DecodeError::InvalidClientId)?;

        let will = if has_will {
            let will_properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(will_properties.props(), WILL_PROPERTIES)
            {
                log::error!("v5/ConnectPacket: property type {property_type:?} cannot be used in will properties!");
                return Err(DecodeError::InvalidPropertyType);
            }
            let topic = PubTopic::decode(ba)?;
            let payload = BinaryData::decode(ba)?;
            Some(Will {
                properties: will_properties,
                topic,
                payload,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };

        let username = if has_username {
            Some(StringData::decode(ba)?)
        } else {
            None
        };
        let password = if has_password {
            Some(BinaryData::decode(ba)?)
        } else {
            None
        };

        Ok(Self {
            clean_start,
            keep_alive,
            properties,
            client_id,
            will,
            username,
            password,
        })
    }
}

impl Packet for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v5::Property;
    use crate::StringPairData;

    #[test]
    fn test_connect_round_trip() {
        let mut packet = ConnectPacket::new("fengbo7").unwrap();
        packet.set_keep_alive(30).set_clean_start(false);
        packet.set_username(Some("reader")).unwrap();
        packet.set_password(Some(b"secret")).unwrap();
        packet
            .properties_mut()
            .push(Property::ReceiveMaximum(16.into()));

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0x10);
        assert_eq!(packet.bytes().unwrap(), buf.len());

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(ba.offset(), buf.len());
    }

    #[test]
    fn test_connect_with_will_round_trip() {
        let mut packet = ConnectPacket::new("fengbo7").unwrap();
        let mut will = Will::new("client/gone", b"offline", QoS::AtLeastOnce, true).unwrap();
        will.properties_mut()
            .push(Property::UserProperty(
                StringPairData::from("origin", "will").unwrap(),
            ));
        packet.set_will(Some(will));

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        let will = decoded.will().unwrap();
        assert_eq!(will.topic(), "client/gone");
        assert_eq!(will.qos(), QoS::AtLeastOnce);
        assert!(will.retain());
    }

    #[test]
    fn test_connect_decode_rejects_reserved_flag() {
        let mut packet_bytes = Vec::new();
        ConnectPacket::new("x")
            .unwrap()
            .encode(&mut packet_bytes)
            .unwrap();
        // Connect flags live right after the 2-byte fixed header,
        // protocol name and level.
        let flags_index = 2 + 6 + 1;
        packet_bytes[flags_index] |= 0b0000_0001;
        let mut ba = ByteArray::new(&packet_bytes);
        assert_eq!(
            ConnectPacket::decode(&mut ba),
            Err(DecodeError::InvalidConnectFlags)
        );
    }
}
