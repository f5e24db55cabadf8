// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use super::{
    AuthPacket, ConnectAckPacket, ConnectPacket, DisconnectPacket, FixedHeader, PacketType,
    PingRequestPacket, PingResponsePacket, PublishAckPacket, PublishCompletePacket, PublishPacket,
    PublishReceivedPacket, PublishReleasePacket, SubscribeAckPacket, SubscribePacket,
    UnsubscribeAckPacket, UnsubscribePacket,
};
use crate::{ByteArray, DecodeError, DecodePacket};

/// A complete control packet of any of the 15 kinds.
///
/// Used on the receive path to hand a parsed packet to whoever routes it;
/// every variant wraps the concrete packet struct.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl Frame {
    /// Try to parse one complete packet from the front of `buf`.
    ///
    /// Returns `Ok(Some((frame, bytes_consumed)))` on success and `Ok(None)`
    /// when `buf` does not yet hold a complete packet, so a reader can await
    /// more bytes. Anything else is a Malformed Packet.
    ///
    /// # Errors
    ///
    /// Returns error if the leading bytes of `buf` are not a well-formed
    /// control packet.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, DecodeError> {
        let mut ba = ByteArray::new(buf);
        let fixed_header = match FixedHeader::decode(&mut ba) {
            Ok(fixed_header) => fixed_header,
            // The fixed header itself may be cut off mid-stream.
            Err(DecodeError::OutOfRange) => return Ok(None),
            Err(err) => return Err(err),
        };

        let total_bytes = fixed_header.bytes() + fixed_header.remaining_length();
        if buf.len() < total_bytes {
            return Ok(None);
        }

        // From here on the buffer holds the whole packet, so every decode
        // failure, including a read past the slice end, is malformed input.
        let mut ba = ByteArray::new(&buf[..total_bytes]);
        let frame = match fixed_header.packet_type() {
            PacketType::Connect => Self::Connect(ConnectPacket::decode(&mut ba)?),
            PacketType::ConnectAck => Self::ConnectAck(ConnectAckPacket::decode(&mut ba)?),
            PacketType::Publish { .. } => Self::Publish(PublishPacket::decode(&mut ba)?),
            PacketType::PublishAck => Self::PublishAck(PublishAckPacket::decode(&mut ba)?),
            PacketType::PublishReceived => {
                Self::PublishReceived(PublishReceivedPacket::decode(&mut ba)?)
            }
            PacketType::PublishRelease => {
                Self::PublishRelease(PublishReleasePacket::decode(&mut ba)?)
            }
            PacketType::PublishComplete => {
                Self::PublishComplete(PublishCompletePacket::decode(&mut ba)?)
            }
            PacketType::Subscribe => Self::Subscribe(SubscribePacket::decode(&mut ba)?),
            PacketType::SubscribeAck => Self::SubscribeAck(SubscribeAckPacket::decode(&mut ba)?),
            PacketType::Unsubscribe => Self::Unsubscribe(UnsubscribePacket::decode(&mut ba)?),
            PacketType::UnsubscribeAck => {
                Self::UnsubscribeAck(UnsubscribeAckPacket::decode(&mut ba)?)
            }
            PacketType::PingRequest => Self::PingRequest(PingRequestPacket::decode(&mut ba)?),
            PacketType::PingResponse => Self::PingResponse(PingResponsePacket::decode(&mut ba)?),
            PacketType::Disconnect => Self::Disconnect(DisconnectPacket::decode(&mut ba)?),
            PacketType::Auth => Self::Auth(AuthPacket::decode(&mut ba)?),
        };

        Ok(Some((frame, total_bytes)))
    }

    /// Get type of the wrapped packet.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnectAck(_) => PacketType::ConnectAck,
            Self::Publish(packet) => PacketType::Publish {
                dup: packet.dup(),
                qos: packet.qos(),
                retain: packet.retain(),
            },
            Self::PublishAck(_) => PacketType::PublishAck,
            Self::PublishReceived(_) => PacketType::PublishReceived,
            Self::PublishRelease(_) => PacketType::PublishRelease,
            Self::PublishComplete(_) => PacketType::PublishComplete,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubscribeAck(_) => PacketType::SubscribeAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubscribeAck(_) => PacketType::UnsubscribeAck,
            Self::PingRequest(_) => PacketType::PingRequest,
            Self::PingResponse(_) => PacketType::PingResponse,
            Self::Disconnect(_) => PacketType::Disconnect,
            Self::Auth(_) => PacketType::Auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EncodePacket, PacketId, QoS};

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(Frame::parse(&[]), Ok(None));
        assert_eq!(Frame::parse(&[0xd0]), Ok(None));
        // PUBACK header announcing 2 more bytes than present.
        assert_eq!(Frame::parse(&[0x40, 0x04, 0x00, 0x01]), Ok(None));
    }

    #[test]
    fn test_parse_two_packets_back_to_back() {
        let mut buf = Vec::new();
        PingResponsePacket::new().encode(&mut buf).unwrap();
        PublishAckPacket::new(PacketId::new(3)).encode(&mut buf).unwrap();

        let (frame, consumed) = Frame::parse(&buf).unwrap().unwrap();
        assert_eq!(frame, Frame::PingResponse(PingResponsePacket::new()));
        assert_eq!(consumed, 2);

        let (frame, consumed) = Frame::parse(&buf[2..]).unwrap().unwrap();
        assert_eq!(consumed, 4);
        match frame {
            Frame::PublishAck(packet) => assert_eq!(packet.packet_id(), PacketId::new(3)),
            other => panic!("expected PublishAck, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_publish() {
        let mut buf = Vec::new();
        let packet = PublishPacket::new("room/light", QoS::AtMostOnce, b"on").unwrap();
        packet.encode(&mut buf).unwrap();

        let (frame, consumed) = Frame::parse(&buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(frame, Frame::Publish(packet));
    }

    #[test]
    fn test_parse_malformed_var_int() {
        let buf = [0x40, 0xff, 0xff, 0xff, 0xff, 0x00, 0x01];
        assert_eq!(Frame::parse(&buf), Err(DecodeError::InvalidVarInt));
    }

    #[test]
    fn test_parse_unknown_packet_type() {
        let buf = [0x00, 0x00];
        assert_eq!(Frame::parse(&buf), Err(DecodeError::InvalidPacketType));
    }
}
