// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! A tiny in-process broker good enough to drive the client through
//! connect, subscribe, publish and disconnect.

// Not every test crate uses every helper.
#![allow(dead_code)]

use fengbo::codec::v5::{
    ConnectAckPacket, Frame, PingResponsePacket, Property, PublishAckPacket, PublishPacket,
    ReasonCode, SubscribeAckPacket,
};
use fengbo::codec::{EncodePacket, QoS};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub async fn write_packet<P: EncodePacket>(stream: &mut TcpStream, packet: &P) {
    let mut buf = Vec::new();
    packet.encode(&mut buf).unwrap();
    stream.write_all(&buf).await.unwrap();
}

/// Serve a single client connection.
///
/// Accepts the CONNECT with `connack_props`, grants every subscription at
/// the requested level and then publishes one greeting message, and acks
/// every `QoS` 1 publish.
pub async fn run_broker(listener: TcpListener, connack_props: Vec<Property>) {
    let (mut stream, _addr) = listener.accept().await.unwrap();
    let mut buf: Vec<u8> = Vec::with_capacity(4096);

    loop {
        loop {
            match Frame::parse(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.drain(..consumed);
                    match frame {
                        Frame::Connect(_packet) => {
                            let mut ack = ConnectAckPacket::new(false, ReasonCode::Success);
                            for property in &connack_props {
                                ack.properties_mut().push(property.clone());
                            }
                            write_packet(&mut stream, &ack).await;
                        }
                        Frame::Subscribe(packet) => {
                            let ack =
                                SubscribeAckPacket::new(packet.packet_id(), ReasonCode::Success);
                            write_packet(&mut stream, &ack).await;

                            let greeting =
                                PublishPacket::new("hello/fengbo", QoS::AtMostOnce, b"hi")
                                    .unwrap();
                            write_packet(&mut stream, &greeting).await;
                        }
                        Frame::Publish(packet) => {
                            if packet.qos() == QoS::AtLeastOnce {
                                let ack = PublishAckPacket::new(packet.packet_id());
                                write_packet(&mut stream, &ack).await;
                            }
                        }
                        Frame::PingRequest(_packet) => {
                            write_packet(&mut stream, &PingResponsePacket::new()).await;
                        }
                        Frame::Disconnect(_packet) => return,
                        _ => {}
                    }
                }
                Ok(None) => break,
                Err(err) => panic!("broker: malformed client packet: {err:?}"),
            }
        }

        let n_recv = stream.read_buf(&mut buf).await.unwrap();
        if n_recv == 0 {
            return;
        }
    }
}
