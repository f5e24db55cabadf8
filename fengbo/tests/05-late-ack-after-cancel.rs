// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! A caller that stops waiting frees its operation record; the broker's
//! late acknowledgement must then be absorbed silently instead of reading
//! as an unknown-id protocol violation.

mod common;

use std::time::Duration;

use fengbo::codec::v5::{
    ConnectAckPacket, Frame, PublishAckPacket, ReasonCode, SubscribeAckPacket,
};
use fengbo::codec::QoS;
use fengbo::{ConnectOptions, ErrorKind, Session};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// A broker that sits on SUBSCRIBE for a while before answering, long
/// past the client's operation deadline.
async fn run_slow_broker(listener: TcpListener) {
    let (mut stream, _addr) = listener.accept().await.unwrap();
    let mut buf: Vec<u8> = Vec::with_capacity(4096);

    loop {
        loop {
            match Frame::parse(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.drain(..consumed);
                    match frame {
                        Frame::Connect(_packet) => {
                            let ack = ConnectAckPacket::new(false, ReasonCode::Success);
                            common::write_packet(&mut stream, &ack).await;
                        }
                        Frame::Subscribe(packet) => {
                            tokio::time::sleep(Duration::from_millis(1500)).await;
                            let ack =
                                SubscribeAckPacket::new(packet.packet_id(), ReasonCode::Success);
                            common::write_packet(&mut stream, &ack).await;
                        }
                        Frame::Publish(packet) => {
                            if packet.qos() == QoS::AtLeastOnce {
                                let ack = PublishAckPacket::new(packet.packet_id());
                                common::write_packet(&mut stream, &ack).await;
                            }
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

#[tokio::test]
async fn test_late_ack_after_cancelled_subscribe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(run_slow_broker(listener));

    let mut options = ConnectOptions::new();
    options
        .brokers([format!("127.0.0.1:{port}")], fengbo::DEFAULT_MQTT_PORT)
        .unwrap();
    options.set_operation_timeout(Some(Duration::from_millis(150)));
    let (session, client) = Session::new(options);
    tokio::spawn(session.run_loop());

    // The broker answers after 1.5s, far past the 150ms deadline; the
    // dropped reply handle cancels the subscribe.
    let err = client
        .subscribe(&[("slow/topic", QoS::AtMostOnce)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // Wait past the late SUBACK. The cancellation sweep has removed the
    // record by then; the quarantined id must absorb the ack.
    tokio::time::sleep(Duration::from_millis(2000)).await;

    // Still on the same connection: a reconnect would have no broker to
    // come back to, so this publish only succeeds if the late ack did not
    // trip the protocol check.
    let (reason, _props) = client
        .publish("alive", QoS::AtLeastOnce, b"x")
        .await
        .unwrap();
    assert_eq!(reason, ReasonCode::Success);

    client.disconnect().await.unwrap();
}
