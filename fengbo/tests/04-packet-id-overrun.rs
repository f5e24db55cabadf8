// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Exhausts the whole 16-bit packet identifier space through the public
//! client API and checks that the next operation fails with pid_overrun.

mod common;

use std::pin::Pin;
use std::task::Poll;

use fengbo::codec::v5::{ConnectAckPacket, Frame, ReasonCode};
use fengbo::codec::QoS;
use fengbo::{ConnectOptions, ErrorKind, Session};
use futures_util::stream::{FuturesUnordered, Stream};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// A broker that accepts the connection and then stays silent, so every
/// `QoS` 1 publish keeps its packet identifier in flight forever.
async fn run_mute_broker(listener: TcpListener) {
    let (mut stream, _addr) = listener.accept().await.unwrap();
    let mut buf: Vec<u8> = Vec::with_capacity(65536);

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
async fn test_pid_overrun() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(run_mute_broker(listener));

    let mut options = ConnectOptions::new();
    options
        .brokers([format!("127.0.0.1:{port}")], fengbo::DEFAULT_MQTT_PORT)
        .unwrap();
    let (session, client) = Session::new(options);
    tokio::spawn(session.run_loop());

    // 65535 QoS 1 publishes that are never acknowledged.
    let mut pending = FuturesUnordered::new();
    for _ in 0..u16::MAX {
        pending.push(client.publish("t", QoS::AtLeastOnce, b""));
    }
    // One poll pass posts every publish onto the session; none can
    // complete, so their commands are all queued ahead of the subscribe
    // below and the id space is full by the time it is processed.
    std::future::poll_fn(|cx| {
        let _ = Pin::new(&mut pending).poll_next(cx);
        Poll::Ready(())
    })
    .await;

    let err = client
        .subscribe(&[("topic", QoS::ExactOnce)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PidOverrun);

    client.cancel();
    drop(pending);
}
