// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

mod common;

use fengbo::codec::v5::ReasonCode;
use fengbo::codec::QoS;
use fengbo::{ConnectOptions, Session};
use tokio::net::TcpListener;

async fn start_session(connack_props: Vec<fengbo::codec::v5::Property>) -> fengbo::AsyncClient {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(common::run_broker(listener, connack_props));

    let mut options = ConnectOptions::new();
    options
        .brokers([format!("127.0.0.1:{port}")], fengbo::DEFAULT_MQTT_PORT)
        .unwrap();
    let (session, client) = Session::new(options);
    tokio::spawn(session.run_loop());
    client
}

#[tokio::test]
async fn test_subscribe_receive_publish() {
    let client = start_session(vec![]).await;

    let (reasons, _props) = client
        .subscribe(&[("hello/fengbo", QoS::AtMostOnce)])
        .await
        .unwrap();
    assert_eq!(reasons, vec![ReasonCode::Success]);

    // The broker greets every subscriber.
    let message = client.receive().await.unwrap();
    assert_eq!(message.topic, "hello/fengbo");
    assert_eq!(message.payload, b"hi");

    let (reason, _props) = client
        .publish("hello/fengbo", QoS::AtLeastOnce, b"pong")
        .await
        .unwrap();
    assert_eq!(reason, ReasonCode::Success);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_qos0_publish_completes_without_ack() {
    let client = start_session(vec![]).await;

    let (reason, props) = client
        .publish("fire/and/forget", QoS::AtMostOnce, b"x")
        .await
        .unwrap();
    assert_eq!(reason, ReasonCode::Success);
    assert!(props.is_empty());

    client.cancel();
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let client = start_session(vec![]).await;
    client.cancel();
    client.cancel();
}
