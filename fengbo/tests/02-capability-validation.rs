// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Pre-flight validation against CONNACK-announced broker limits, driven
//! end-to-end through a live session.

mod common;

use fengbo::codec::v5::{Properties, Property, SubscribeTopic};
use fengbo::codec::{BoolData, QoS, StringPairData, U32Data, VarInt};
use fengbo::{ConnectOptions, Error, ErrorKind, Session};
use tokio::net::TcpListener;

async fn start_session(connack_props: Vec<Property>) -> fengbo::AsyncClient {
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
async fn test_invalid_topic_filters() {
    // Validation happens before anything is sent, no broker needed.
    let mut options = ConnectOptions::new();
    options.brokers(["127.0.0.1"], fengbo::DEFAULT_MQTT_PORT).unwrap();
    let (_session, client) = Session::new(options);

    for filter in ["", "+topic", "topic+", "#topic", "some/#/topic", "$share//topic#"] {
        let err = client
            .subscribe(&[(filter, QoS::ExactOnce)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopic, "filter: {filter:?}");
    }

    let err = client.subscribe(&[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTopic);
}

#[test]
fn test_malformed_user_property() {
    // A control character or an over-long value never reaches the wire.
    let err: Error = StringPairData::from("key", "\u{0001}\u{0001}\u{0001}")
        .unwrap_err()
        .into();
    assert_eq!(err.kind(), ErrorKind::MalformedPacket);

    let big = "a".repeat(75_000);
    let err: Error = StringPairData::from("key", &big).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::MalformedPacket);
}

#[tokio::test]
async fn test_wildcard_subscription_not_available() {
    let client = start_session(vec![Property::WildcardSubscriptionAvailable(
        BoolData::new(false),
    )])
    .await;

    for filter in ["topic/#", "$share/grp/topic/#"] {
        let err = client
            .subscribe(&[(filter, QoS::ExactOnce)])
            .await
            .unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::WildcardSubscriptionNotAvailable,
            "filter: {filter:?}"
        );
    }
    client.cancel();
}

#[tokio::test]
async fn test_shared_subscription_not_available() {
    let client = start_session(vec![Property::SharedSubscriptionAvailable(BoolData::new(
        false,
    ))])
    .await;

    let err = client
        .subscribe(&[("$share/group/topic", QoS::ExactOnce)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SharedSubscriptionNotAvailable);
    client.cancel();
}

#[tokio::test]
async fn test_subscription_identifier_not_available() {
    let client = start_session(vec![Property::SubscriptionIdentifierAvailable(
        BoolData::new(false),
    )])
    .await;

    let mut properties = Properties::new();
    properties.push(Property::SubscriptionIdentifier(VarInt::from(23).unwrap()));
    let topics = vec![SubscribeTopic::new("topic", QoS::ExactOnce).unwrap()];
    let err = client.subscribe_with(topics, properties).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SubscriptionIdentifierNotAvailable);
    client.cancel();
}

#[test]
fn test_subscription_identifier_out_of_range() {
    // 2^32 - 1 does not fit a Variable Byte Integer, so the property
    // cannot even be built; the construction failure carries the
    // malformed_packet error kind.
    let err: Error = VarInt::from(u32::MAX as usize).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::MalformedPacket);
    assert!(VarInt::from(268_435_455).is_ok());
}

#[tokio::test]
async fn test_packet_too_large() {
    let client = start_session(vec![Property::MaximumPacketSize(U32Data::new(10))]).await;

    let err = client
        .subscribe(&[("very large topic", QoS::ExactOnce)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PacketTooLarge);

    let err = client
        .publish("another long topic", QoS::AtMostOnce, b"payload")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PacketTooLarge);
    client.cancel();
}
