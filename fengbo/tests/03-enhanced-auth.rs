// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Drives the AUTH challenge/response exchange through the handshake and
//! a re-authentication round on the live connection.

mod common;

use fengbo::codec::v5::{AuthPacket, ConnectAckPacket, Frame, Property, ReasonCode, SubscribeAckPacket};
use fengbo::codec::{BinaryData, QoS, StringData};
use fengbo::{Authenticator, ConnectOptions, Error, ErrorKind, Session};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

struct ChallengeAuthenticator;

impl Authenticator for ChallengeAuthenticator {
    fn method(&self) -> &str {
        "X-CHALLENGE"
    }

    fn initial_data(&mut self) -> Result<Option<Vec<u8>>, Error> {
        Ok(Some(b"client-first".to_vec()))
    }

    fn continue_auth(&mut self, server_data: &[u8]) -> Result<Vec<u8>, Error> {
        if server_data == b"server-challenge" {
            Ok(b"client-final".to_vec())
        } else {
            Err(Error::new(ErrorKind::AuthFailed, "Unexpected challenge"))
        }
    }
}

/// A broker that insists on one AUTH round before CONNACK and accepts
/// re-authentication afterwards.
async fn run_auth_broker(listener: TcpListener) {
    let (mut stream, _addr) = listener.accept().await.unwrap();
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut connected = false;

    loop {
        loop {
            match Frame::parse(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.drain(..consumed);
                    match frame {
                        Frame::Connect(packet) => {
                            assert_eq!(
                                packet.properties().authentication_method(),
                                Some("X-CHALLENGE")
                            );
                            assert_eq!(
                                packet.properties().authentication_data(),
                                Some(&b"client-first"[..])
                            );
                            let mut auth =
                                AuthPacket::with_reason(ReasonCode::ContinueAuthentication);
                            auth.properties_mut().push(Property::AuthenticationMethod(
                                StringData::from("X-CHALLENGE").unwrap(),
                            ));
                            auth.properties_mut().push(Property::AuthenticationData(
                                BinaryData::from_slice(b"server-challenge").unwrap(),
                            ));
                            common::write_packet(&mut stream, &auth).await;
                        }
                        Frame::Auth(packet) => {
                            if connected {
                                assert_eq!(packet.reason_code(), ReasonCode::ReAuthenticate);
                                assert_eq!(
                                    packet.properties().authentication_method(),
                                    Some("X-CHALLENGE")
                                );
                                common::write_packet(&mut stream, &AuthPacket::new()).await;
                            } else {
                                assert_eq!(
                                    packet.reason_code(),
                                    ReasonCode::ContinueAuthentication
                                );
                                assert_eq!(
                                    packet.properties().authentication_data(),
                                    Some(&b"client-final"[..])
                                );
                                connected = true;
                                let ack = ConnectAckPacket::new(false, ReasonCode::Success);
                                common::write_packet(&mut stream, &ack).await;
                            }
                        }
                        Frame::Subscribe(packet) => {
                            let ack =
                                SubscribeAckPacket::new(packet.packet_id(), ReasonCode::Success);
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
async fn test_enhanced_auth_handshake_and_reauth() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(run_auth_broker(listener));

    let mut options = ConnectOptions::new();
    options
        .brokers([format!("127.0.0.1:{port}")], fengbo::DEFAULT_MQTT_PORT)
        .unwrap();
    options.authenticator(Box::new(ChallengeAuthenticator));

    let (session, client) = Session::new(options);
    tokio::spawn(session.run_loop());

    // The handshake only completes after the challenge round.
    let (reasons, _props) = client
        .subscribe(&[("secured/topic", QoS::AtMostOnce)])
        .await
        .unwrap();
    assert_eq!(reasons, vec![ReasonCode::Success]);

    client.re_authenticate().await.unwrap();

    client.disconnect().await.unwrap();
}
