// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Connect over TLS with webpki root certificates.

use fengbo::codec::QoS;
use fengbo::{ConnectOptions, ConnectType, Error, Session, TlsType, DEFAULT_MQTTS_PORT};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let mut options = ConnectOptions::new();
    options.brokers(["broker.emqx.io"], DEFAULT_MQTTS_PORT)?;
    options.set_connect_type(ConnectType::Mqtts(TlsType::CASigned));

    let (session, client) = Session::new(options);
    tokio::spawn(session.run_loop());

    client
        .publish("hello/fengbo/tls", QoS::ExactOnce, b"over tls")
        .await?;
    println!("published");

    client.disconnect().await
}
