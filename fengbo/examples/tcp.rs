// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Subscribe and publish over plain TCP.

use fengbo::codec::QoS;
use fengbo::{ConnectOptions, Error, Session, DEFAULT_MQTT_PORT};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let mut options = ConnectOptions::new();
    options.brokers(["broker.emqx.io"], DEFAULT_MQTT_PORT)?;
    options.credentials("fengboTcpDemo", None, None);
    options.set_keep_alive(30);

    let (session, client) = Session::new(options);
    tokio::spawn(session.run_loop());

    let (reasons, _suback_props) = client
        .subscribe(&[("hello/fengbo", QoS::AtLeastOnce)])
        .await?;
    println!("subscribed: {reasons:?}");

    client
        .publish("hello/fengbo", QoS::AtLeastOnce, b"Hello, world!")
        .await?;

    let message = client.receive().await?;
    println!(
        "got message on {}: {}",
        message.topic,
        String::from_utf8_lossy(&message.payload)
    );

    client.disconnect().await
}
