// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Connect over WebSocket; the URL path comes from the broker authority.

use fengbo::codec::QoS;
use fengbo::{ConnectOptions, ConnectType, Error, Session};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let mut options = ConnectOptions::new();
    options.brokers(["broker.emqx.io:8083/mqtt"], 8083)?;
    options.set_connect_type(ConnectType::Ws);

    let (session, client) = Session::new(options);
    tokio::spawn(session.run_loop());

    let (reasons, _props) = client
        .subscribe(&[("hello/#", QoS::AtMostOnce)])
        .await?;
    println!("subscribed: {reasons:?}");

    loop {
        let message = client.receive().await?;
        println!(
            "{}: {}",
            message.topic,
            String::from_utf8_lossy(&message.payload)
        );
    }
}
