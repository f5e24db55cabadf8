// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Asynchronous MQTT 5.0 client library.
//!
//! The client keeps a persistent, reconnecting session with one or more
//! brokers over TCP, TLS, WebSocket or WebSocket-over-TLS and exposes
//! publish, subscribe, unsubscribe, receive and disconnect operations.
//! Wire encoding and decoding live in the `fengbo_codec` crate, re-exported
//! here as [`codec`].

mod auth;
mod client;
mod commands;
mod connect_options;
mod error;
mod packet_id;
mod session;
mod stream;
mod types;
mod validator;

pub use auth::{Authenticator, SingleStepAuthenticator};
pub use client::AsyncClient;
pub use connect_options::{
    ConnectOptions, ConnectType, Endpoint, TlsType, DEFAULT_MQTTS_PORT, DEFAULT_MQTT_PORT,
};
pub use error::{Error, ErrorKind};
pub use packet_id::PacketIdRegistry;
pub use session::{Session, Status};
pub use stream::Stream;
pub use types::{Message, PublishAck, SubscribeAck, UnsubscribeAck};
pub use validator::ServerCaps;

pub use codec;
