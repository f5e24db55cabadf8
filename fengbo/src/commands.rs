// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v5::{Properties, ReasonCode, SubscribeTopic};
use codec::QoS;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::types::{PublishAck, SubscribeAck, UnsubscribeAck};

/// One-shot completion handle carried by every operation command.
pub type Reply<T> = oneshot::Sender<Result<T, Error>>;

/// Operations posted from client handles onto the session task.
///
/// The session owns all connection state; user threads only ever talk to it
/// through this channel and await the reply.
#[derive(Debug)]
pub enum ClientToSessionCmd {
    Publish {
        topic: String,
        qos: QoS,
        payload: Vec<u8>,
        retain: bool,
        properties: Properties,
        reply: Reply<PublishAck>,
    },

    Subscribe {
        topics: Vec<SubscribeTopic>,
        properties: Properties,
        reply: Reply<SubscribeAck>,
    },

    Unsubscribe {
        topics: Vec<String>,
        properties: Properties,
        reply: Reply<UnsubscribeAck>,
    },

    /// Start an AUTH re-authentication exchange on a connected session.
    ReAuthenticate { reply: Reply<()> },

    /// Orderly shutdown: send DISCONNECT with `reason` and close the client.
    Disconnect {
        reason: ReasonCode,
        properties: Properties,
        reply: Reply<()>,
    },

    /// Terminate immediately; every pending operation fails with
    /// `operation_cancelled`.
    Cancel,
}
