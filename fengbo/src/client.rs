// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::sync::Arc;
use std::time::Duration;

use codec::v5::{Properties, ReasonCode, SubscribeTopic};
use codec::QoS;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::commands::ClientToSessionCmd;
use crate::error::{Error, ErrorKind};
use crate::types::{Message, PublishAck, SubscribeAck, UnsubscribeAck};

/// Handle to a running [`Session`](crate::Session).
///
/// Cheap to clone and safe to use from any task or thread; every operation
/// is posted onto the session's execution context and resolved there.
///
/// ```no_run
/// use fengbo::{ConnectOptions, Session};
/// use fengbo::codec::QoS;
///
/// #[tokio::main]
/// async fn main() -> Result<(), fengbo::Error> {
///     let mut options = ConnectOptions::new();
///     options.brokers(["broker.emqx.io"], fengbo::DEFAULT_MQTT_PORT)?;
///     let (session, client) = Session::new(options);
///     tokio::spawn(session.run_loop());
///
///     client.subscribe(&[("hello/fengbo", QoS::AtMostOnce)]).await?;
///     let message = client.receive().await?;
///     println!("{}: {:?}", message.topic, message.payload);
///     client.disconnect().await
/// }
/// ```
#[derive(Clone)]
pub struct AsyncClient {
    sender: mpsc::UnboundedSender<ClientToSessionCmd>,
    messages: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
    operation_timeout: Option<Duration>,
}

impl AsyncClient {
    pub(crate) fn new(
        sender: mpsc::UnboundedSender<ClientToSessionCmd>,
        messages: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
        operation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            sender,
            messages,
            operation_timeout,
        }
    }

    async fn wait_reply<T>(&self, rx: oneshot::Receiver<Result<T, Error>>) -> Result<T, Error> {
        match self.operation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| Error::new(ErrorKind::Timeout, "Operation deadline exceeded"))??,
            None => rx.await?,
        }
    }

    /// Publish `payload` to `topic`.
    ///
    /// Resolves once the exchange for the requested `QoS` level finishes:
    /// immediately after the write for `QoS` 0, on PUBACK for `QoS` 1 and
    /// on PUBCOMP for `QoS` 2. The broker's reason code and acknowledgement
    /// properties are returned verbatim.
    ///
    /// # Errors
    ///
    /// Returns error if the packet fails pre-flight validation, packet ids
    /// are exhausted, or the client is cancelled.
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: &[u8],
    ) -> Result<PublishAck, Error> {
        self.publish_with(topic, qos, payload, false, Properties::new())
            .await
    }

    /// Publish with the full set of options: retain flag and
    /// PUBLISH properties.
    ///
    /// # Errors
    ///
    /// Returns error if the packet fails pre-flight validation, packet ids
    /// are exhausted, or the client is cancelled.
    pub async fn publish_with(
        &self,
        topic: &str,
        qos: QoS,
        payload: &[u8],
        retain: bool,
        properties: Properties,
    ) -> Result<PublishAck, Error> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(ClientToSessionCmd::Publish {
            topic: topic.to_owned(),
            qos,
            payload: payload.to_vec(),
            retain,
            properties,
            reply,
        })?;
        self.wait_reply(rx).await
    }

    /// Subscribe to a list of `(topic_filter, qos)` pairs.
    ///
    /// Returns one reason code per filter, in request order, and the SUBACK
    /// properties.
    ///
    /// # Errors
    ///
    /// Returns error if a filter is syntactically invalid, the list is
    /// empty, a broker capability is violated, packet ids are exhausted,
    /// or the connection is lost before the SUBACK arrives.
    pub async fn subscribe(&self, topics: &[(&str, QoS)]) -> Result<SubscribeAck, Error> {
        let mut list = Vec::with_capacity(topics.len());
        for (filter, qos) in topics {
            list.push(SubscribeTopic::new(filter, *qos)?);
        }
        self.subscribe_with(list, Properties::new()).await
    }

    /// Subscribe with full subscription options and SUBSCRIBE properties.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncClient::subscribe`].
    pub async fn subscribe_with(
        &self,
        topics: Vec<SubscribeTopic>,
        properties: Properties,
    ) -> Result<SubscribeAck, Error> {
        if topics.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidTopic,
                "Empty topic filter list",
            ));
        }
        let (reply, rx) = oneshot::channel();
        self.sender.send(ClientToSessionCmd::Subscribe {
            topics,
            properties,
            reply,
        })?;
        self.wait_reply(rx).await
    }

    /// Unsubscribe from a list of topic filters.
    ///
    /// # Errors
    ///
    /// Returns error if a filter is syntactically invalid, the list is
    /// empty, packet ids are exhausted, or the connection is lost before
    /// the UNSUBACK arrives.
    pub async fn unsubscribe(&self, topics: &[&str]) -> Result<UnsubscribeAck, Error> {
        self.unsubscribe_with(topics, Properties::new()).await
    }

    /// Unsubscribe with UNSUBSCRIBE properties.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncClient::unsubscribe`].
    pub async fn unsubscribe_with(
        &self,
        topics: &[&str],
        properties: Properties,
    ) -> Result<UnsubscribeAck, Error> {
        if topics.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidTopic,
                "Empty topic filter list",
            ));
        }
        let (reply, rx) = oneshot::channel();
        self.sender.send(ClientToSessionCmd::Unsubscribe {
            topics: topics.iter().map(|s| (*s).to_owned()).collect(),
            properties,
            reply,
        })?;
        self.wait_reply(rx).await
    }

    /// Receive the next application message.
    ///
    /// Messages are delivered in broker-emitted order. Multiple callers
    /// may wait concurrently; each message goes to exactly one of them.
    ///
    /// # Errors
    ///
    /// Returns `operation_cancelled` once the session is closed and
    /// the inbound queue is drained.
    pub async fn receive(&self) -> Result<Message, Error> {
        let mut messages = self.messages.lock().await;
        messages.recv().await.ok_or_else(|| {
            Error::new(ErrorKind::OperationCancelled, "Client is closed")
        })
    }

    /// Start an AUTH re-authentication exchange on the live connection.
    ///
    /// # Errors
    ///
    /// Returns error if no authenticator is configured, the client is not
    /// connected, or the broker rejects the exchange.
    pub async fn re_authenticate(&self) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ClientToSessionCmd::ReAuthenticate { reply })?;
        self.wait_reply(rx).await
    }

    /// Orderly shutdown with reason code 0x00 (Normal disconnection).
    ///
    /// # Errors
    ///
    /// Returns error if the session is already gone.
    pub async fn disconnect(&self) -> Result<(), Error> {
        self.disconnect_with(ReasonCode::Success, Properties::new())
            .await
    }

    /// Orderly shutdown with an explicit reason code and
    /// DISCONNECT properties.
    ///
    /// # Errors
    ///
    /// Returns error if the session is already gone.
    pub async fn disconnect_with(
        &self,
        reason: ReasonCode,
        properties: Properties,
    ) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(ClientToSessionCmd::Disconnect {
            reason,
            properties,
            reply,
        })?;
        self.wait_reply(rx).await
    }

    /// Terminate the session immediately.
    ///
    /// Every pending operation resolves with `operation_cancelled`.
    /// Calling this more than once, or after the session ended, is a no-op.
    pub fn cancel(&self) {
        let _ = self.sender.send(ClientToSessionCmd::Cancel);
    }
}
