// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::error::Error;

/// Enhanced authentication exchange, identified by the Authentication Method
/// property of the CONNECT packet [MQTT-4.12].
///
/// During the handshake every server AUTH packet with reason code 0x18
/// (Continue authentication) is handed to the authenticator; the returned
/// bytes are sent back in a client AUTH packet until the server answers
/// with CONNACK.
pub trait Authenticator: Send + Sync {
    /// Authentication Method sent in the CONNECT packet.
    fn method(&self) -> &str;

    /// Authentication Data sent in the CONNECT packet, if any.
    fn initial_data(&mut self) -> Result<Option<Vec<u8>>, Error>;

    /// Produce the next Authentication Data for a server challenge.
    fn continue_auth(&mut self, server_data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Authenticator for servers that run the whole exchange inside CONNECT/
/// CONNACK, like SASL PLAIN.
pub struct SingleStepAuthenticator {
    method: String,
    data: Option<Vec<u8>>,
}

impl SingleStepAuthenticator {
    #[must_use]
    pub fn new(method: &str, data: Option<&[u8]>) -> Self {
        Self {
            method: method.to_owned(),
            data: data.map(<[u8]>::to_vec),
        }
    }
}

impl Authenticator for SingleStepAuthenticator {
    fn method(&self) -> &str {
        &self.method
    }

    fn initial_data(&mut self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.data.clone())
    }

    fn continue_auth(&mut self, _server_data: &[u8]) -> Result<Vec<u8>, Error> {
        Err(Error::new(
            crate::error::ErrorKind::AuthFailed,
            "Unexpected auth continuation for single step method",
        ))
    }
}
