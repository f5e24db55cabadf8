// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;
use std::io::Write;

use crate::utils::{validate_utf8_string, StringError};
use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// Text fields within the MQTT control packets are encoded as UTF-8 strings,
/// represented by a Two Byte Integer length followed by that many bytes.
///
/// The length of String Data is thus limited to the range of 0 to 65,535 bytes.
///
/// ```txt
/// +-------------------+
/// | String Length     |
/// |                   |
/// +-------------------+
/// | String ...        |
/// +-------------------+
/// ```
///
/// The character data MUST be well-formed UTF-8 [MQTT-1.5.4-1] and MUST NOT
/// include an encoding of U+0000 [MQTT-1.5.4-2]; disallowed code points are
/// checked in [`validate_utf8_string`].
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StringData(String);

impl StringData {
    /// Create an empty string data.
    #[must_use]
    pub const fn new() -> Self {
        Self(String::new())
    }

    /// Convert a string slice into string data.
    ///
    /// # Errors
    ///
    /// Returns error if `s` is too long or contains disallowed characters.
    pub fn from(s: &str) -> Result<Self, StringError> {
        validate_utf8_string(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Get byte length in packet, including the length prefix.
    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    /// Returns true if string data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StringData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StringData {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl DecodePacket for StringData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let len = ba.read_u16()? as usize;
        let s = ba.read_string(len)?;
        Ok(Self(s))
    }
}

impl EncodePacket for StringData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        buf.write_u16::<BigEndian>(self.0.len() as u16)?;
        buf.write_all(self.0.as_bytes())?;
        Ok(self.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_data_round_trip() {
        let s = StringData::from("sensors/+/state").unwrap();
        let mut buf = Vec::new();
        let written = s.encode(&mut buf).unwrap();
        assert_eq!(written, 17);
        assert_eq!(&buf[..2], &[0x00, 0x0f]);

        let mut ba = ByteArray::new(&buf);
        let decoded = StringData::decode(&mut ba).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn test_string_data_rejects_control_chars() {
        assert_eq!(StringData::from("a\u{0001}b"), Err(StringError::InvalidChar));
    }
}
