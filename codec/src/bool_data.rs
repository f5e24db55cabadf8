// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// A single byte holding 0 or 1.
///
/// Used by properties like Retain Available; it is a Protocol Error for
/// such a byte to hold any other value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoolData(bool);

impl BoolData {
    /// Create a new bool data.
    #[must_use]
    pub const fn new(on: bool) -> Self {
        Self(on)
    }

    /// Get inner bool value.
    #[must_use]
    pub const fn value(&self) -> bool {
        self.0
    }

    /// Get byte length in packet.
    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        1
    }
}

impl DecodePacket for BoolData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        match ba.read_byte()? {
            0 => Ok(Self(false)),
            1 => Ok(Self(true)),
            _ => Err(DecodeError::InvalidPropertyValue),
        }
    }
}

impl EncodePacket for BoolData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(u8::from(self.0));
        Ok(Self::bytes())
    }
}
