// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Maximum byte length of a string or binary field, limited by its
/// Two Byte Integer length prefix.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// Byte length exceeds the Two Byte Integer length prefix.
    TooLong,

    /// Contains U+0000, a control character or a non-character.
    InvalidChar,
}

/// Validate an UTF-8 string against the MQTT character rules.
///
/// The character data MUST be well-formed UTF-8 and MUST NOT include
/// an encoding of the null character U+0000 [MQTT-1.5.4-2]. Encodings of
/// control characters U+0001..U+001F and U+007F..U+009F and of Unicode
/// non-characters are treated as Malformed Packets as well.
///
/// # Errors
///
/// Returns error if `s` is too long or contains a disallowed code point.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > MAX_STRING_LEN {
        return Err(StringError::TooLong);
    }
    for c in s.chars() {
        if c == '\u{0000}' {
            return Err(StringError::InvalidChar);
        }
        if ('\u{0001}'..='\u{001f}').contains(&c) || ('\u{007f}'..='\u{009f}').contains(&c) {
            return Err(StringError::InvalidChar);
        }
        let cp = c as u32;
        // Non-characters U+FDD0..U+FDEF and the last two code points of each plane.
        if (0xfdd0..=0xfdef).contains(&cp) || (cp & 0xfffe) == 0xfffe {
            return Err(StringError::InvalidChar);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    /// Larger than 23 chars.
    TooLong,

    /// Can only contain 0-9a-zA-Z.
    InvalidChars,
}

/// Validate client identifier.
///
/// The Server MUST allow ClientID's which are between 1 and 23 UTF-8 encoded
/// bytes in length, and that contain only the characters
/// `0-9a-zA-Z` [MQTT-3.1.3-5]. A zero length ClientID asks the Server to
/// assign one.
///
/// # Errors
///
/// Returns error if `client_id` is invalid.
pub fn validate_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.len() > 23 {
        return Err(ClientIdError::TooLong);
    }
    if !client_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ClientIdError::InvalidChars);
    }
    Ok(())
}

/// Generate a random alphanumeric client identifier of `len` chars.
pub fn random_client_id(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_utf8_string() {
        assert!(validate_utf8_string("sensors/level2").is_ok());
        assert!(validate_utf8_string("").is_ok());
        assert_eq!(
            validate_utf8_string("a\u{0000}b"),
            Err(StringError::InvalidChar)
        );
        assert_eq!(
            validate_utf8_string("\u{0001}"),
            Err(StringError::InvalidChar)
        );
        assert_eq!(
            validate_utf8_string("bad\u{fdd0}"),
            Err(StringError::InvalidChar)
        );
        assert_eq!(
            validate_utf8_string("bad\u{ffff}"),
            Err(StringError::InvalidChar)
        );
    }

    #[test]
    fn test_validate_client_id() {
        assert!(validate_client_id("fengbo01").is_ok());
        assert!(validate_client_id("").is_ok());
        assert_eq!(
            validate_client_id("way-too-long-client-identifier"),
            Err(ClientIdError::TooLong)
        );
        assert_eq!(
            validate_client_id("has space"),
            Err(ClientIdError::InvalidChars)
        );
    }

    #[test]
    fn test_random_client_id() {
        let id = random_client_id(12);
        assert_eq!(id.len(), 12);
        assert!(validate_client_id(&id).is_ok());
    }
}
