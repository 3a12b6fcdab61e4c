// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::EncodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// Length of data exceeds 65535 bytes.
    TooManyData,

    /// Contains null character or other forbidden code points.
    InvalidChar,

    /// Byte sequence is not well formed UTF-8.
    InvalidLength,
}

/// Convert a byte slice into an owned UTF-8 string.
///
/// # Errors
///
/// Returns error if bytes are not well formed UTF-8 or contain
/// forbidden code points.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = std::str::from_utf8(bytes).map_err(|_| StringError::InvalidLength)?;
    validate_utf8_string(s)?;
    Ok(s.to_string())
}

/// Validate an UTF-8 string used in control packets.
///
/// The character data in a UTF-8 Encoded String MUST be well-formed UTF-8.
/// In particular, it MUST NOT include encodings of code points between
/// U+D800 and U+DFFF [MQTT-1.5.4-1], and MUST NOT include an encoding of
/// the null character U+0000 [MQTT-1.5.4-2].
///
/// # Errors
///
/// Returns error if string is too long or contains forbidden code points.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > usize::from(u16::MAX) {
        return Err(StringError::TooManyData);
    }
    // Surrogates cannot occur in a rust str, only the null check is needed.
    if s.contains('\u{0000}') {
        return Err(StringError::InvalidChar);
    }
    Ok(())
}

/// Validate length of a two-byte-prefixed binary field.
///
/// # Errors
///
/// Returns error if slice is longer than 65535 bytes.
pub fn validate_two_bytes_data(data: &[u8]) -> Result<(), EncodeError> {
    if data.len() > usize::from(u16::MAX) {
        Err(EncodeError::TooManyData)
    } else {
        Ok(())
    }
}

/// The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded
/// bytes in length, and that contain only the characters
/// "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ" [MQTT-3.1.3-5].
///
/// The Server MAY allow longer ClientIds, which this implementation does;
/// only the character set rule is relaxed to any non-control character.
///
/// # Errors
///
/// Returns error if `client_id` is too long or contains control characters.
pub fn validate_client_id(client_id: &str) -> Result<(), StringError> {
    if client_id.len() > usize::from(u16::MAX) {
        return Err(StringError::TooManyData);
    }
    if client_id.chars().any(char::is_control) {
        return Err(StringError::InvalidChar);
    }
    Ok(())
}

/// Generate a random client id for clients which connected with
/// a zero length client id.
#[must_use]
pub fn random_client_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("weir-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_utf8_string() {
        assert!(validate_utf8_string("sensors/room1/temp").is_ok());
        assert!(validate_utf8_string("").is_ok());
        assert!(validate_utf8_string("a\u{0000}b").is_err());
    }

    #[test]
    fn test_random_client_id() {
        let id = random_client_id();
        assert!(id.starts_with("weir-"));
        assert!(validate_client_id(&id).is_ok());
    }
}
