//! The session record and the portable session-string codec.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::errors::{Result, StorageError};

/// Data center a fresh session binds to before anything was stored.
pub const DEFAULT_DC_ID: i32 = 2;

/// Auth-key length the session-string layout carries.
pub const AUTH_KEY_LEN: usize = 256;

/// Decoded size of a session string: 1 + 4 + 1 + 256 + 8 + 1 bytes.
pub const SESSION_STRING_LEN: usize = 271;

// ─── SessionData ──────────────────────────────────────────────────────────────

/// The singleton authentication record every backend persists.
///
/// Exactly one logical row exists per storage instance; it is created
/// lazily by [`Storage::open`](crate::Storage::open) and removed by
/// [`Storage::delete`](crate::Storage::delete).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionData {
    /// Datacenter this session is bound to.
    pub dc_id:     i32,
    /// API id used during authorization, once known.
    pub api_id:    Option<i32>,
    /// Whether the session targets the test network.
    pub test_mode: Option<bool>,
    /// The 256-byte MTProto authorization key; empty until key exchange.
    pub auth_key:  Vec<u8>,
    /// Last-saved unix time, stamped by `save()`.
    pub date:      i64,
    /// Logged-in account id, once known.
    pub user_id:   Option<i64>,
    /// Whether the logged-in account is a bot.
    pub is_bot:    Option<bool>,
}

impl Default for SessionData {
    /// The record created on first open: bound to the default DC, not yet
    /// authenticated.
    fn default() -> Self {
        Self {
            dc_id:     DEFAULT_DC_ID,
            api_id:    None,
            test_mode: None,
            auth_key:  Vec::new(),
            date:      0,
            user_id:   None,
            is_bot:    None,
        }
    }
}

// ─── SessionString ────────────────────────────────────────────────────────────

/// The portable, fixed-layout session export.
///
/// The packed form is big-endian, 271 bytes, encoded with the URL-safe
/// base64 alphabet and the `=` padding stripped:
///
/// | offset | size | field       |
/// |--------|------|-------------|
/// | 0      | 1    | `dc_id`     |
/// | 1      | 4    | `api_id`    |
/// | 5      | 1    | `test_mode` |
/// | 6      | 256  | `auth_key`  |
/// | 262    | 8    | `user_id`   |
/// | 270    | 1    | `is_bot`    |
///
/// Unset optional fields encode as zero; an auth key shorter than 256
/// bytes is right-padded with zeros. Any client writing this layout can
/// exchange strings with this one.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionString {
    /// Datacenter id, `0..=255` on the wire.
    pub dc_id:     i32,
    /// API id; zero when it was never set.
    pub api_id:    i32,
    /// Test-network flag; false when it was never set.
    pub test_mode: bool,
    /// Authorization key, zero-padded to the full width.
    pub auth_key:  [u8; AUTH_KEY_LEN],
    /// Account id; zero when it was never set.
    pub user_id:   i64,
    /// Bot flag; false when it was never set.
    pub is_bot:    bool,
}

impl SessionString {
    /// Assemble from storage fields, normalizing unset values the way the
    /// layout requires.
    ///
    /// Fails with [`StorageError::Invalid`] when the auth key exceeds
    /// [`AUTH_KEY_LEN`] bytes or the DC id does not fit one byte.
    pub fn new(
        dc_id: i32,
        api_id: Option<i32>,
        test_mode: Option<bool>,
        auth_key: &[u8],
        user_id: Option<i64>,
        is_bot: Option<bool>,
    ) -> Result<Self> {
        if auth_key.len() > AUTH_KEY_LEN {
            return Err(StorageError::invalid(format!(
                "auth key is {} bytes, the session string fits {AUTH_KEY_LEN}",
                auth_key.len()
            )));
        }
        if !(0..=255).contains(&dc_id) {
            return Err(StorageError::invalid(format!("dc id {dc_id} does not fit one byte")));
        }
        let mut key = [0u8; AUTH_KEY_LEN];
        key[..auth_key.len()].copy_from_slice(auth_key);
        Ok(Self {
            dc_id,
            api_id:    api_id.unwrap_or(0),
            test_mode: test_mode.unwrap_or(false),
            auth_key:  key,
            user_id:   user_id.unwrap_or(0),
            is_bot:    is_bot.unwrap_or(false),
        })
    }

    /// Encode to the padding-free base64 form.
    pub fn encode(&self) -> String {
        let mut packed = Vec::with_capacity(SESSION_STRING_LEN);
        packed.push(self.dc_id as u8);
        packed.extend_from_slice(&(self.api_id as u32).to_be_bytes());
        packed.push(self.test_mode as u8);
        packed.extend_from_slice(&self.auth_key);
        packed.extend_from_slice(&(self.user_id as u64).to_be_bytes());
        packed.push(self.is_bot as u8);
        URL_SAFE_NO_PAD.encode(packed)
    }

    /// Decode a session string written in this layout. Trailing `=`
    /// padding is tolerated; anything that does not decode to exactly
    /// [`SESSION_STRING_LEN`] bytes is [`StorageError::Invalid`].
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim_end_matches('='))
            .map_err(|e| StorageError::invalid(format!("session string is not base64: {e}")))?;
        if bytes.len() != SESSION_STRING_LEN {
            return Err(StorageError::invalid(format!(
                "session string decodes to {} bytes, expected {SESSION_STRING_LEN}",
                bytes.len()
            )));
        }
        let mut api_id = [0u8; 4];
        api_id.copy_from_slice(&bytes[1..5]);
        let mut auth_key = [0u8; AUTH_KEY_LEN];
        auth_key.copy_from_slice(&bytes[6..262]);
        let mut user_id = [0u8; 8];
        user_id.copy_from_slice(&bytes[262..270]);
        Ok(Self {
            dc_id:     i32::from(bytes[0]),
            api_id:    u32::from_be_bytes(api_id) as i32,
            test_mode: bytes[5] != 0,
            auth_key,
            user_id:   u64::from_be_bytes(user_id) as i64,
            is_bot:    bytes[270] != 0,
        })
    }
}

impl fmt::Debug for SessionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionString")
            .field("dc_id", &self.dc_id)
            .field("api_id", &self.api_id)
            .field("test_mode", &self.test_mode)
            .field("auth_key", &format_args!("<{AUTH_KEY_LEN} bytes>"))
            .field("user_id", &self.user_id)
            .field("is_bot", &self.is_bot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionString {
        SessionString::new(2, Some(12345), Some(false), &[0xAB; AUTH_KEY_LEN], Some(123_456_789), Some(false))
            .unwrap()
    }

    #[test]
    fn encode_produces_the_documented_layout() {
        let encoded = sample().encode();
        assert_eq!(encoded.len(), 362, "271 bytes must encode to 362 unpadded chars");
        assert!(!encoded.contains('='), "padding must be stripped");

        let bytes = URL_SAFE_NO_PAD.decode(&encoded).unwrap();
        assert_eq!(bytes.len(), SESSION_STRING_LEN);
        assert_eq!(bytes[0], 2, "dc_id at offset 0");
        assert_eq!(&bytes[1..5], &12345u32.to_be_bytes(), "api_id at offset 1");
        assert_eq!(bytes[5], 0, "test_mode at offset 5");
        assert!(bytes[6..262].iter().all(|b| *b == 0xAB), "auth_key at offset 6");
        assert_eq!(&bytes[262..270], &123_456_789u64.to_be_bytes(), "user_id at offset 262");
        assert_eq!(bytes[270], 0, "is_bot at offset 270");
    }

    #[test]
    fn encode_parse_round_trip() {
        let original = sample();
        let parsed = SessionString::parse(&original.encode()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn parse_tolerates_padding() {
        let padded = format!("{}==", sample().encode());
        assert_eq!(SessionString::parse(&padded).unwrap(), sample());
    }

    #[test]
    fn short_auth_key_is_right_padded() {
        let s = SessionString::new(1, None, None, &[7, 7, 7], None, None).unwrap();
        assert_eq!(&s.auth_key[..3], &[7, 7, 7]);
        assert!(s.auth_key[3..].iter().all(|b| *b == 0));
        assert_eq!(s.api_id, 0);
        assert!(!s.test_mode);
        assert_eq!(s.user_id, 0);
        assert!(!s.is_bot);
    }

    #[test]
    fn oversized_auth_key_is_invalid() {
        let err = SessionString::new(1, None, None, &[0; AUTH_KEY_LEN + 1], None, None).unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn dc_id_outside_one_byte_is_invalid() {
        let err = SessionString::new(256, None, None, &[], None, None).unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)), "got {err:?}");
        let err = SessionString::new(-1, None, None, &[], None, None).unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn parse_rejects_wrong_length() {
        let err = SessionString::parse(&URL_SAFE_NO_PAD.encode([0u8; 42])).unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = SessionString::parse("not base64 !!!").unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn default_session_starts_unauthenticated_on_dc2() {
        let session = SessionData::default();
        assert_eq!(session.dc_id, DEFAULT_DC_ID);
        assert!(session.auth_key.is_empty());
        assert_eq!(session.date, 0);
        assert_eq!(session.api_id, None);
        assert_eq!(session.user_id, None);
    }
}
