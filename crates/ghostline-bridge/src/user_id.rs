//! Puppet user ids
//!
//! A puppet's user id is the username template applied to its remote local
//! id. Phone numbers contribute their digits; everything else is escaped
//! into the homeserver's localpart alphabet (`a-z 0-9 - . /`), with upper
//! case letters written `_x`, underscores `__`, and any other byte `=hh`.
//! An escaped id never starts with a raw digit (a leading digit is written
//! `=3d`), so a short code such as `12345` cannot collide with `+12345`.

use crate::config::USERID_PLACEHOLDER;
use crate::matrix::UserId;
use ghostline_remote::is_phone_number;

/// Escape an arbitrary string into a valid localpart
pub fn encode_localpart(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'/' => out.push(char::from(byte)),
            b'A'..=b'Z' => {
                out.push('_');
                out.push(char::from(byte.to_ascii_lowercase()));
            }
            b'_' => out.push_str("__"),
            _ => {
                out.push('=');
                out.push_str(&hex::encode([byte]));
            }
        }
    }
    out
}

/// Reverse [`encode_localpart`]; `None` for input it could not have produced
pub fn decode_localpart(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                let next = *bytes.get(i + 1)?;
                match next {
                    b'_' => out.push(b'_'),
                    b'a'..=b'z' => out.push(next.to_ascii_uppercase()),
                    _ => return None,
                }
                i += 2;
            }
            b'=' => {
                let pair = input.get(i + 1..i + 3)?;
                let decoded = hex::decode(pair).ok()?;
                out.extend_from_slice(&decoded);
                i += 3;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

/// Maps remote local ids to puppet user ids and back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuppetUserIds {
    prefix: String,
    suffix: String,
    domain: String,
}

impl PuppetUserIds {
    /// Build from a username template containing `{userid}`.
    ///
    /// A template without the placeholder yields a codec that maps every
    /// local id to the same user id; configuration validation rejects that.
    pub fn new(username_template: &str, domain: impl Into<String>) -> Self {
        let (prefix, suffix) = username_template
            .split_once(USERID_PLACEHOLDER)
            .unwrap_or((username_template, ""));
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            domain: domain.into(),
        }
    }

    /// Localpart for a remote local id
    pub fn localpart(&self, local_id: &str) -> String {
        format!("{}{}{}", self.prefix, encode_local_id(local_id), self.suffix)
    }

    /// User id for a remote local id
    pub fn format(&self, local_id: &str) -> UserId {
        UserId::from_parts(&self.localpart(local_id), &self.domain)
    }

    /// Remote local id for a puppet user id, `None` for any other user
    pub fn parse(&self, user_id: &UserId) -> Option<String> {
        let (localpart, domain) = user_id.parts()?;
        if domain != self.domain {
            return None;
        }
        let inner = localpart
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if inner.is_empty() {
            return None;
        }
        let local_id = if inner.bytes().all(|b| b.is_ascii_digit()) {
            format!("+{inner}")
        } else {
            decode_localpart(inner)?
        };
        // Only the canonical spelling of an id maps back to it.
        (encode_local_id(&local_id) == inner).then_some(local_id)
    }
}

fn encode_local_id(local_id: &str) -> String {
    if let Some(digits) = local_id.strip_prefix('+').filter(|_| is_phone_number(local_id)) {
        return digits.to_string();
    }
    let encoded = encode_localpart(local_id);
    match encoded.as_bytes().first() {
        Some(&first) if first.is_ascii_digit() => {
            format!("={}{}", hex::encode([first]), &encoded[1..])
        }
        _ => encoded,
    }
}
