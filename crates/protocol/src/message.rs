//! Minimal FIX tag=value message model.
//!
//! Parsing is non-validating: any `tag=value` sequence separated by SOH is
//! accepted and field order is preserved.  [`FixMessage::to_wire`] rebuilds
//! `BodyLength(9)` and `CheckSum(10)` so callers never maintain them.

use std::fmt;

/// FIX field delimiter.
pub const SOH: char = '\u{1}';

pub mod tags {
    pub const BEGIN_STRING: u32 = 8;
    pub const BODY_LENGTH: u32 = 9;
    pub const CHECKSUM: u32 = 10;
    pub const MSG_SEQ_NUM: u32 = 34;
    pub const MSG_TYPE: u32 = 35;
    pub const SENDER_COMP_ID: u32 = 49;
    pub const TARGET_COMP_ID: u32 = 56;
    pub const TEXT: u32 = 58;
    /// Base64 DER certificate carried on Logon.
    pub const CERTIFICATE: u32 = 9479;
    /// Local timestamp stamped on every outbound application message.
    pub const SIGNING_TIMESTAMP: u32 = 9481;
    pub const SIGNATURE: u32 = 9489;
}

pub mod msg_type {
    pub const HEARTBEAT: &str = "0";
    pub const TEST_REQUEST: &str = "1";
    pub const RESEND_REQUEST: &str = "2";
    pub const REJECT: &str = "3";
    pub const SEQUENCE_RESET: &str = "4";
    pub const LOGOUT: &str = "5";
    pub const LOGON: &str = "A";
}

const ADMIN_TYPES: [&str; 7] = [
    msg_type::HEARTBEAT,
    msg_type::TEST_REQUEST,
    msg_type::RESEND_REQUEST,
    msg_type::REJECT,
    msg_type::SEQUENCE_RESET,
    msg_type::LOGOUT,
    msg_type::LOGON,
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("field {index} is not tag=value: {segment:?}")]
    MalformedField { index: usize, segment: String },
    #[error("invalid tag {0:?}")]
    InvalidTag(String),
    #[error("message has no fields")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: u32,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixMessage {
    fields: Vec<Field>,
}

impl FixMessage {
    /// An empty message of the given type.
    pub fn new(msg_type: &str) -> Self {
        let mut msg = Self::default();
        msg.set(tags::MSG_TYPE, msg_type);
        msg
    }

    /// Parse SOH-delimited text.  A trailing delimiter is optional.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let mut fields = Vec::new();
        for (index, segment) in raw.split(SOH).enumerate() {
            if segment.is_empty() {
                continue;
            }
            let (tag, value) = segment
                .split_once('=')
                .ok_or_else(|| MessageError::MalformedField {
                    index,
                    segment: segment.to_owned(),
                })?;
            let tag = tag
                .trim()
                .parse::<u32>()
                .map_err(|_| MessageError::InvalidTag(tag.to_owned()))?;
            fields.push(Field {
                tag,
                value: value.to_owned(),
            });
        }
        if fields.is_empty() {
            return Err(MessageError::Empty);
        }
        Ok(Self { fields })
    }

    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.fields.iter().any(|f| f.tag == tag)
    }

    /// Replace the first occurrence of `tag`, or append it.
    pub fn set(&mut self, tag: u32, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.tag == tag) {
            Some(field) => field.value = value,
            None => self.fields.push(Field { tag, value }),
        }
    }

    pub fn remove(&mut self, tag: u32) -> Option<String> {
        let idx = self.fields.iter().position(|f| f.tag == tag)?;
        Some(self.fields.remove(idx).value)
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.get(tags::MSG_TYPE)
    }

    pub fn is_admin(&self) -> bool {
        self.msg_type().is_some_and(|t| ADMIN_TYPES.contains(&t))
    }

    pub fn sender_comp_id(&self) -> Option<&str> {
        self.get(tags::SENDER_COMP_ID)
    }

    pub fn target_comp_id(&self) -> Option<&str> {
        self.get(tags::TARGET_COMP_ID)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Serialize with a recomputed `BodyLength` and `CheckSum`.
    ///
    /// `BeginString` leads, `MsgType` opens the body, and any stale 9/10
    /// fields are dropped.
    pub fn to_wire(&self) -> String {
        let mut body = String::new();
        if let Some(t) = self.msg_type() {
            push_field(&mut body, tags::MSG_TYPE, t);
        }
        for f in &self.fields {
            match f.tag {
                tags::BEGIN_STRING | tags::BODY_LENGTH | tags::CHECKSUM | tags::MSG_TYPE => {}
                _ => push_field(&mut body, f.tag, &f.value),
            }
        }

        let mut out = String::new();
        if let Some(begin) = self.get(tags::BEGIN_STRING) {
            push_field(&mut out, tags::BEGIN_STRING, begin);
        }
        push_field(&mut out, tags::BODY_LENGTH, &body.len().to_string());
        out.push_str(&body);
        let sum = checksum(out.as_bytes());
        push_field(&mut out, tags::CHECKSUM, &format!("{sum:03}"));
        out
    }
}

/// Pipe-delimited rendering for logs and client display.
impl fmt::Display for FixMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            write!(f, "{}={}|", field.tag, field.value)?;
        }
        Ok(())
    }
}

/// FIX checksum: byte sum modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn push_field(out: &mut String, tag: u32, value: &str) {
    out.push_str(&tag.to_string());
    out.push('=');
    out.push_str(value);
    out.push(SOH);
}
