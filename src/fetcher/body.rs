//! Response body decoding and line ending policy
//!
//! Bodies are decoded with the charset named in the `Content-Type` header,
//! falling back to UTF-8. Malformed sequences are replaced rather than
//! rejected, so a decodable stream never turns a 200 into a failure.

use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How line breaks in a decoded body are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEndingPolicy {
    /// Keep the decoded body byte-for-byte
    #[default]
    Preserve,

    /// Split on `\n`, `\r\n` or `\r` and terminate every line with `\r`
    CarriageReturn,
}

impl LineEndingPolicy {
    /// Apply the policy to a decoded body
    pub fn apply(self, text: String) -> String {
        match self {
            Self::Preserve => text,
            Self::CarriageReturn => {
                let unified = text.replace("\r\n", "\n").replace('\r', "\n");
                let mut out = String::with_capacity(unified.len());
                for line in unified.split_terminator('\n') {
                    out.push_str(line);
                    out.push('\r');
                }
                out
            }
        }
    }
}

impl FromStr for LineEndingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "preserve" => Ok(Self::Preserve),
            "carriage_return" | "cr" => Ok(Self::CarriageReturn),
            other => Err(format!("unknown line ending policy: {other}")),
        }
    }
}

/// Extract the charset label from a Content-Type header value
fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Decode raw body bytes to text
///
/// # Arguments
///
/// * `bytes` - Raw response bytes
/// * `content_type` - Content-Type header value, if the response had one
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (cow, _encoding, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(
            encoding = encoding.name(),
            "Body contained malformed sequences, replaced"
        );
    }

    cow.into_owned()
}
