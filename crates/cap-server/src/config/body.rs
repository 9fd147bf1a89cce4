//! Literal or file-backed HTTP bodies and text encodings.

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use tracing::{error, warn};

/// A text encoding resolved from its WHATWG label (`utf-8`, `latin1`, `cp1251`, ...).
#[derive(Clone, Copy, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct TextEncoding {
    encoding: &'static Encoding,
    /// Plain `utf-16` writes a little-endian byte order mark
    bom: bool,
}

impl TextEncoding {
    pub fn utf8() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            bom: false,
        }
    }

    pub fn name(&self) -> &'static str {
        if self.bom {
            "UTF-16"
        } else {
            self.encoding.name()
        }
    }

    fn is_utf16(&self) -> bool {
        self.encoding == UTF_16LE || self.encoding == UTF_16BE
    }

    /// Encode text for the wire. Characters the encoding cannot represent
    /// become numeric character references.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        // encoding_rs only decodes UTF-16
        if self.is_utf16() {
            return Cow::Owned(self.encode_utf16(text));
        }
        let (bytes, _, unmappable) = self.encoding.encode(text);
        if unmappable {
            warn!(
                "Text contains characters not representable in '{}'",
                self.name()
            );
        }
        bytes
    }

    fn encode_utf16(&self, text: &str) -> Vec<u8> {
        let big_endian = self.encoding == UTF_16BE;
        self.bom
            .then_some(0xFEFF_u16)
            .into_iter()
            .chain(text.encode_utf16())
            .flat_map(|unit| {
                if big_endian {
                    unit.to_be_bytes()
                } else {
                    unit.to_le_bytes()
                }
            })
            .collect()
    }

    /// Strict decode; `None` when the bytes are malformed for this encoding
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        if self.bom {
            if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
                if encoding == UTF_16LE || encoding == UTF_16BE {
                    return encoding
                        .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..]);
                }
            }
        }
        self.encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
    }
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::utf8()
    }
}

impl PartialEq for TextEncoding {
    fn eq(&self, other: &Self) -> bool {
        self.encoding == other.encoding && self.bom == other.bom
    }
}

impl Eq for TextEncoding {}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextEncoding").field(&self.name()).finish()
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = String;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        let trimmed = label.trim();
        let encoding = Encoding::for_label(trimmed.as_bytes())
            .ok_or_else(|| format!("Unknown encoding type '{label}'"))?;
        Ok(Self {
            encoding,
            bom: trimmed.eq_ignore_ascii_case("utf-16"),
        })
    }
}

impl From<TextEncoding> for String {
    fn from(encoding: TextEncoding) -> Self {
        encoding.name().to_lowercase()
    }
}

/// Body declared in configuration: either the contents of `file` or `data`
/// encoded with `data_encoding`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HttpBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub data_encoding: TextEncoding,
}

impl HttpBody {
    pub fn literal(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    fn literal_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data_encoding.encode(&self.data))
    }

    /// Resolve the body, reading the file fresh on every call.
    /// A read failure is logged and yields an empty body.
    pub async fn load(&self) -> Bytes {
        match &self.file {
            Some(path) => match tokio::fs::read(path).await {
                Ok(content) => Bytes::from(content),
                Err(e) => {
                    error!("Body file '{}' reading error: {}. Empty body will be used", path, e);
                    Bytes::new()
                }
            },
            None => self.literal_bytes(),
        }
    }

    /// Blocking variant of [`HttpBody::load`] for use outside the request path
    pub fn load_blocking(&self) -> Bytes {
        match &self.file {
            Some(path) => match std::fs::read(path) {
                Ok(content) => Bytes::from(content),
                Err(e) => {
                    error!("Body file '{}' reading error: {}. Empty body will be used", path, e);
                    Bytes::new()
                }
            },
            None => self.literal_bytes(),
        }
    }
}
