//! Text/binary classification of logged request bodies.

use crate::config::{BodyType, TextEncoding};
use tracing::warn;

/// Media types logged as text besides `text/*`
const TEXT_ESSENCES: [&str; 5] = [
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-www-form-urlencoded",
    "application/x-empty",
];

/// Structured-syntax suffixes logged as text (`application/problem+json`)
const TEXT_SUFFIXES: [&str; 2] = ["json", "xml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyClass {
    Text,
    Bytes,
}

/// Guess the media type of raw bytes by content sniffing
pub fn sniff_media_type(body: &[u8]) -> String {
    if body.is_empty() {
        return "application/x-empty".to_string();
    }
    if let Some(kind) = infer::get(body) {
        return kind.mime_type().to_string();
    }
    match std::str::from_utf8(body) {
        Ok(text) if !text.chars().any(is_binary_control) => "text/plain".to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}

fn is_binary_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c')
}

/// Map a media type (possibly with parameters) to a body class
pub fn classify_media_type(media_type: &str) -> BodyClass {
    let parsed = match media_type.trim().parse::<mime::Mime>() {
        Ok(parsed) => parsed,
        Err(_) => return BodyClass::Bytes,
    };

    let is_text = parsed.type_() == mime::TEXT
        || TEXT_ESSENCES.contains(&parsed.essence_str())
        || parsed
            .suffix()
            .is_some_and(|suffix| TEXT_SUFFIXES.contains(&suffix.as_str()));

    if is_text {
        BodyClass::Text
    } else {
        BodyClass::Bytes
    }
}

/// Decide how to log a body: a declared text/bytes type wins, otherwise the
/// request's content type, otherwise the sniffed type.
pub fn classify(body_type: BodyType, content_type: Option<&str>, body: &[u8]) -> BodyClass {
    match body_type {
        BodyType::Text => BodyClass::Text,
        BodyType::Bytes => BodyClass::Bytes,
        BodyType::Auto => match content_type {
            Some(declared) => classify_media_type(declared),
            None => classify_media_type(&sniff_media_type(body)),
        },
    }
}

/// Text bodies are decoded with `encoding`; bytes, and text that does not
/// decode, are rendered as lowercase hex.
pub fn render_body(class: BodyClass, encoding: TextEncoding, body: &[u8]) -> String {
    match class {
        BodyClass::Text => match encoding.decode(body) {
            Some(text) => text.into_owned(),
            None => {
                warn!(
                    "Request body is not valid '{}' text, logging it as hex",
                    encoding.name()
                );
                hex::encode(body)
            }
        },
        BodyClass::Bytes => hex::encode(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_media_types() {
        for text in [
            "text/plain",
            "text/html; charset=utf-8",
            "application/json",
            "Application/JSON",
            "application/problem+json",
            "application/soap+xml",
            "application/x-www-form-urlencoded",
            "application/x-empty",
        ] {
            assert_eq!(classify_media_type(text), BodyClass::Text, "{text}");
        }
        for binary in [
            "application/octet-stream",
            "image/png",
            "multipart/form-data; boundary=x",
            "not a media type",
        ] {
            assert_eq!(classify_media_type(binary), BodyClass::Bytes, "{binary}");
        }
    }

    #[test]
    fn test_sniffing() {
        assert_eq!(sniff_media_type(b""), "application/x-empty");
        assert_eq!(sniff_media_type(b"plain words\n"), "text/plain");
        assert_eq!(
            sniff_media_type(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]),
            "image/png"
        );
        assert_eq!(
            sniff_media_type(&[0x00, 0x01, 0x02, 0xff]),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_declared_type_wins() {
        assert_eq!(
            classify(BodyType::Bytes, Some("application/json"), b"{}"),
            BodyClass::Bytes
        );
        assert_eq!(
            classify(BodyType::Text, Some("image/png"), b"abc"),
            BodyClass::Text
        );
    }

    #[test]
    fn test_auto_prefers_content_type_over_sniffing() {
        assert_eq!(
            classify(BodyType::Auto, Some("application/json"), br#"{"a":1}"#),
            BodyClass::Text
        );
        assert_eq!(
            classify(BodyType::Auto, Some("application/octet-stream"), b"text"),
            BodyClass::Bytes
        );
        assert_eq!(classify(BodyType::Auto, None, b"hello"), BodyClass::Text);
        assert_eq!(classify(BodyType::Auto, None, &[0u8, 159, 146, 150]), BodyClass::Bytes);
    }

    #[test]
    fn test_render_body() {
        let utf8 = TextEncoding::utf8();
        assert_eq!(render_body(BodyClass::Text, utf8, br#"{"a":1}"#), r#"{"a":1}"#);
        assert_eq!(render_body(BodyClass::Bytes, utf8, b"\x01\xab"), "01ab");
        assert_eq!(render_body(BodyClass::Text, utf8, &[0xff, 0x00]), "ff00");

        let cp1251 = TextEncoding::try_from("cp1251".to_string()).unwrap();
        assert_eq!(render_body(BodyClass::Text, cp1251, &[0xcf, 0xf0, 0xe8]), "При");
    }
}
