//! QR Payloads
//!
//! The backend hands out either a `data:` URI holding a rendered image or the
//! raw pairing string. Images can be written to disk; raw strings can be drawn
//! straight into the terminal.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::{Color, QrCode};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("QR payload is not an image")]
    NotAnImage,

    #[error("failed to write QR image: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPayload {
    Image { mime: String, bytes: Vec<u8> },
    /// Raw pairing string, to be encoded locally
    Text(String),
}

impl QrPayload {
    pub fn parse(code: &str) -> Result<Self, QrError> {
        let code = code.trim();
        let Some(rest) = code.strip_prefix("data:") else {
            return Ok(QrPayload::Text(code.to_string()));
        };

        let (meta, data) = rest
            .split_once(',')
            .ok_or_else(|| QrError::InvalidDataUri("missing ',' separator".to_string()))?;

        let (mime, is_base64) = match meta.strip_suffix(";base64") {
            Some(mime) => (mime, true),
            None => (meta, false),
        };
        let mime = if mime.is_empty() {
            "text/plain".to_string()
        } else {
            mime.to_ascii_lowercase()
        };

        let bytes = if is_base64 {
            STANDARD.decode(data.trim())?
        } else {
            urlencoding::decode_binary(data.as_bytes()).into_owned()
        };

        if mime.starts_with("image/") {
            Ok(QrPayload::Image { mime, bytes })
        } else {
            String::from_utf8(bytes)
                .map(QrPayload::Text)
                .map_err(|_| QrError::InvalidDataUri(format!("non-UTF-8 {} payload", mime)))
        }
    }

    /// File extension matching the payload
    pub fn extension(&self) -> &'static str {
        match self {
            QrPayload::Image { mime, .. } => match mime.as_str() {
                "image/png" => "png",
                "image/jpeg" | "image/jpg" => "jpg",
                "image/svg+xml" => "svg",
                "image/gif" => "gif",
                _ => "img",
            },
            QrPayload::Text(_) => "txt",
        }
    }

    /// Write an image payload to `path`
    pub fn save_image(&self, path: &Path) -> Result<(), QrError> {
        match self {
            QrPayload::Image { bytes, .. } => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, bytes)?;
                tracing::debug!("Wrote QR image ({} bytes) to {:?}", bytes.len(), path);
                Ok(())
            }
            QrPayload::Text(_) => Err(QrError::NotAnImage),
        }
    }

    /// Terminal rendering, only possible for raw pairing strings.
    pub fn render_terminal(&self) -> Option<String> {
        match self {
            QrPayload::Text(data) => render_qr_unicode(data),
            QrPayload::Image { .. } => None,
        }
    }
}

/// Render a QR code as Unicode half blocks, two module rows per line.
///
/// Terminals put the code right against other output, and phone scanners
/// fail to lock onto a code without a light border, so a 4-module quiet
/// zone is drawn around it.
pub fn render_qr_unicode(data: &str) -> Option<String> {
    let code = QrCode::new(data.as_bytes()).ok()?;
    let matrix = code.to_colors();
    let w = code.width();
    let quiet = 4;
    let total = w + quiet * 2;
    let mut out = String::new();

    let color_at = |x: usize, y: usize| -> Color {
        if x < quiet || x >= quiet + w || y < quiet || y >= quiet + w {
            Color::Light
        } else {
            matrix[(y - quiet) * w + (x - quiet)]
        }
    };

    for y in (0..total).step_by(2) {
        for x in 0..total {
            let top = color_at(x, y);
            let bot = if y + 1 < total {
                color_at(x, y + 1)
            } else {
                Color::Light
            };
            out.push(match (top, bot) {
                (Color::Light, Color::Light) => ' ',
                (Color::Dark, Color::Dark) => '\u{2588}',
                (Color::Dark, Color::Light) => '\u{2580}',
                (Color::Light, Color::Dark) => '\u{2584}',
            });
        }
        out.push('\n');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_png_data_uri() {
        // "PNG" base64-encoded
        let payload = QrPayload::parse("data:image/png;base64,UE5H").unwrap();
        assert_eq!(
            payload,
            QrPayload::Image {
                mime: "image/png".to_string(),
                bytes: b"PNG".to_vec()
            }
        );
        assert_eq!(payload.extension(), "png");
        assert!(payload.render_terminal().is_none());
    }

    #[test]
    fn test_parse_raw_pairing_string() {
        let payload = QrPayload::parse("2@abc,def,ghi").unwrap();
        assert_eq!(payload, QrPayload::Text("2@abc,def,ghi".to_string()));
        assert_eq!(payload.extension(), "txt");
        let rendered = payload.render_terminal().unwrap();
        assert!(rendered.contains('\u{2588}'));
    }

    #[test]
    fn test_parse_plain_text_data_uri() {
        let payload = QrPayload::parse("data:,hello%20world").unwrap();
        assert_eq!(payload, QrPayload::Text("hello world".to_string()));
    }

    #[test]
    fn test_parse_rejects_bad_uris() {
        assert!(matches!(
            QrPayload::parse("data:image/png;base64"),
            Err(QrError::InvalidDataUri(_))
        ));
        assert!(matches!(
            QrPayload::parse("data:image/png;base64,@@@"),
            Err(QrError::Base64(_))
        ));
    }

    #[test]
    fn test_save_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("qr.png");
        let payload = QrPayload::parse("data:image/png;base64,UE5H").unwrap();
        payload.save_image(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"PNG");
    }

    #[test]
    fn test_save_text_payload_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let payload = QrPayload::Text("raw".to_string());
        assert!(matches!(
            payload.save_image(&dir.path().join("qr.png")),
            Err(QrError::NotAnImage)
        ));
    }

    #[test]
    fn test_render_has_quiet_zone() {
        let rendered = render_qr_unicode("hello").unwrap();
        let first = rendered.lines().next().unwrap();
        assert!(first.chars().all(|c| c == ' '));
        // Version 1 code: 21 modules + 8 quiet
        assert_eq!(first.chars().count(), 29);
    }
}
