use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// First eight bytes of every PNG file.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// JSON fields the service has been seen to wrap a QR payload in.
const JSON_FIELDS: [&str; 4] = ["qr", "qr_code", "totp_qr", "image"];

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("empty payload")]
    Empty,

    #[error("payload is not a PNG image")]
    NotPng,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON payload has no QR field")]
    MissingField,
}

/// A decoded QR enrollment image, ready to be displayed or saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    png: Vec<u8>,
}

impl QrImage {
    pub fn from_png(png: Vec<u8>) -> Result<Self, QrError> {
        if png.is_empty() {
            return Err(QrError::Empty);
        }
        if !png.starts_with(&PNG_SIGNATURE) {
            return Err(QrError::NotPng);
        }

        Ok(Self { png })
    }

    /// Decode a QR response body.
    ///
    /// Accepts raw PNG bytes, a base64 string (optionally a `data:` URL), or
    /// a JSON string or object carrying one of those.
    pub fn decode(body: &[u8]) -> Result<Self, QrError> {
        if body.starts_with(&PNG_SIGNATURE) {
            return Self::from_png(body.to_vec());
        }

        let text = std::str::from_utf8(body).map_err(|_| QrError::NotPng)?.trim();
        if text.is_empty() {
            return Err(QrError::Empty);
        }

        if text.starts_with('{') || text.starts_with('"') {
            let value: serde_json::Value =
                serde_json::from_str(text).map_err(|_| QrError::MissingField)?;
            let encoded = match &value {
                serde_json::Value::String(s) => s.as_str(),
                serde_json::Value::Object(map) => JSON_FIELDS
                    .iter()
                    .find_map(|field| map.get(*field).and_then(|v| v.as_str()))
                    .ok_or(QrError::MissingField)?,
                _ => return Err(QrError::MissingField),
            };
            return Self::from_base64(encoded);
        }

        Self::from_base64(text)
    }

    /// Decode base64 text, with or without a `data:image/png;base64,` header.
    pub fn from_base64(text: &str) -> Result<Self, QrError> {
        let payload = match text.split_once(',') {
            Some((header, data)) if header.starts_with("data:") => data,
            _ => text,
        };
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.is_empty() {
            return Err(QrError::Empty);
        }

        Self::from_png(STANDARD.decode(cleaned)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn byte_len(&self) -> usize {
        self.png.len()
    }

    /// Image source usable by anything that understands `data:` URLs.
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}
