//! Binary asset envelopes embedded in child entities.
//!
//! An envelope wraps an uploaded file's raw bytes together with its MIME
//! type and original filename. `size` and `etag` are always derived from the
//! payload at construction time, never trusted from the client.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("file `{filename}` exceeds the maximum size of {max} bytes")]
    TooLarge { filename: String, max: usize },
    #[error("stored asset bytes are not valid base64")]
    CorruptEncoding,
}

/// Stored byte payload. Documents written by this service hold the compact
/// base64 form; older documents may hold a plain JSON byte array. Every read
/// path normalizes through [`AssetBytes::flatten`] before touching the bytes,
/// so range slicing never operates on the encoded form.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetBytes {
    Flat(Vec<u8>),
    Base64(String),
}

impl AssetBytes {
    /// Normalize to a flat byte buffer. Borrowed when already flat, decoded
    /// into an owned buffer otherwise.
    pub fn flatten(&self) -> Result<Cow<'_, [u8]>, AssetError> {
        match self {
            AssetBytes::Flat(bytes) => Ok(Cow::Borrowed(bytes)),
            AssetBytes::Base64(text) => general_purpose::STANDARD
                .decode(text)
                .map(Cow::Owned)
                .map_err(|_| AssetError::CorruptEncoding),
        }
    }
}

impl Serialize for AssetBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Canonical stored form is base64, regardless of how we read it in.
        match self {
            AssetBytes::Flat(bytes) => {
                serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
            }
            AssetBytes::Base64(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for AssetBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = AssetBytes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a base64 string or an array of byte values")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<AssetBytes, E> {
                Ok(AssetBytes::Base64(v.to_owned()))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<AssetBytes, A::Error> {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                Ok(AssetBytes::Flat(bytes))
            }
        }

        deserializer.deserialize_any(BytesVisitor)
    }
}

/// One uploaded file: payload plus the metadata needed to serve it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetEnvelope {
    pub bytes: AssetBytes,
    pub mime_type: String,
    pub original_filename: String,
    /// Always equals the decoded payload length.
    pub size: i64,
    /// MD5 of the payload, served as the `ETag` response header.
    pub etag: String,
}

/// Asset metadata exposed on the API surface; the payload itself is only
/// reachable through the media endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub mime_type: String,
    pub original_filename: String,
    pub size: i64,
    pub etag: String,
}

impl AssetEnvelope {
    /// Build an envelope from an uploaded file part. Rejects payloads larger
    /// than `max_bytes` (a policy limit, enforced here so no oversized
    /// envelope can ever be constructed).
    pub fn from_upload(
        data: Bytes,
        mime_type: impl Into<String>,
        original_filename: impl Into<String>,
        max_bytes: usize,
    ) -> Result<Self, AssetError> {
        let original_filename = original_filename.into();
        if data.len() > max_bytes {
            return Err(AssetError::TooLarge {
                filename: original_filename,
                max: max_bytes,
            });
        }
        let etag = format!("{:x}", md5::compute(&data));
        Ok(Self {
            size: data.len() as i64,
            bytes: AssetBytes::Flat(data.to_vec()),
            mime_type: mime_type.into(),
            original_filename,
            etag,
        })
    }

    /// Normalized payload bytes, ready for slicing or streaming.
    pub fn flat_bytes(&self) -> Result<Cow<'_, [u8]>, AssetError> {
        self.bytes.flatten()
    }

    pub fn meta(&self) -> AssetMeta {
        AssetMeta {
            mime_type: self.mime_type.clone(),
            original_filename: self.original_filename.clone(),
            size: self.size,
            etag: self.etag.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_derives_size_and_etag() {
        let env = AssetEnvelope::from_upload(
            Bytes::from_static(b"hello world"),
            "text/plain",
            "hello.txt",
            1024,
        )
        .unwrap();
        assert_eq!(env.size, 11);
        assert_eq!(env.etag, format!("{:x}", md5::compute(b"hello world")));
        assert_eq!(env.flat_bytes().unwrap().as_ref(), b"hello world");
    }

    #[test]
    fn upload_rejects_oversized_payload() {
        let err = AssetEnvelope::from_upload(
            Bytes::from(vec![0u8; 32]),
            "video/mp4",
            "clip.mp4",
            16,
        )
        .unwrap_err();
        assert!(matches!(err, AssetError::TooLarge { max: 16, .. }));
    }

    #[test]
    fn both_stored_shapes_flatten_to_the_same_bytes() {
        let payload = b"\x00\x01binary\xff".to_vec();
        let flat = AssetBytes::Flat(payload.clone());
        let wrapped = AssetBytes::Base64(general_purpose::STANDARD.encode(&payload));
        assert_eq!(flat.flatten().unwrap(), wrapped.flatten().unwrap());
    }

    #[test]
    fn deserializes_base64_string_and_byte_array() {
        let from_string: AssetBytes = serde_json::from_str("\"aGk=\"").unwrap();
        assert_eq!(from_string.flatten().unwrap().as_ref(), b"hi");

        let from_array: AssetBytes = serde_json::from_str("[104, 105]").unwrap();
        assert_eq!(from_array, AssetBytes::Flat(b"hi".to_vec()));
    }

    #[test]
    fn serializes_canonically_as_base64() {
        let flat = AssetBytes::Flat(b"hi".to_vec());
        assert_eq!(serde_json::to_string(&flat).unwrap(), "\"aGk=\"");
    }

    #[test]
    fn invalid_base64_is_reported_as_corrupt() {
        let bad = AssetBytes::Base64("not//valid!!%".into());
        assert!(matches!(bad.flatten(), Err(AssetError::CorruptEncoding)));
    }
}
