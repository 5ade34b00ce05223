//! Capture keys derived from decoded barcode values.
//!
//! Decoded payloads are arbitrary: they may contain `/`, `..`, NUL bytes or
//! anything else a symbology can encode. The payload is therefore never used
//! as a name directly. Instead it is hashed with BLAKE3 in key-derivation
//! mode and the 64-character hex digest becomes the lookup key and the file
//! stem.

use std::fmt;

/// Domain-separation context for key derivation. Changing it invalidates
/// every key ever produced.
const KEY_CONTEXT: &str = "scanshot 2024-06-01 capture key v1";

/// Length of a key's hex rendering.
pub const KEY_HEX_LEN: usize = 64;

/// Stable identifier of a decoded barcode value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureKey([u8; 32]);

impl CaptureKey {
    /// Derive the key for a decoded value.
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self::derive(None, value.as_bytes())
    }

    /// Derive the key for a value that must be told apart per symbology
    /// (the same digits as EAN-13 and as Code 128, for instance).
    #[must_use]
    pub fn with_symbology(value: &str, symbology: &str) -> Self {
        Self::derive(Some(symbology), value.as_bytes())
    }

    /// Derive the key for a binary payload that is not valid UTF-8.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        Self::derive(None, payload)
    }

    fn derive(symbology: Option<&str>, value: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(KEY_CONTEXT);
        match symbology {
            Some(symbology) => {
                hasher.update(&[1]);
                hasher.update(&(symbology.len() as u64).to_le_bytes());
                hasher.update(symbology.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(value);
        Self(*hasher.finalize().as_bytes())
    }

    /// Parse a key back from its hex rendering.
    ///
    /// Returns `None` unless `hex` is exactly [`KEY_HEX_LEN`] hex digits, so a
    /// parsed key always maps back to a path-safe file name.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        blake3::Hash::from_hex(hex)
            .ok()
            .map(|hash| Self(*hash.as_bytes()))
    }

    /// Lowercase hex rendering, always [`KEY_HEX_LEN`] characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// File name for the image stored under this key.
    #[must_use]
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.to_hex(), extension)
    }
}

impl fmt::Display for CaptureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CaptureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CaptureKey({})", &self.to_hex()[..16])
    }
}

impl From<&str> for CaptureKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<&String> for CaptureKey {
    fn from(value: &String) -> Self {
        Self::new(value)
    }
}
