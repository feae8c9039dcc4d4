//! Fixed-layout AES-256-GCM container decryption.
//!
//! Key material and database containers recovered from the device follow a
//! fixed byte layout: the 32-byte key sits at offset 126 of the key file,
//! the 12-byte nonce at offset 67 of the container, the ciphertext starts
//! at offset 191 and the 16-byte authentication tag is the final bytes of
//! the file. Tag verification failure is reported as an integrity error,
//! distinct from any I/O problem, because it means the key does not belong
//! to this container.

use std::fs;
use std::path::Path;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

use crate::audit::sha256_bytes;
use crate::error::{AcquireError, Result};

/// Offset of the key inside the key-material file.
pub const KEY_OFFSET: usize = 126;
/// AES-256 key length.
pub const KEY_LEN: usize = 32;
/// Offset of the nonce inside the container header.
pub const NONCE_OFFSET: usize = 67;
/// GCM nonce length.
pub const NONCE_LEN: usize = 12;
/// Container header length; ciphertext begins here.
pub const HEADER_LEN: usize = 191;
/// GCM authentication tag length, trailing the ciphertext.
pub const TAG_LEN: usize = 16;

const MIN_KEY_MATERIAL: usize = KEY_OFFSET + KEY_LEN;
const MIN_CONTAINER: usize = HEADER_LEN + TAG_LEN;

/// Result of a successful container decryption.
#[derive(Debug, Clone)]
pub struct DecryptSummary {
    pub plaintext_bytes: usize,
    pub plaintext_sha256: String,
}

/// Slice the AES key out of a key-material file.
pub fn extract_key(key_material: &[u8]) -> Result<&[u8]> {
    if key_material.len() < MIN_KEY_MATERIAL {
        return Err(AcquireError::TruncatedInput {
            what: "key material",
            need: MIN_KEY_MATERIAL,
            got: key_material.len(),
        });
    }
    Ok(&key_material[KEY_OFFSET..KEY_OFFSET + KEY_LEN])
}

/// Decrypt a database container with the key material recovered alongside it.
///
/// The ciphertext and trailing tag are contiguous, so the whole region past
/// the header feeds the AEAD in one piece. Any verification failure maps to
/// [`AcquireError::Integrity`].
pub fn decrypt_container(key_material: &[u8], container: &[u8]) -> Result<Vec<u8>> {
    let key = extract_key(key_material)?;
    if container.len() < MIN_CONTAINER {
        return Err(AcquireError::TruncatedInput {
            what: "database container",
            need: MIN_CONTAINER,
            got: container.len(),
        });
    }

    let nonce = &container[NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN];
    let sealed = &container[HEADER_LEN..];

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AcquireError::Integrity)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| AcquireError::Integrity)
}

/// File-level wrapper: decrypt `container_path` with `key_path`, writing the
/// plaintext to `output_path` only when tag verification passed.
pub fn decrypt_file(
    key_path: &Path,
    container_path: &Path,
    output_path: &Path,
) -> Result<DecryptSummary> {
    let key_material = fs::read(key_path)
        .map_err(|err| AcquireError::from_io_error(key_path.display().to_string(), err))?;
    let container = fs::read(container_path)
        .map_err(|err| AcquireError::from_io_error(container_path.display().to_string(), err))?;

    let plaintext = decrypt_container(&key_material, &container)?;

    fs::write(output_path, &plaintext)
        .map_err(|err| AcquireError::from_io_error(output_path.display().to_string(), err))?;

    Ok(DecryptSummary {
        plaintext_bytes: plaintext.len(),
        plaintext_sha256: sha256_bytes(&plaintext),
    })
}
