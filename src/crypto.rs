//! Decryption of encrypted gamedata payloads.
//!
//! Encrypted tables are AES-128-CBC with PKCS#7 padding. Key and IV material both come from a
//! fixed 32-character mask: the first half is the key, the second half is XORed over the first
//! ciphertext block before decryption. The first plaintext block is a sub-header and is dropped,
//! the rest is a BSON document.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::compress::CodecError;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Fixed key/IV material shipped with the client.
pub const CHAT_MASK: &[u8; 32] = b"UITpAi82pHAWwnzqHRMCwPonJLIB3WCl";
/// Length of the RSA signature prefixed to signed payloads.
pub const SIGNATURE_LEN: usize = 128;

const BLOCK: usize = 16;

fn key() -> &'static [u8] {
    &CHAT_MASK[..BLOCK]
}

fn iv() -> &'static [u8] {
    &CHAT_MASK[BLOCK..]
}

/// Strips the signature prefix when `signed`, or returns an error if the payload is too short
/// to carry one.
pub fn strip_signature(data: &[u8], signed: bool) -> Result<&[u8], CodecError> {
    if !signed {
        return Ok(data);
    }
    data.get(SIGNATURE_LEN..)
        .ok_or_else(|| CodecError::corrupt(format!("payload of {} bytes is shorter than its signature", data.len())))
}

/// Decrypts an encrypted gamedata payload and returns the bytes after the 16-byte sub-header.
pub fn decrypt_payload(data: &[u8], signed: bool) -> Result<Vec<u8>, CodecError> {
    let mut buf = strip_signature(data, signed)?.to_vec();
    if buf.len() < BLOCK || buf.len() % BLOCK != 0 {
        return Err(CodecError::Decrypt(format!("ciphertext length {} is not a positive multiple of {}", buf.len(), BLOCK)));
    }
    for (byte, mask) in buf.iter_mut().zip(iv()) {
        *byte ^= mask;
    }

    let cipher = Aes128CbcDec::new_from_slices(key(), iv()).map_err(|e| CodecError::Decrypt(e.to_string()))?;
    let plain = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| CodecError::Decrypt("bad PKCS#7 padding".into()))?;
    if plain.len() < BLOCK {
        return Err(CodecError::Decrypt(format!("plaintext of {} bytes has no room for the sub-header", plain.len())));
    }
    Ok(plain[BLOCK..].to_vec())
}

/// Decodes a length-prefixed BSON document into a JSON value with key order preserved.
pub fn document_to_value(bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    let doc = bson::Document::from_reader(&mut std::io::Cursor::new(bytes)).map_err(|e| CodecError::Document(e.to_string()))?;
    Ok(bson::Bson::Document(doc).into_relaxed_extjson())
}

/// Decodes a BSON document and re-serializes it as compact JSON text.
pub fn document_to_json(bytes: &[u8]) -> Result<String, CodecError> {
    let value = document_to_value(bytes)?;
    serde_json::to_string(&value).map_err(|e| CodecError::Document(e.to_string()))
}
