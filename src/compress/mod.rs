//! # Codec Library
//!
//! Stateless codecs for the compact binary encodings found inside asset bundles.
//!
//! ## Key Features:
//! - **LZ4 family**: A block decompressor/compressor with two token layouts. The
//!   [`TokenLayout::Standard`] layout is plain LZ4; [`TokenLayout::Swapped`] flips the nibbles of
//!   every token and stores back-reference distances big-endian.
//! - **LZMA**: Raw LZMA1 streams behind a 5-byte (or 13-byte) properties header.
//! - **Chunked blocks**: Splits a payload into independently compressed blocks and returns the
//!   block table a reader needs to reassemble it.

use thiserror::Error;

pub mod chunked;
pub mod lz4;
pub mod lzma;

pub use chunked::{compress_blocks, decompress_blocks, BlockCompression, BlockInfo};
pub use lz4::TokenLayout;

/// Errors raised by the codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input ended early or contradicts its own framing.
    #[error("{0}")]
    CorruptStream(String),

    /// liblzma rejected the options or the payload.
    #[error("lzma: {0}")]
    Lzma(#[from] liblzma::stream::Error),

    /// The block flags select a codec this library does not implement.
    #[error("unsupported block compression {0:#x}")]
    Unsupported(u32),

    /// AES-CBC decryption or unpadding failed.
    #[error("decrypt: {0}")]
    Decrypt(String),

    /// The decrypted payload is not a readable binary document.
    #[error("document: {0}")]
    Document(String),
}

impl CodecError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        CodecError::CorruptStream(msg.into())
    }
}
