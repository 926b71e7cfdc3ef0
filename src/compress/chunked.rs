//! Chunked block compression used when producing bundle payloads.
//!
//! The payload is split into fixed-size chunks that are compressed independently (in parallel).
//! A chunk whose compressed form is not smaller than the chunk itself is stored raw and its
//! compression bits are cleared, so a single payload can mix raw and compressed blocks.

use rayon::prelude::*;

use super::{lz4, lzma, CodecError, TokenLayout};

/// Chunk size for LZ4 modes.
pub const LZ4_CHUNK_SIZE: usize = 0x0002_0000;
/// LZMA payloads are never split.
pub const LZMA_CHUNK_SIZE: usize = u32::MAX as usize;
/// Low bits of the block flags that select the codec.
pub const COMPRESSION_MASK: u16 = 0x3F;

/// Codec selected by the low six bits of a block's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCompression {
    None,
    Lzma,
    Lz4,
    Lz4Hc,
    /// Labelled LZHAM by the container format; the game client actually stores
    /// swapped-layout LZ4 under this id.
    Lzham,
}

impl BlockCompression {
    pub fn from_flags(flags: u16) -> Result<Self, CodecError> {
        match flags & COMPRESSION_MASK {
            0 => Ok(BlockCompression::None),
            1 => Ok(BlockCompression::Lzma),
            2 => Ok(BlockCompression::Lz4),
            3 => Ok(BlockCompression::Lz4Hc),
            4 => Ok(BlockCompression::Lzham),
            other => Err(CodecError::Unsupported(other as u32)),
        }
    }

    pub fn id(self) -> u16 {
        match self {
            BlockCompression::None => 0,
            BlockCompression::Lzma => 1,
            BlockCompression::Lz4 => 2,
            BlockCompression::Lz4Hc => 3,
            BlockCompression::Lzham => 4,
        }
    }
}

/// One row of the block table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub uncompressed_size: u32,
    /// Bytes this block occupies in the concatenated payload.
    pub compressed_size: u32,
    pub flags: u16,
}

impl BlockInfo {
    pub fn compression(&self) -> Result<BlockCompression, CodecError> {
        BlockCompression::from_flags(self.flags)
    }
}

fn block_size(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::corrupt(format!("block of {} bytes exceeds the 32-bit block table", len)))
}

fn compress_chunk(chunk: &[u8], compression: BlockCompression, flags: u16) -> Result<(Vec<u8>, BlockInfo), CodecError> {
    let packed = match compression {
        BlockCompression::Lzma => lzma::compress(chunk, false)?,
        BlockCompression::Lz4 | BlockCompression::Lz4Hc => lz4::compress(chunk, TokenLayout::Standard),
        BlockCompression::None => chunk.to_vec(),
        BlockCompression::Lzham => return Err(CodecError::Unsupported(compression.id() as u32)),
    };

    let uncompressed_size = block_size(chunk.len())?;
    if packed.len() >= chunk.len() {
        let info = BlockInfo { uncompressed_size, compressed_size: uncompressed_size, flags: flags & !COMPRESSION_MASK };
        return Ok((chunk.to_vec(), info));
    }
    let info = BlockInfo { uncompressed_size, compressed_size: block_size(packed.len())?, flags };
    Ok((packed, info))
}

/// Compresses `data` according to the codec in `flags` and returns the concatenated block
/// payloads together with the block table, in chunk order.
pub fn compress_blocks(data: &[u8], flags: u16) -> Result<(Vec<u8>, Vec<BlockInfo>), CodecError> {
    let compression = BlockCompression::from_flags(flags)?;
    let chunk_size = match compression {
        BlockCompression::None => {
            let size = block_size(data.len())?;
            return Ok((data.to_vec(), vec![BlockInfo { uncompressed_size: size, compressed_size: size, flags }]));
        }
        BlockCompression::Lzma => LZMA_CHUNK_SIZE,
        BlockCompression::Lz4 | BlockCompression::Lz4Hc => LZ4_CHUNK_SIZE,
        BlockCompression::Lzham => return Err(CodecError::Unsupported(compression.id() as u32)),
    };

    let blocks: Vec<(Vec<u8>, BlockInfo)> = data
        .par_chunks(chunk_size)
        .map(|chunk| compress_chunk(chunk, compression, flags))
        .collect::<Result<_, _>>()?;

    let total: usize = blocks.iter().map(|(payload, _)| payload.len()).sum();
    let mut payload = Vec::with_capacity(total);
    let mut table = Vec::with_capacity(blocks.len());
    for (bytes, info) in blocks {
        payload.extend_from_slice(&bytes);
        table.push(info);
    }
    Ok((payload, table))
}

/// Reassembles a payload produced by [`compress_blocks`] (or by the game client) from its
/// block table.
pub fn decompress_blocks(data: &[u8], blocks: &[BlockInfo]) -> Result<Vec<u8>, CodecError> {
    let total: usize = blocks.iter().map(|b| b.uncompressed_size as usize).sum();
    let mut out = Vec::with_capacity(total);
    let mut offset = 0usize;

    for (index, block) in blocks.iter().enumerate() {
        let end = offset + block.compressed_size as usize;
        let stored = data
            .get(offset..end)
            .ok_or_else(|| CodecError::corrupt(format!("block {} ends at {} past payload end {}", index, end, data.len())))?;
        let expected = block.uncompressed_size as usize;

        let decoded = match block.compression()? {
            BlockCompression::None => stored.to_vec(),
            BlockCompression::Lzma => lzma::decompress(stored, false)?,
            BlockCompression::Lz4 | BlockCompression::Lz4Hc => lz4::decompress(stored, expected, TokenLayout::Standard)?,
            BlockCompression::Lzham => lz4::decompress(stored, expected, TokenLayout::Swapped)?,
        };
        if decoded.len() != expected {
            return Err(CodecError::corrupt(format!("block {} decoded to {} bytes, table says {}", index, decoded.len(), expected)));
        }
        out.extend_from_slice(&decoded);
        offset = end;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_fallback_clears_only_compression_bits() {
        // 0x40 is the "block info at end" bit; it survives the fallback
        let noise: Vec<u8> = (0..64u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
        let (payload, table) = compress_blocks(&noise, 0x40 | 3).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].flags, 0x40);
        assert_eq!(payload, noise);
    }

    #[test]
    fn raw_mode_is_one_block() {
        let (payload, table) = compress_blocks(b"hello", 0).unwrap();
        assert_eq!(payload, b"hello");
        assert_eq!(table, vec![BlockInfo { uncompressed_size: 5, compressed_size: 5, flags: 0 }]);
    }

    #[test]
    fn lzham_mode_decodes_swapped_lz4() {
        let data = b"swapswapswapswapswapswapswapswap".to_vec();
        let packed = lz4::compress(&data, TokenLayout::Swapped);
        let table = [BlockInfo { uncompressed_size: data.len() as u32, compressed_size: packed.len() as u32, flags: 4 }];
        assert_eq!(decompress_blocks(&packed, &table).unwrap(), data);
        assert!(matches!(compress_blocks(&data, 4), Err(CodecError::Unsupported(4))));
    }

    #[test]
    fn unknown_flags_are_unsupported() {
        assert!(matches!(BlockCompression::from_flags(9), Err(CodecError::Unsupported(9))));
    }
}
