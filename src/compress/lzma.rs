//! Raw LZMA1 streams with a fixed properties header.
//!
//! Layout: `[props: u8][dict_size: u32 LE]` optionally followed by `[uncompressed_size: u64 LE]`,
//! then a headerless LZMA1 payload. The size field is skipped on read, never validated.

use liblzma::stream::{Action, Filters, LzmaOptions, MatchFinder, Mode, Status, Stream};

use super::CodecError;

/// Dictionary size written by [`compress`].
pub const DICT_SIZE: u32 = 0x80_0000;
/// Literal context bits written by [`compress`].
pub const LC: u32 = 3;
/// Literal position bits written by [`compress`].
pub const LP: u32 = 0;
/// Position bits written by [`compress`].
pub const PB: u32 = 2;
pub const NICE_LEN: u32 = 123;

const HEADER_LEN: usize = 5;
const SIZED_HEADER_LEN: usize = 13;
const OUT_CHUNK: usize = 64 * 1024;

/// The `(lc, lp, pb)` triple and dictionary size carried in the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProps {
    pub lc: u32,
    pub lp: u32,
    pub pb: u32,
    pub dict_size: u32,
}

impl LzmaProps {
    /// Decodes the properties byte: `lc = p % 9`, `lp = (p / 9) % 5`, `pb = (p / 9) / 5`.
    pub fn from_header(props: u8, dict_size: u32) -> Result<Self, CodecError> {
        if props >= 9 * 5 * 5 {
            return Err(CodecError::corrupt(format!("lzma: invalid properties byte {:#04x}", props)));
        }
        let props = props as u32;
        let remainder = props / 9;
        Ok(Self { lc: props % 9, lp: remainder % 5, pb: remainder / 5, dict_size })
    }

    pub fn props_byte(&self) -> u8 {
        ((self.pb * 5 + self.lp) * 9 + self.lc) as u8
    }

    fn encoder_defaults() -> Self {
        Self { lc: LC, lp: LP, pb: PB, dict_size: DICT_SIZE }
    }

    fn filters(&self, encoder: bool) -> Result<Filters, CodecError> {
        let mut options = LzmaOptions::new_preset(6)?;
        options
            .dict_size(self.dict_size)
            .literal_context_bits(self.lc)
            .literal_position_bits(self.lp)
            .position_bits(self.pb);
        if encoder {
            options.mode(Mode::Normal).match_finder(MatchFinder::BinaryTree4).nice_len(NICE_LEN);
        }
        let mut filters = Filters::new();
        filters.lzma1(&options);
        Ok(filters)
    }
}

/// Decompresses a header-prefixed raw LZMA1 stream.
///
/// `read_decompressed_size` selects the 13-byte header variant. A payload without an
/// end-of-stream marker decodes to everything the available input yields.
pub fn decompress(data: &[u8], read_decompressed_size: bool) -> Result<Vec<u8>, CodecError> {
    let header_len = if read_decompressed_size { SIZED_HEADER_LEN } else { HEADER_LEN };
    if data.len() < header_len {
        return Err(CodecError::corrupt(format!("lzma: {} bytes is shorter than the {}-byte header", data.len(), header_len)));
    }
    let dict_size = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
    let props = LzmaProps::from_header(data[0], dict_size)?;
    let payload = &data[header_len..];

    let mut stream = Stream::new_raw_decoder(&props.filters(false)?)?;
    let mut out = Vec::with_capacity(payload.len().saturating_mul(2).clamp(OUT_CHUNK, 64 * OUT_CHUNK));
    let mut consumed = 0usize;

    loop {
        if out.len() == out.capacity() {
            out.reserve(OUT_CHUNK);
        }
        let (before_in, before_out) = (stream.total_in(), stream.total_out());
        let status = stream
            .process_vec(&payload[consumed..], &mut out, Action::Run)
            .map_err(|e| CodecError::corrupt(format!("lzma: {}", e)))?;
        consumed += (stream.total_in() - before_in) as usize;

        if status == Status::StreamEnd {
            break;
        }
        if stream.total_in() == before_in && stream.total_out() == before_out {
            // input drained and nothing left to flush
            break;
        }
    }

    Ok(out)
}

/// Compresses `data` with the fixed encoder policy (`dict 0x800000, lc 3, lp 0, pb 2`, normal
/// mode, BT4 match finder, `nice_len 123`) and prepends the header.
pub fn compress(data: &[u8], write_decompressed_size: bool) -> Result<Vec<u8>, CodecError> {
    let props = LzmaProps::encoder_defaults();
    let mut stream = Stream::new_raw_encoder(&props.filters(true)?)?;

    let header_len = if write_decompressed_size { SIZED_HEADER_LEN } else { HEADER_LEN };
    let mut out = Vec::with_capacity(header_len + data.len() / 2 + OUT_CHUNK);
    out.push(props.props_byte());
    out.extend_from_slice(&props.dict_size.to_le_bytes());
    if write_decompressed_size {
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    }

    let mut consumed = 0usize;
    loop {
        if out.len() == out.capacity() {
            out.reserve(OUT_CHUNK);
        }
        let action = if consumed < data.len() { Action::Run } else { Action::Finish };
        let before_in = stream.total_in();
        let status = stream.process_vec(&data[consumed..], &mut out, action)?;
        consumed += (stream.total_in() - before_in) as usize;
        if status == Status::StreamEnd {
            break;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_props_byte_is_0x5d() {
        assert_eq!(LzmaProps::encoder_defaults().props_byte(), 0x5D);
        let props = LzmaProps::from_header(0x5D, DICT_SIZE).unwrap();
        assert_eq!((props.lc, props.lp, props.pb), (3, 0, 2));
    }

    #[test]
    fn header_layout() {
        let packed = compress(b"abc", true).unwrap();
        assert_eq!(packed[0], 0x5D);
        assert_eq!(&packed[1..5], &DICT_SIZE.to_le_bytes());
        assert_eq!(&packed[5..13], &3u64.to_le_bytes());
    }

    #[test]
    fn rejects_short_header_and_bad_props() {
        assert!(decompress(&[0x5D, 0, 0], false).is_err());
        assert!(decompress(&[0x5D, 0, 0, 0x80, 0, 0, 0, 0], true).is_err());
        assert!(decompress(&[0xFF, 0, 0, 0x80, 0], false).is_err());
    }
}
