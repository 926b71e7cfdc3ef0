//! LZ4 block codec with selectable token layout.
//!
//! A block is a sequence of `token, [literal length ext], literals, distance, [match length ext]`
//! records; the final record carries literals only. Both layouts share the length extension
//! scheme (a nibble of 15 is followed by bytes that are summed until one is below 255).

use super::CodecError;

/// Minimum match length. Encoded match lengths are stored minus this value.
pub const MIN_MATCH: usize = 4;

const MF_LIMIT: usize = 12;
const LAST_LITERALS: usize = 5;
const MAX_DISTANCE: usize = 0xFFFF;
const HASH_LOG: u32 = 16;

/// Which nibble of a token holds which length, and the byte order of match distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLayout {
    /// Literal length in the high nibble, match length in the low nibble, distance little-endian.
    Standard,
    /// Match length in the high nibble, literal length in the low nibble, distance big-endian.
    Swapped,
}

impl TokenLayout {
    /// Returns `(literal_nibble, match_nibble)`.
    #[inline]
    fn split(self, token: u8) -> (usize, usize) {
        let high = (token >> 4) as usize;
        let low = (token & 0x0F) as usize;
        match self {
            TokenLayout::Standard => (high, low),
            TokenLayout::Swapped => (low, high),
        }
    }

    #[inline]
    fn pack(self, literal: usize, matched: usize) -> u8 {
        let (literal, matched) = (literal.min(15) as u8, matched.min(15) as u8);
        match self {
            TokenLayout::Standard => (literal << 4) | matched,
            TokenLayout::Swapped => (matched << 4) | literal,
        }
    }

    #[inline]
    fn read_distance(self, first: u8, second: u8) -> usize {
        match self {
            TokenLayout::Standard => u16::from_le_bytes([first, second]) as usize,
            TokenLayout::Swapped => u16::from_be_bytes([first, second]) as usize,
        }
    }

    #[inline]
    fn distance_bytes(self, distance: u16) -> [u8; 2] {
        match self {
            TokenLayout::Standard => distance.to_le_bytes(),
            TokenLayout::Swapped => distance.to_be_bytes(),
        }
    }
}

fn read_length(src: &[u8], pos: &mut usize, nibble: usize) -> Result<usize, CodecError> {
    let mut length = nibble;
    if nibble == 15 {
        loop {
            let extra = *src.get(*pos).ok_or_else(|| CodecError::corrupt("lz4: length extension runs past end of input"))?;
            *pos += 1;
            length += extra as usize;
            if extra != 0xFF {
                break;
            }
        }
    }
    Ok(length)
}

/// Decompresses one LZ4 block into at most `decompressed_size` bytes.
///
/// Stops when the input is exhausted or the output is full; the result is truncated to the
/// bytes actually produced. A literal run or match that would overrun either the input or the
/// declared output size, or a distance pointing before the start of output, is a
/// [`CodecError::CorruptStream`].
pub fn decompress(src: &[u8], decompressed_size: usize, layout: TokenLayout) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![0u8; decompressed_size];
    let mut ip = 0usize;
    let mut op = 0usize;

    while ip < src.len() && op < decompressed_size {
        let (literal_nibble, match_nibble) = layout.split(src[ip]);
        ip += 1;

        let literal_len = read_length(src, &mut ip, literal_nibble)?;
        let literal_end = ip
            .checked_add(literal_len)
            .filter(|end| *end <= src.len())
            .ok_or_else(|| CodecError::corrupt("lz4: literal run overruns input"))?;
        if op + literal_len > decompressed_size {
            return Err(CodecError::corrupt("lz4: literal run overruns declared output size"));
        }
        out[op..op + literal_len].copy_from_slice(&src[ip..literal_end]);
        ip = literal_end;
        op += literal_len;

        if ip >= src.len() || op >= decompressed_size {
            break;
        }

        if ip + 2 > src.len() {
            return Err(CodecError::corrupt("lz4: truncated match distance"));
        }
        let distance = layout.read_distance(src[ip], src[ip + 1]);
        ip += 2;
        let match_len = read_length(src, &mut ip, match_nibble)? + MIN_MATCH;

        if distance == 0 || distance > op {
            return Err(CodecError::corrupt(format!("lz4: match distance {} outside produced output ({} bytes)", distance, op)));
        }
        if op + match_len > decompressed_size {
            return Err(CodecError::corrupt("lz4: match overruns declared output size"));
        }

        let start = op - distance;
        if match_len <= distance {
            out.copy_within(start..start + match_len, op);
        } else {
            // Overlapping copy: each byte may depend on one written earlier in this match.
            for i in 0..match_len {
                out[op + i] = out[start + i];
            }
        }
        op += match_len;
    }

    out.truncate(op);
    Ok(out)
}

#[inline]
fn read_u32(src: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([src[pos], src[pos + 1], src[pos + 2], src[pos + 3]])
}

#[inline]
fn hash(sequence: u32) -> usize {
    (sequence.wrapping_mul(2_654_435_761) >> (32 - HASH_LOG)) as usize
}

fn write_length(out: &mut Vec<u8>, mut remaining: usize) {
    while remaining >= 0xFF {
        out.push(0xFF);
        remaining -= 0xFF;
    }
    out.push(remaining as u8);
}

fn emit_sequence(out: &mut Vec<u8>, literals: &[u8], distance: usize, match_len: usize, layout: TokenLayout) {
    let encoded_match = match_len - MIN_MATCH;
    out.push(layout.pack(literals.len(), encoded_match));
    if literals.len() >= 15 {
        write_length(out, literals.len() - 15);
    }
    out.extend_from_slice(literals);
    out.extend_from_slice(&layout.distance_bytes(distance as u16));
    if encoded_match >= 15 {
        write_length(out, encoded_match - 15);
    }
}

fn emit_last_literals(out: &mut Vec<u8>, literals: &[u8], layout: TokenLayout) {
    out.push(layout.pack(literals.len(), 0));
    if literals.len() >= 15 {
        write_length(out, literals.len() - 15);
    }
    out.extend_from_slice(literals);
}

/// Worst-case compressed size for `len` input bytes.
pub fn compress_bound(len: usize) -> usize {
    len + len / 255 + 16
}

/// Compresses `src` as a single LZ4 block using greedy hash matching.
///
/// The output respects the usual block end conditions (last five bytes are literals, no match
/// starts in the final twelve) so standard-layout blocks are readable by any LZ4 decoder.
pub fn compress(src: &[u8], layout: TokenLayout) -> Vec<u8> {
    let mut out = Vec::with_capacity(compress_bound(src.len()));
    if src.len() <= MF_LIMIT {
        emit_last_literals(&mut out, src, layout);
        return out;
    }

    let mut table = vec![usize::MAX; 1 << HASH_LOG];
    let match_limit = src.len() - LAST_LITERALS;
    let search_end = src.len() - MF_LIMIT;
    let mut anchor = 0usize;
    let mut pos = 0usize;

    while pos <= search_end {
        let sequence = read_u32(src, pos);
        let slot = hash(sequence);
        let candidate = table[slot];
        table[slot] = pos;

        if candidate == usize::MAX || pos - candidate > MAX_DISTANCE || read_u32(src, candidate) != sequence {
            pos += 1;
            continue;
        }

        let mut len = MIN_MATCH;
        while pos + len < match_limit && src[candidate + len] == src[pos + len] {
            len += 1;
        }

        let (mut start, mut back) = (pos, candidate);
        while start > anchor && back > 0 && src[start - 1] == src[back - 1] {
            start -= 1;
            back -= 1;
            len += 1;
        }

        emit_sequence(&mut out, &src[anchor..start], start - back, len, layout);
        pos = start + len;
        anchor = pos;

        if pos >= 2 && pos - 2 <= search_end {
            table[hash(read_u32(src, pos - 2))] = pos - 2;
        }
    }

    emit_last_literals(&mut out, &src[anchor..], layout);
    out
}
