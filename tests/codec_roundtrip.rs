use hotsync::compress::{compress_blocks, decompress_blocks, lz4, lzma, BlockCompression, CodecError, TokenLayout};
use proptest::prelude::*;

fn sample_text(len: usize) -> Vec<u8> {
    let words = b"gamedata excel character_table item_table skill level stage ";
    words.iter().cycle().take(len).copied().collect()
}

fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed as u8
        })
        .collect()
}

#[test]
fn lz4_both_layouts_roundtrip() {
    let inputs = [Vec::new(), b"x".to_vec(), vec![b'A'; 1000], sample_text(300_000), noise(70_000, 7)];
    for layout in [TokenLayout::Standard, TokenLayout::Swapped] {
        for input in &inputs {
            let packed = lz4::compress(input, layout);
            assert!(packed.len() <= lz4::compress_bound(input.len()));
            let unpacked = lz4::decompress(&packed, input.len(), layout).unwrap();
            assert_eq!(&unpacked, input, "layout {:?}, len {}", layout, input.len());
        }
    }
}

#[test]
fn lz4_long_run_compresses() {
    let input = vec![b'A'; 1000];
    let packed = lz4::compress(&input, TokenLayout::Standard);
    assert!(packed.len() < 50, "{} bytes", packed.len());
}

#[test]
fn lz4_layouts_are_not_interchangeable() {
    let input = sample_text(4096);
    let packed = lz4::compress(&input, TokenLayout::Swapped);
    if let Ok(out) = lz4::decompress(&packed, input.len(), TokenLayout::Standard) {
        assert_ne!(out, input);
    }
}

#[test]
fn lz4_rejects_truncated_input() {
    let input = sample_text(10_000);
    let packed = lz4::compress(&input, TokenLayout::Standard);
    let truncated = &packed[..packed.len() / 2];
    match lz4::decompress(truncated, input.len(), TokenLayout::Standard) {
        Ok(out) => assert!(out.len() < input.len()),
        Err(e) => assert!(matches!(e, CodecError::CorruptStream(_))),
    }
}

#[test]
fn lzma_sized_and_unsized_roundtrip() {
    let inputs = [Vec::new(), vec![0x5a], sample_text(1_200_000), noise(20_000, 3)];
    for with_size in [true, false] {
        for input in &inputs {
            let packed = lzma::compress(input, with_size).unwrap();
            let header = if with_size { 13 } else { 5 };
            assert!(packed.len() >= header);
            assert_eq!(lzma::decompress(&packed, with_size).unwrap(), *input, "sized={with_size} len={}", input.len());
        }
    }
}

#[test]
fn lzma_header_carries_props_and_dictionary() {
    let packed = lzma::compress(b"hello hello hello", true).unwrap();
    let props = lzma::LzmaProps { lc: lzma::LC, lp: lzma::LP, pb: lzma::PB, dict_size: lzma::DICT_SIZE };
    assert_eq!(packed[0], props.props_byte());
    assert_eq!(u32::from_le_bytes(packed[1..5].try_into().unwrap()), lzma::DICT_SIZE);
    assert_eq!(u64::from_le_bytes(packed[5..13].try_into().unwrap()), 17);
}

#[test]
fn lzma_rejects_short_header() {
    assert!(lzma::decompress(&[0x5d, 0, 0], false).is_err());
    assert!(lzma::decompress(&[0x5d, 0, 0, 0x80, 0, 1, 0], true).is_err());
}

#[test]
fn block_table_invariants() {
    let data = sample_text(3 * 0x2_0000 + 17);
    for flags in [BlockCompression::Lz4.id(), BlockCompression::Lz4Hc.id(), BlockCompression::Lzma.id(), 0] {
        let (packed, blocks) = compress_blocks(&data, flags).unwrap();
        let uncompressed: u64 = blocks.iter().map(|b| b.uncompressed_size as u64).sum();
        let compressed: u64 = blocks.iter().map(|b| b.compressed_size as u64).sum();
        assert_eq!(uncompressed, data.len() as u64);
        assert_eq!(compressed, packed.len() as u64);
        for block in &blocks {
            if block.compression().unwrap() == BlockCompression::None {
                assert_eq!(block.compressed_size, block.uncompressed_size);
            } else {
                assert!(block.compressed_size < block.uncompressed_size);
            }
        }
        assert_eq!(decompress_blocks(&packed, &blocks).unwrap(), data);
    }
}

#[test]
fn lz4_blocks_split_at_chunk_size() {
    let data = sample_text(0x2_0000 * 2 + 1);
    let (_, blocks) = compress_blocks(&data, BlockCompression::Lz4.id()).unwrap();
    let sizes: Vec<u32> = blocks.iter().map(|b| b.uncompressed_size).collect();
    assert_eq!(sizes, vec![0x2_0000, 0x2_0000, 1]);
}

#[test]
fn incompressible_blocks_are_stored_raw() {
    let data = noise(0x2_0000, 11);
    let (packed, blocks) = compress_blocks(&data, BlockCompression::Lz4.id() | 0x40).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].compression().unwrap(), BlockCompression::None);
    assert_eq!(blocks[0].flags, 0x40);
    assert_eq!(packed, data);
}

#[test]
fn lzham_is_not_encodable() {
    assert!(matches!(compress_blocks(b"abc", BlockCompression::Lzham.id()), Err(CodecError::Unsupported(4))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lz4_roundtrips_arbitrary_bytes(data in proptest::collection::vec(0u8..8, 0..4096), swapped in any::<bool>()) {
        let layout = if swapped { TokenLayout::Swapped } else { TokenLayout::Standard };
        let packed = lz4::compress(&data, layout);
        prop_assert_eq!(lz4::decompress(&packed, data.len(), layout).unwrap(), data);
    }
}
