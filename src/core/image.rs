/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::core::utilities::xor_checksum;
use crate::error::{Error, Result};
use crate::fota::Variant;
use log::debug;
use sha2::{Digest, Sha256};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    range: Range<usize>,
    chunks: Vec<Range<usize>>,
}

/// A firmware image split into blocks (one patch-length write each) and
/// chunks (one patch-data write each).
///
/// For SUOTA the XOR checksum of the image is appended as a final byte, so
/// the transmitted length is one more than the file length. SPOTA sends the
/// file as is, as a single block.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    bytes: Vec<u8>,
    original_len: usize,
    crc: u8,
    variant: Variant,
    block_size: usize,
    chunk_size: usize,
    chunks_per_block: usize,
    total_chunks: usize,
    blocks: Vec<Block>,
}

impl FirmwareImage {
    pub fn new(data: Vec<u8>, variant: Variant) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Validation("firmware image is empty".into()));
        }

        let original_len = data.len();
        let crc = xor_checksum(&data);
        let mut bytes = data;
        if variant == Variant::Suota {
            bytes.push(crc);
        }

        Ok(FirmwareImage {
            bytes,
            original_len,
            crc,
            variant,
            block_size: 0,
            chunk_size: 0,
            chunks_per_block: 0,
            total_chunks: 0,
            blocks: Vec::new(),
        })
    }

    /// Rebuilds the block table. Calling it again with the same sizes
    /// yields the same table.
    pub fn slice(&mut self, block_size: usize, chunk_size: usize) -> Result<()> {
        if chunk_size == 0 {
            return Err(Error::Validation("chunk size cannot be zero".into()));
        }
        if block_size == 0 && self.variant == Variant::Suota {
            return Err(Error::Validation("block size cannot be zero".into()));
        }

        let len = self.bytes.len();
        let mut block_size = block_size.max(chunk_size);
        let mut chunk_size = chunk_size;
        if block_size > len {
            block_size = len;
            chunk_size = chunk_size.min(block_size);
        }

        self.chunk_size = chunk_size;
        self.blocks.clear();

        match self.variant {
            Variant::Suota => {
                self.block_size = block_size;
                self.chunks_per_block = block_size.div_ceil(chunk_size);
                let mut offset = 0;
                while offset < len {
                    let end = (offset + block_size).min(len);
                    self.blocks.push(Block {
                        range: offset..end,
                        chunks: split(offset..end, chunk_size),
                    });
                    offset = end;
                }
            }
            Variant::Spota => {
                self.block_size = len;
                let chunks = split(0..len, chunk_size);
                self.chunks_per_block = chunks.len();
                self.blocks.push(Block { range: 0..len, chunks });
            }
        }

        self.total_chunks = self.blocks.iter().map(|b| b.chunks.len()).sum();
        debug!(
            "Sliced {} bytes into {} blocks of {} ({} chunks of {})",
            len,
            self.blocks.len(),
            self.block_size,
            self.total_chunks,
            self.chunk_size
        );
        Ok(())
    }

    pub fn is_sliced(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Bytes as transmitted, checksum included for SUOTA.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn original_len(&self) -> usize {
        self.original_len
    }

    pub fn crc(&self) -> u8 {
        self.crc
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn number_of_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn chunks_per_block(&self) -> usize {
        self.chunks_per_block
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn block_len(&self, index: usize) -> Option<usize> {
        self.blocks.get(index).map(|b| b.range.len())
    }

    pub fn chunks_in_block(&self, index: usize) -> Option<usize> {
        self.blocks.get(index).map(|b| b.chunks.len())
    }

    /// Ordered chunks of block `index`.
    pub fn block(&self, index: usize) -> Option<Vec<&[u8]>> {
        let block = self.blocks.get(index)?;
        Some(block.chunks.iter().map(|r| &self.bytes[r.clone()]).collect())
    }

    pub fn chunk(&self, block: usize, chunk: usize) -> Option<&[u8]> {
        let range = self.blocks.get(block)?.chunks.get(chunk)?;
        Some(&self.bytes[range.clone()])
    }

    pub fn is_last_block(&self, index: usize) -> bool {
        index + 1 == self.blocks.len()
    }

    /// SHA-256 of the file contents, checksum byte excluded.
    pub fn sha256(&self) -> [u8; 32] {
        Sha256::digest(&self.bytes[..self.original_len]).into()
    }
}

fn split(range: Range<usize>, chunk_size: usize) -> Vec<Range<usize>> {
    let mut chunks = Vec::with_capacity(range.len().div_ceil(chunk_size));
    let mut start = range.start;
    while start < range.end {
        let end = (start + chunk_size).min(range.end);
        chunks.push(start..end);
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    fn concat(image: &FirmwareImage) -> Vec<u8> {
        (0..image.number_of_blocks())
            .flat_map(|i| image.block(i).unwrap())
            .flat_map(|c| c.to_vec())
            .collect()
    }

    #[test]
    fn suota_thousand_bytes_in_240_byte_blocks() {
        let mut image = FirmwareImage::new(pattern(1000), Variant::Suota).unwrap();
        image.slice(240, 20).unwrap();

        assert_eq!(image.len(), 1001);
        assert_eq!(image.number_of_blocks(), 5);
        assert_eq!(image.chunks_per_block(), 12);
        for i in 0..4 {
            assert_eq!(image.block_len(i), Some(240));
            assert_eq!(image.chunks_in_block(i), Some(12));
        }
        assert_eq!(image.block_len(4), Some(41));
        assert_eq!(image.chunks_in_block(4), Some(3));
        assert_eq!(image.block(4).unwrap().last().unwrap().len(), 1);
        assert_eq!(image.total_chunks(), 51);
        assert!(image.is_last_block(4));
        assert!(!image.is_last_block(3));
    }

    #[test]
    fn spota_hundred_bytes_is_one_block() {
        let data = pattern(100);
        let mut image = FirmwareImage::new(data.clone(), Variant::Spota).unwrap();
        image.slice(1, 20).unwrap();

        assert_eq!(image.len(), 100);
        assert_eq!(image.number_of_blocks(), 1);
        assert_eq!(image.total_chunks(), 5);
        assert_eq!(image.block_size(), 100);
        assert_eq!(concat(&image), data);
    }

    #[test]
    fn suota_chunks_reassemble_image_plus_checksum() {
        let cases = [
            (1, 240, 20),
            (19, 5, 3),
            (240, 240, 20),
            (239, 240, 20),
            (4096, 512, 244),
            (777, 100, 100),
            (50, 7, 2),
        ];
        for (len, block, chunk) in cases {
            let data = pattern(len);
            let mut image = FirmwareImage::new(data.clone(), Variant::Suota).unwrap();
            image.slice(block, chunk).unwrap();

            let bytes = concat(&image);
            assert_eq!(bytes.len(), len + 1);
            assert_eq!(&bytes[..len], &data[..]);
            assert_eq!(bytes[len], xor_checksum(&data));

            let sum: usize = (0..image.number_of_blocks())
                .map(|i| image.chunks_in_block(i).unwrap())
                .sum();
            assert_eq!(image.total_chunks(), sum);

            let last = image.number_of_blocks() - 1;
            let b = image.block_size();
            let expected = if (len + 1) % b == 0 { b } else { (len + 1) % b };
            let case = format!("len {len} block {block} chunk {chunk}");
            assert_eq!(image.block_len(last), Some(expected), "{case}");
            let last_blocks = (0..image.number_of_blocks()).filter(|&i| image.is_last_block(i));
            assert_eq!(last_blocks.count(), 1, "{case}");
        }
    }

    #[test]
    fn sizes_are_clamped_to_image() {
        let mut image = FirmwareImage::new(pattern(9), Variant::Suota).unwrap();
        image.slice(240, 20).unwrap();
        assert_eq!(image.block_size(), 10);
        assert_eq!(image.chunk_size(), 10);
        assert_eq!(image.total_chunks(), 1);

        // Block size below chunk size is raised to the chunk size
        let mut image = FirmwareImage::new(pattern(100), Variant::Suota).unwrap();
        image.slice(10, 20).unwrap();
        assert_eq!(image.block_size(), 20);
    }

    #[test]
    fn reslicing_is_idempotent_and_replaces_table() {
        let mut image = FirmwareImage::new(pattern(500), Variant::Suota).unwrap();
        image.slice(240, 20).unwrap();
        let first: Vec<Vec<u8>> = image.block(0).unwrap().iter().map(|c| c.to_vec()).collect();
        image.slice(240, 20).unwrap();
        let second: Vec<Vec<u8>> = image.block(0).unwrap().iter().map(|c| c.to_vec()).collect();
        assert_eq!(first, second);
        assert_eq!(image.total_chunks(), 26);

        image.slice(240, 120).unwrap();
        assert_eq!(image.chunks_per_block(), 2);
        assert_eq!(image.total_chunks(), 6);
    }

    #[test]
    fn rejects_empty_image_and_zero_sizes() {
        let empty = FirmwareImage::new(Vec::new(), Variant::Suota);
        assert!(matches!(empty, Err(Error::Validation(_))));
        let mut image = FirmwareImage::new(pattern(10), Variant::Suota).unwrap();
        assert!(matches!(image.slice(0, 20), Err(Error::Validation(_))));
        assert!(matches!(image.slice(240, 0), Err(Error::Validation(_))));
        assert!(!image.is_sliced());
    }

    #[test]
    fn digest_ignores_checksum_byte() {
        let data = pattern(64);
        let suota = FirmwareImage::new(data.clone(), Variant::Suota).unwrap();
        let spota = FirmwareImage::new(data, Variant::Spota).unwrap();
        assert_eq!(suota.sha256(), spota.sha256());
        assert_eq!(suota.crc(), spota.crc());
    }
}
