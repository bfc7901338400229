use crate::MSeedError;

use std::convert::TryInto;
use std::io::prelude::*;

/// Size in bytes of one Steim frame, sixteen 32 bit words.
pub const FRAME_SIZE: usize = 64;

/// Index of the forward integration constant X(0), only in the first frame.
pub const X0_WORD: usize = 1;
/// Index of the reverse integration constant X(N), only in the first frame.
pub const XN_WORD: usize = 2;

/**
 * A single Steim compression frame. Word 0 holds the 2-bit nibbles describing
 * words 1 to 15, which hold the packed differences.
 */
#[derive(Debug, Clone, Default)]
pub struct SteimFrame {
    nibbles: u32,
    words: [u32; 15],
}

impl SteimFrame {
    pub fn new() -> SteimFrame {
        SteimFrame::default()
    }

    /// Reads a frame from exactly 64 big endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> SteimFrame {
        let mut frame = SteimFrame::new();
        frame.nibbles = be_word(bytes, 0);
        for idx in 1..16 {
            frame.words[idx - 1] = be_word(bytes, idx);
        }
        frame
    }

    pub fn is_empty(&self) -> bool {
        self.nibbles == 0 && self.words.iter().all(|w| *w == 0)
    }

    /// Sets word `idx`, 1 to 15, and its nibble.
    pub fn set_word(&mut self, word: u32, nibble: u32, idx: usize) {
        assert!((1..16).contains(&idx), "word idx must be 1..16, {}", idx);
        self.words[idx - 1] = word;
        let shift = 30 - 2 * idx as u32;
        self.nibbles = (self.nibbles & !(0x03 << shift)) | ((nibble & 0x03) << shift);
    }

    pub fn word(&self, idx: usize) -> u32 {
        self.words[idx - 1]
    }

    pub fn nibble(&self, idx: usize) -> u32 {
        (self.nibbles >> (30 - 2 * idx as u32)) & 0x03
    }
}

fn be_word(bytes: &[u8], idx: usize) -> u32 {
    u32::from_be_bytes(bytes[idx * 4..idx * 4 + 4].try_into().unwrap())
}

/**
 * Container for the frames produced by a Steim compression routine along with
 * the number of samples they represent.
 */
pub struct SteimFrameBlock {
    pub num_samples: usize,
    pub steim_version: usize,
    pub steim_frame: Vec<SteimFrame>,
}

impl SteimFrameBlock {
    pub fn new(steim_version: usize) -> SteimFrameBlock {
        SteimFrameBlock {
            steim_version,
            num_samples: 0,
            steim_frame: Vec::new(),
        }
    }

    /// Compressed bytes for inclusion in a data record.
    pub fn get_encoded_data(&self) -> Result<Vec<u8>, MSeedError> {
        let mut encoded_data = Vec::with_capacity(self.steim_frame.len() * FRAME_SIZE);
        for f in &self.steim_frame {
            encoded_data.write_all(&f.nibbles.to_be_bytes())?;
            for w in f.words {
                encoded_data.write_all(&w.to_be_bytes())?;
            }
        }
        Ok(encoded_data)
    }

    /// Sets the forward integration constant X(0), the first sample.
    pub fn forward_integration_constant(&mut self, v: i32) {
        assert_ne!(self.steim_frame.len(), 0);
        self.steim_frame[0].set_word(v as u32, 0, X0_WORD);
    }

    /// Sets the reverse integration constant X(N), the last sample.
    pub fn reverse_integration_constant(&mut self, v: i32) {
        assert_ne!(self.steim_frame.len(), 0);
        self.steim_frame[0].set_word(v as u32, 0, XN_WORD);
    }
}

/// Steim-2 packs at most seven differences in one data word, Steim-1 four.
const MAX_DIFFERENCES_PER_WORD: usize = 7;

/// Splits encoded bytes into frames.
pub fn read_frames(b: &[u8]) -> Result<Vec<SteimFrame>, MSeedError> {
    if b.len() % FRAME_SIZE != 0 {
        return Err(MSeedError::Compression(format!(
            "encoded data length is not multiple of 64 bytes ({})",
            b.len()
        )));
    }
    Ok(b.chunks_exact(FRAME_SIZE).map(SteimFrame::from_bytes).collect())
}

/// Rebuilds samples from Steim frames. `extract` returns the differences packed in one
/// data word. The first difference is relative to a sample outside this record and is
/// skipped in favour of X(0); the result is checked against X(N).
pub fn integrate<F>(frames: &[SteimFrame], num_samples: u32, extract: F) -> Result<Vec<i32>, MSeedError>
where
    F: Fn(u32, u32) -> Result<Vec<i32>, MSeedError>,
{
    let nsamp = num_samples as usize;
    if nsamp == 0 {
        return Ok(Vec::new());
    }
    let first = match frames.first() {
        Some(f) => f,
        None => {
            return Err(MSeedError::Compression(format!(
                "no frames to decode {} samples from",
                nsamp
            )))
        }
    };
    let capacity = frames.len() * (16 - 1) * MAX_DIFFERENCES_PER_WORD;
    if nsamp > capacity {
        return Err(MSeedError::Compression(format!(
            "header claims {} samples but {} frames hold at most {}",
            nsamp,
            frames.len(),
            capacity
        )));
    }
    let start = first.word(X0_WORD) as i32;
    let end = first.word(XN_WORD) as i32;

    let mut diffs = Vec::with_capacity(nsamp);
    'frames: for (frame_idx, frame) in frames.iter().enumerate() {
        let first_word = if frame_idx == 0 { XN_WORD + 1 } else { 1 };
        for idx in first_word..16 {
            let nibble = frame.nibble(idx);
            if nibble == 0 {
                continue;
            }
            diffs.extend(extract(nibble, frame.word(idx))?);
            if diffs.len() >= nsamp {
                break 'frames;
            }
        }
    }
    if diffs.len() < nsamp {
        return Err(MSeedError::Compression(format!(
            "Number of samples decompressed doesn't match number in header: decomp: {} != {}, header",
            diffs.len(),
            nsamp
        )));
    }

    let mut samples = Vec::with_capacity(nsamp);
    let mut last_value = start;
    samples.push(start);
    for d in &diffs[1..nsamp] {
        last_value = last_value.wrapping_add(*d);
        samples.push(last_value);
    }
    if last_value != end {
        return Err(MSeedError::Compression(format!(
            "last sample {} does not match reverse integration constant {}",
            last_value, end
        )));
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_constants() -> Result<(), MSeedError> {
        let mut frame_block = SteimFrameBlock::new(2);
        frame_block.steim_frame.push(SteimFrame::new());
        frame_block.forward_integration_constant(-2);
        frame_block.reverse_integration_constant(1);
        let enc_data = frame_block.get_encoded_data()?;
        assert_eq!(enc_data.len(), FRAME_SIZE);
        assert_eq!(enc_data[0..4], [0, 0, 0, 0]);
        assert_eq!(enc_data[4..8], [0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(enc_data[8..12], [0, 0, 0, 1]);
        Ok(())
    }

    #[test]
    fn sample_count_bounded_by_frames() {
        let frames = vec![SteimFrame::new()];
        let result = integrate(&frames, u32::MAX, |_, _| Ok(vec![0; 7]));
        assert!(matches!(result, Err(MSeedError::Compression(_))));
    }

    #[test]
    fn nibbles_by_word() {
        let mut frame = SteimFrame::new();
        frame.set_word(7, 1, 3);
        frame.set_word(9, 3, 15);
        assert_eq!(frame.nibble(3), 1);
        assert_eq!(frame.nibble(15), 3);
        assert_eq!(frame.nibble(4), 0);
        frame.set_word(9, 2, 15);
        assert_eq!(frame.nibble(15), 2);
        assert_eq!(frame.word(3), 7);
    }

    #[test]
    fn frame_bytes_round_trip() -> Result<(), MSeedError> {
        let mut block = SteimFrameBlock::new(2);
        let mut frame = SteimFrame::new();
        frame.set_word(0x01020304, 1, 5);
        block.steim_frame.push(frame);
        let bytes = block.get_encoded_data()?;
        let frames = read_frames(&bytes)?;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].word(5), 0x01020304);
        assert_eq!(frames[0].nibble(5), 1);
        assert!(read_frames(&bytes[0..63]).is_err());
        Ok(())
    }
}
