use crate::mseed_error::MSeedError;
use crate::steim_frame_block::{integrate, read_frames, SteimFrame, SteimFrameBlock, XN_WORD};

/**
 * Encoding and decoding of Steim-2 compressed data blocks.
 *
 * Steim compression scheme Copyrighted by Dr. Joseph Steim.
 *
 * Each data word carries a 2-bit nibble in word 0 of its frame. Nibble 1 is four
 * 8-bit differences. Nibbles 2 and 3 use the top two bits of the data word (dnib)
 * to select the packing:
 * ```text
 * nibble dnib  differences
 *   2     01   1 x 30 bit
 *   2     10   2 x 15 bit
 *   2     11   3 x 10 bit
 *   3     00   5 x 6 bit
 *   3     01   6 x 5 bit
 *   3     10   7 x 4 bit
 * ```
 */

/// Word layouts, tried from densest to sparsest: (count, bits, nibble, dnib).
const PACKINGS: [(usize, u32, u32, u32); 7] = [
    (7, 4, 3, 2),
    (6, 5, 3, 1),
    (5, 6, 3, 0),
    (4, 8, 1, 0),
    (3, 10, 2, 3),
    (2, 15, 2, 2),
    (1, 30, 2, 1),
];

/// Decode `num_samples` samples from Steim-2 frames.
pub fn decode(b: &[u8], num_samples: u32) -> Result<Vec<i32>, MSeedError> {
    let frames = read_frames(b)?;
    integrate(&frames, num_samples, extract_differences)
}

fn extract_differences(nibble: u32, word: u32) -> Result<Vec<i32>, MSeedError> {
    let dnib = word >> 30;
    let (count, bits) = match (nibble, dnib) {
        (1, _) => {
            return Ok(word.to_be_bytes().iter().map(|b| *b as i8 as i32).collect());
        }
        (2, 1) => (1, 30),
        (2, 2) => (2, 15),
        (2, 3) => (3, 10),
        (3, 0) => (5, 6),
        (3, 1) => (6, 5),
        (3, 2) => (7, 4),
        _ => {
            return Err(MSeedError::Compression(format!(
                "invalid Steim-2 nibble {} with dnib {}",
                nibble, dnib
            )))
        }
    };
    Ok((0..count)
        .map(|i| {
            let shift = bits * (count - 1 - i) as u32;
            sign_extend((word >> shift) & mask(bits), bits)
        })
        .collect())
}

/// Encode samples into at most `frames` Steim-2 frames, 0 for unlimited. The returned
/// block records how many leading samples fit. `previous` is the sample preceding
/// `samples[0]` when continuing a series; the first difference is relative to it, or
/// zero when there is none.
pub fn encode(
    samples: &[i32],
    frames: usize,
    previous: Option<i32>,
) -> Result<SteimFrameBlock, MSeedError> {
    if samples.is_empty() {
        return Err(MSeedError::Compression(String::from(
            "samples array is zero size",
        )));
    }
    let max_frames = if frames == 0 { usize::MAX } else { frames };

    let mut prev = previous.unwrap_or(samples[0]) as i64;
    let diffs: Vec<i64> = samples
        .iter()
        .map(|&x| {
            let d = x as i64 - prev;
            prev = x as i64;
            d
        })
        .collect();

    let mut frame_block = SteimFrameBlock::new(2);
    let mut frame = SteimFrame::new();
    // first frame holds X(0) and X(N) in words 1 and 2
    let mut word_idx = XN_WORD + 1;
    let mut pos = 0;
    while pos < diffs.len() {
        if word_idx > 15 {
            frame_block
                .steim_frame
                .push(std::mem::replace(&mut frame, SteimFrame::new()));
            word_idx = 1;
            if frame_block.steim_frame.len() == max_frames {
                break;
            }
        }
        let (word, nibble, count) = pack_word(&diffs[pos..])?;
        frame.set_word(word, nibble, word_idx);
        word_idx += 1;
        pos += count;
    }
    if word_idx > 1 {
        frame_block.steim_frame.push(frame);
    }

    frame_block.num_samples = pos;
    frame_block.forward_integration_constant(samples[0]);
    frame_block.reverse_integration_constant(samples[pos - 1]);
    Ok(frame_block)
}

/// Packs as many leading differences as possible into one word.
fn pack_word(diffs: &[i64]) -> Result<(u32, u32, usize), MSeedError> {
    for &(count, bits, nibble, dnib) in PACKINGS.iter() {
        if diffs.len() < count || !diffs[..count].iter().all(|d| fits(*d, bits)) {
            continue;
        }
        let word = if nibble == 1 {
            u32::from_be_bytes([
                diffs[0] as i8 as u8,
                diffs[1] as i8 as u8,
                diffs[2] as i8 as u8,
                diffs[3] as i8 as u8,
            ])
        } else {
            diffs[..count]
                .iter()
                .enumerate()
                .fold(dnib << 30, |w, (i, d)| {
                    w | ((*d as u32 & mask(bits)) << (bits * (count - 1 - i) as u32))
                })
        };
        return Ok((word, nibble, count));
    }
    Err(MSeedError::Compression(format!(
        "difference {} cannot be represented in 30 bits",
        diffs[0]
    )))
}

fn fits(v: i64, bits: u32) -> bool {
    let half = 1i64 << (bits - 1);
    -half <= v && v < half
}

fn mask(bits: u32) -> u32 {
    (1u32 << bits) - 1
}

fn sign_extend(v: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((v << shift) as i32) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steim_frame_block::FRAME_SIZE;

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0b1111, 4), -1);
        assert_eq!(sign_extend(0b0111, 4), 7);
        assert_eq!(sign_extend(0x2000_0000, 30), -(1 << 29));
        assert_eq!(sign_extend(0x1fff_ffff, 30), (1 << 29) - 1);
    }

    #[test]
    fn densest_packing_chosen() -> Result<(), MSeedError> {
        let (_, nibble, count) = pack_word(&[1, -2, 3, -4, 5, -6, 7, 100])?;
        assert_eq!((nibble, count), (3, 7));
        let (_, nibble, count) = pack_word(&[100, -100, 3, 4])?;
        assert_eq!((nibble, count), (1, 4));
        let (word, nibble, count) = pack_word(&[-300, 511, 12])?;
        assert_eq!((nibble, count), (2, 3));
        assert_eq!(extract_differences(nibble, word)?, vec![-300, 511, 12]);
        let (_, nibble, count) = pack_word(&[1 << 20])?;
        assert_eq!((nibble, count), (2, 1));
        assert!(pack_word(&[1 << 29]).is_err());
        Ok(())
    }

    #[test]
    fn data_round_trip() -> Result<(), MSeedError> {
        let data = [1, -1, -1, -1, 200, -300, 16000, -18000, 20000, -40000, 3, 3, 3];
        let frame_block = encode(&data, 0, None)?;
        assert_eq!(data.len(), frame_block.num_samples);
        assert_eq!(frame_block.steim_frame.len(), 1);
        let enc_bytes = frame_block.get_encoded_data()?;
        assert_eq!(enc_bytes[4..8], [0, 0, 0, 1]);
        assert_eq!(enc_bytes[8..12], [0, 0, 0, 3]);
        let rt_data = decode(&enc_bytes, frame_block.num_samples as u32)?;
        assert_eq!(rt_data, data);
        Ok(())
    }

    #[test]
    fn frame_limit_truncates() -> Result<(), MSeedError> {
        // large alternating steps need one word per sample
        let data: Vec<i32> = (0..100).map(|i| if i % 2 == 0 { 0 } else { 1 << 20 }).collect();
        let frame_block = encode(&data, 2, None)?;
        assert_eq!(frame_block.steim_frame.len(), 2);
        // 13 data words in the first frame, 15 in the second
        assert_eq!(frame_block.num_samples, 28);
        let enc_bytes = frame_block.get_encoded_data()?;
        assert_eq!(enc_bytes.len(), 2 * FRAME_SIZE);
        assert_eq!(decode(&enc_bytes, 28)?, data[..28]);
        Ok(())
    }

    #[test]
    fn continuation_keeps_first_difference() -> Result<(), MSeedError> {
        let data = [10, 12, 14];
        let frame_block = encode(&data, 1, Some(8))?;
        let frames = read_frames(&frame_block.get_encoded_data()?)?;
        let first_word = frames[0].word(XN_WORD + 1);
        assert_eq!(extract_differences(frames[0].nibble(XN_WORD + 1), first_word)?[0], 2);
        assert_eq!(decode(&frame_block.get_encoded_data()?, 3)?, data);
        Ok(())
    }

    #[test]
    fn extremes_round_trip() -> Result<(), MSeedError> {
        let data = [i32::MAX, i32::MAX - 5, i32::MAX, (1 << 29) + i32::MAX / 2];
        let frame_block = encode(&data, 0, None)?;
        assert_eq!(decode(&frame_block.get_encoded_data()?, 4)?, data);
        assert!(encode(&[0, i32::MAX], 0, None).is_err());
        assert!(encode(&[], 0, None).is_err());
        Ok(())
    }
}
