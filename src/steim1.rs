use crate::mseed_error::MSeedError;
use crate::steim_frame_block::{integrate, read_frames};

/**
 * Decoding of Steim-1 compressed data blocks into integer samples.
 *
 * Steim compression scheme Copyrighted by Dr. Joseph Steim.
 *
 * Reference material found in Appendix B of SEED Reference Manual, 2nd Ed.,
 * pp. 119-125, Federation of Digital Seismic Networks, et al. February, 1993
 */

/// Decode `num_samples` samples from Steim-1 frames.
pub fn decode(b: &[u8], num_samples: u32) -> Result<Vec<i32>, MSeedError> {
    let frames = read_frames(b)?;
    integrate(&frames, num_samples, extract_differences)
}

/// Differences held in one data word:
/// 1 means 4 one byte differences, 2 means 2 two byte differences,
/// 3 means 1 four byte difference.
fn extract_differences(nibble: u32, word: u32) -> Result<Vec<i32>, MSeedError> {
    let bytes = word.to_be_bytes();
    match nibble {
        1 => Ok(bytes.iter().map(|b| *b as i8 as i32).collect()),
        2 => Ok(vec![
            i16::from_be_bytes([bytes[0], bytes[1]]) as i32,
            i16::from_be_bytes([bytes[2], bytes[3]]) as i32,
        ]),
        3 => Ok(vec![word as i32]),
        _ => Err(MSeedError::Compression(format!(
            "invalid Steim-1 nibble {}",
            nibble
        ))),
    }
}
