use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fmt;
use std::fmt::Formatter;
use std::io::prelude::*;
use std::io::BufWriter;

use crate::data_encoding::DataEncoding;
use crate::mseed_error::MSeedError;
use crate::{steim1, steim2};

/// Broad type of the samples in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Integer,
    Float,
    /// Text, opaque, or not yet decompressed.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EncodedTimeseries {
    Raw(Vec<u8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Steim1(Vec<u8>),
    Steim2(Vec<u8>),
    Steim3(Vec<u8>),
    Opaque(Vec<u8>),
}

impl EncodedTimeseries {
    pub fn write_to<W>(&self, buf: &mut BufWriter<W>) -> Result<(), MSeedError>
    where
        W: std::io::Write,
    {
        match self {
            EncodedTimeseries::Raw(v)
            | EncodedTimeseries::Steim1(v)
            | EncodedTimeseries::Steim2(v)
            | EncodedTimeseries::Steim3(v)
            | EncodedTimeseries::Opaque(v) => buf.write_all(v)?,
            EncodedTimeseries::Int16(v) => {
                for &el in v {
                    buf.write_i16::<LittleEndian>(el)?;
                }
            }
            EncodedTimeseries::Int32(v) => {
                for &el in v {
                    buf.write_i32::<LittleEndian>(el)?;
                }
            }
            EncodedTimeseries::Float32(v) => {
                for &el in v {
                    buf.write_f32::<LittleEndian>(el)?;
                }
            }
            EncodedTimeseries::Float64(v) => {
                for &el in v {
                    buf.write_f64::<LittleEndian>(el)?;
                }
            }
        }
        Ok(())
    }

    pub fn byte_len(&self) -> u32 {
        match self {
            EncodedTimeseries::Raw(v) => v.len() as u32,
            EncodedTimeseries::Int16(v) => 2 * v.len() as u32,
            EncodedTimeseries::Int32(v) => 4 * v.len() as u32,
            EncodedTimeseries::Float32(v) => 4 * v.len() as u32,
            EncodedTimeseries::Float64(v) => 8 * v.len() as u32,
            EncodedTimeseries::Steim1(v) => v.len() as u32,
            EncodedTimeseries::Steim2(v) => v.len() as u32,
            EncodedTimeseries::Steim3(v) => v.len() as u32,
            EncodedTimeseries::Opaque(v) => v.len() as u32,
        }
    }

    /// Reconciles the number of samples in the header with the size of the EncodedTimeseries.
    /// For the primitive types, Int16, Int32, Float32 and Float64 the value is calculated from
    /// the length of the array. For the remaining, the passed in header num_samples is
    /// return as it is assumed to be correct.
    pub fn reconcile_num_samples(&self, header_num_sample: u32) -> u32 {
        match self {
            EncodedTimeseries::Int16(v) => v.len() as u32,
            EncodedTimeseries::Int32(v) => v.len() as u32,
            EncodedTimeseries::Float32(v) => v.len() as u32,
            EncodedTimeseries::Float64(v) => v.len() as u32,
            _ => header_num_sample,
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            EncodedTimeseries::Int16(_) | EncodedTimeseries::Int32(_) => SampleType::Integer,
            EncodedTimeseries::Float32(_) | EncodedTimeseries::Float64(_) => SampleType::Float,
            _ => SampleType::Opaque,
        }
    }

    /// Decodes raw payload bytes according to the header encoding. Every integer encoding,
    /// including 16 bit and Steim compressed data, becomes `Int32`. Text and opaque payloads,
    /// and encodings this crate cannot decompress, keep their bytes.
    pub fn decompress(
        self,
        encoding: DataEncoding,
        num_samples: u32,
    ) -> Result<EncodedTimeseries, MSeedError> {
        let bytes = match self {
            EncodedTimeseries::Raw(b) => b,
            other => return Ok(other),
        };
        if let Some(size) = encoding.sample_size() {
            let expected = size.checked_mul(num_samples);
            if expected.map_or(true, |len| bytes.len() < len as usize) {
                return Err(MSeedError::DataLength(
                    expected.unwrap_or(u32::MAX),
                    num_samples,
                    encoding.value(),
                    bytes.len() as u32,
                ));
            }
        }
        let n = num_samples as usize;
        let decoded = match encoding {
            DataEncoding::INT16 => EncodedTimeseries::Int32(
                bytes
                    .chunks_exact(2)
                    .take(n)
                    .map(|c| LittleEndian::read_i16(c) as i32)
                    .collect(),
            ),
            DataEncoding::INT32 => EncodedTimeseries::Int32(
                bytes.chunks_exact(4).take(n).map(LittleEndian::read_i32).collect(),
            ),
            DataEncoding::FLOAT32 => EncodedTimeseries::Float32(
                bytes.chunks_exact(4).take(n).map(LittleEndian::read_f32).collect(),
            ),
            DataEncoding::FLOAT64 => EncodedTimeseries::Float64(
                bytes.chunks_exact(8).take(n).map(LittleEndian::read_f64).collect(),
            ),
            DataEncoding::STEIM1 => EncodedTimeseries::Int32(steim1::decode(&bytes, num_samples)?),
            DataEncoding::STEIM2 => EncodedTimeseries::Int32(steim2::decode(&bytes, num_samples)?),
            DataEncoding::TEXT => EncodedTimeseries::Raw(bytes),
            DataEncoding::STEIM3 => EncodedTimeseries::Steim3(bytes),
            DataEncoding::OPAQUE | DataEncoding::UNKNOWN(_) => EncodedTimeseries::Opaque(bytes),
        };
        Ok(decoded)
    }
}

impl fmt::Display for EncodedTimeseries {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EncodedTimeseries::Raw(v) => write!(f, "Raw bytes, {} bytes", v.len()),
            EncodedTimeseries::Int16(v) => write!(f, "Int16, {} samples", v.len()),
            EncodedTimeseries::Int32(v) => write!(f, "Int32, {} samples", v.len()),
            EncodedTimeseries::Float32(v) => write!(f, "Float32, {} samples", v.len()),
            EncodedTimeseries::Float64(v) => write!(f, "Float64, {} samples", v.len()),
            EncodedTimeseries::Steim1(v) => write!(f, "Steim1, {} bytes", v.len()),
            EncodedTimeseries::Steim2(v) => write!(f, "Steim2, {} bytes", v.len()),
            EncodedTimeseries::Steim3(v) => write!(f, "Steim3, {} bytes", v.len()),
            EncodedTimeseries::Opaque(v) => write!(f, "Opaque, {} bytes", v.len()),
        }
    }
}
