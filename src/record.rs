use byteorder::{LittleEndian, WriteBytesExt};
use chrono::prelude::*;
use chrono::Utc;
use crc::{Crc, CRC_32_ISCSI};
use std::convert::TryFrom;
use std::fmt;
use std::io::prelude::*;
use std::io::BufWriter;

use crate::data_encoding::DataEncoding;
use crate::encoded_timeseries::{EncodedTimeseries, SampleType};
use crate::extra_headers::ExtraHeaders;
use crate::fdsn_source_identifier::{FdsnSourceIdentifier, SourceIdentifier};
use crate::header::{MSeed3Header, CRC_OFFSET, FIXED_HEADER_SIZE};
use crate::mseed_error::MSeedError;

pub const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[derive(Debug, Clone)]
pub struct MSeed3Record {
    pub header: MSeed3Header,
    pub identifier: SourceIdentifier,
    pub extra_headers: ExtraHeaders,
    pub encoded_data: EncodedTimeseries,
}

impl MSeed3Record {
    /// Create new miniseed3 Record. The header's fields are reconciled with the other inputs, so
    /// for example in the case where the data is a primitive, uncompressed type like Int32,
    /// num_samples will be calculated and set from the length of the array and so a 0 can be passed
    /// as the last argument. However, in the case of compressed data, the number of samples cannot
    /// be determined and so needs to be passed in.
    ///
    /// #Example
    ///
    /// ```
    /// # use mseedscale::MSeedError;
    /// # fn main() -> Result<(), MSeedError> {
    /// use chrono::{DateTime, Utc};
    /// use mseedscale::{DataEncoding, EncodedTimeseries, ExtraHeaders, SourceIdentifier};
    /// let start = "2014-11-28T12:00:09Z".parse::<DateTime<Utc>>()?;
    /// let timeseries = vec![0, 1, -1, 5, 3, -5, 10, -1, 1, 0];
    /// let num_samples = timeseries.len();
    /// let encoded_data = EncodedTimeseries::Int32(timeseries);
    /// let header = mseedscale::MSeed3Header::new(start, DataEncoding::INT32, 10.0, num_samples);
    /// let identifier = SourceIdentifier::from("FDSN:CO_BIRD_00_H_H_Z");
    /// let extra_headers = ExtraHeaders::new();
    /// let record = mseedscale::MSeed3Record::new(header, identifier, extra_headers, encoded_data);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        header: MSeed3Header,
        identifier: SourceIdentifier,
        extra_headers: ExtraHeaders,
        encoded_data: EncodedTimeseries,
    ) -> MSeed3Record {
        let mut header = header;
        header.recalculated_lengths(
            identifier.calc_len(),
            extra_headers.to_record_bytes().len() as u16,
            encoded_data.byte_len(),
            encoded_data.reconcile_num_samples(header.num_samples),
        );

        MSeed3Record {
            header,
            identifier,
            extra_headers,
            encoded_data,
        }
    }

    /// Create a record with the given start time and sample rate from a Vec of f32 floats
    pub fn from_floats(start: DateTime<Utc>, sample_rate_period: f64, data: Vec<f32>) -> MSeed3Record {
        let header = MSeed3Header::new(start, DataEncoding::FLOAT32, sample_rate_period, data.len());
        MSeed3Record::new(
            header,
            SourceIdentifier::Fdsn(FdsnSourceIdentifier::create_fake_channel()),
            ExtraHeaders::new(),
            EncodedTimeseries::Float32(data),
        )
    }

    /// Create a record with the given start time and sample rate from a Vec of i32 integers
    pub fn from_ints(start: DateTime<Utc>, sample_rate_period: f64, data: Vec<i32>) -> MSeed3Record {
        let header = MSeed3Header::new(start, DataEncoding::INT32, sample_rate_period, data.len());
        MSeed3Record::new(
            header,
            SourceIdentifier::Fdsn(FdsnSourceIdentifier::create_fake_channel()),
            ExtraHeaders::new(),
            EncodedTimeseries::Int32(data),
        )
    }

    /// Parse a complete record from a byte slice, validating the CRC. The data is left
    /// compressed, see [`MSeed3Record::decompress`].
    pub fn from_bytes(bytes: &[u8]) -> Result<MSeed3Record, MSeedError> {
        let mut header = MSeed3Header::try_from(bytes)?;
        let record_size = header.get_record_size() as usize;
        if bytes.len() < record_size {
            return Err(MSeedError::InsufficientBytes(bytes.len(), record_size));
        }
        let bytes = &bytes[..record_size];

        // crc is calculated with the crc field set to zero
        let mut digest = CASTAGNOLI.digest();
        digest.update(&bytes[..CRC_OFFSET]);
        digest.update(&[0u8; 4]);
        digest.update(&bytes[CRC_OFFSET + 4..]);
        let crc_calc = digest.finalize();
        if crc_calc != header.crc {
            return Err(MSeedError::CrcInvalid(crc_calc, header.crc));
        }

        let id_end = FIXED_HEADER_SIZE + header.raw_identifier_length() as usize;
        let eh_end = id_end + header.raw_extra_headers_length() as usize;
        let identifier = SourceIdentifier::try_from(bytes[FIXED_HEADER_SIZE..id_end].to_vec())?;
        let extra_headers_str = if header.raw_extra_headers_length() > 2 {
            String::from_utf8(bytes[id_end..eh_end].to_vec())?
        } else {
            String::from("{}")
        };
        if let Some(size) = header.encoding.sample_size() {
            let expected_data_length = size.checked_mul(header.num_samples);
            if expected_data_length != Some(header.raw_data_length()) {
                return Err(MSeedError::DataLength(
                    expected_data_length.unwrap_or(u32::MAX),
                    header.num_samples,
                    header.encoding.value(),
                    header.raw_data_length(),
                ));
            }
        }
        let encoded_data = EncodedTimeseries::Raw(bytes[eh_end..].to_vec());
        header.num_samples = encoded_data.reconcile_num_samples(header.num_samples);
        Ok(MSeed3Record {
            header,
            identifier,
            extra_headers: ExtraHeaders::from(extra_headers_str),
            encoded_data,
        })
    }

    /// Read a single record from the BufRead
    pub fn from_reader<R: BufRead>(buf_reader: &mut R) -> Result<MSeed3Record, MSeedError> {
        let bytes = read_record_bytes(buf_reader)?;
        MSeed3Record::from_bytes(&bytes)
    }

    /// Decode the payload into samples in place. Integer encodings all become `Int32`.
    pub fn decompress(&mut self) -> Result<(), MSeedError> {
        let raw = std::mem::replace(&mut self.encoded_data, EncodedTimeseries::Raw(Vec::new()));
        self.encoded_data = raw.decompress(self.header.encoding, self.header.num_samples)?;
        Ok(())
    }

    pub fn sample_type(&self) -> SampleType {
        self.encoded_data.sample_type()
    }

    /// Integer samples, if the payload has been decompressed to them.
    pub fn int_samples(&self) -> Option<&[i32]> {
        match &self.encoded_data {
            EncodedTimeseries::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable integer samples, widening 16 bit samples to 32 bits first. `None` unless the
    /// payload holds decoded integers.
    pub fn int_samples_mut(&mut self) -> Option<&mut Vec<i32>> {
        let widened = match &self.encoded_data {
            EncodedTimeseries::Int16(v) => Some(v.iter().map(|s| i32::from(*s)).collect()),
            _ => None,
        };
        if let Some(v) = widened {
            self.encoded_data = EncodedTimeseries::Int32(v);
        }
        match &mut self.encoded_data {
            EncodedTimeseries::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// Writes the record, after calculating the CRC. The returned tuple contains the number
    /// of bytes written and the CRC value.
    /// This does recalculate the identifier length, extra headers length and data length headers.
    /// The number of samples is sanity checked against the data, but trusts the header in cases
    /// of compressed or opaque data.
    pub fn write_to<W>(&mut self, buf: &mut BufWriter<W>) -> Result<(u32, u32), MSeedError>
    where
        W: std::io::Write,
    {
        self.header.crc = 0;
        let mut out = Vec::new();
        {
            let mut inner_buf = BufWriter::new(&mut out);
            self.header.crc = 0;
            self.write_to_wocrc(&mut inner_buf)?;
            inner_buf.flush()?;
        }
        let crc = CASTAGNOLI.checksum(&out);
        self.header.crc = crc;
        buf.write_all(&out[0..CRC_OFFSET])?;
        buf.write_u32::<LittleEndian>(crc)?;
        buf.write_all(&out[(CRC_OFFSET + 4)..])?;
        Ok((out.len() as u32, crc))
    }

    /// Writes the record to the given buffer without checking, calculating or setting the header CRC field.
    pub fn write_to_wocrc<W>(&mut self, buf: &mut BufWriter<W>) -> Result<(), MSeedError>
    where
        W: std::io::Write,
    {
        let id_bytes = self.identifier.as_bytes();
        let eh_bytes = self.extra_headers.to_record_bytes();
        let num_samples = self
            .encoded_data
            .reconcile_num_samples(self.header.num_samples);
        self.header.recalculated_lengths(
            id_bytes.len() as u8,
            eh_bytes.len() as u16,
            self.encoded_data.byte_len(),
            num_samples,
        );
        self.header.write_to(buf)?;
        buf.write_all(&id_bytes)?;
        buf.write_all(&eh_bytes)?;
        self.encoded_data.write_to(buf)?;
        buf.flush()?;
        Ok(())
    }

    /// The serialized record, with CRC.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, MSeedError> {
        let mut out = Vec::with_capacity(self.get_record_size() as usize);
        {
            let mut buf_writer = BufWriter::new(&mut out);
            self.write_to(&mut buf_writer)?;
            buf_writer.flush()?;
        }
        Ok(out)
    }

    pub fn get_record_size(&self) -> u32 {
        self.header.get_record_size()
    }
}

/// Reads the bytes of exactly one record: the fixed header, then the identifier, extra
/// headers and data it announces.
pub fn read_record_bytes<R: BufRead>(buf_reader: &mut R) -> Result<Vec<u8>, MSeedError> {
    let mut bytes = vec![0; FIXED_HEADER_SIZE];
    buf_reader.read_exact(&mut bytes)?;
    let header = MSeed3Header::try_from(&bytes[..])?;
    bytes.resize(header.get_record_size() as usize, 0);
    buf_reader.read_exact(&mut bytes[FIXED_HEADER_SIZE..])?;
    Ok(bytes)
}

impl fmt::Display for MSeed3Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "  {}, {}", self.identifier, self.header)
    }
}
