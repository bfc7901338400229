use byteorder::{LittleEndian, WriteBytesExt};
use chrono::prelude::*;
use chrono::{Duration, Utc};
use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::io::prelude::*;
use std::io::BufWriter;

use crate::data_encoding::DataEncoding;
use crate::mseed_error::MSeedError;

/// Size in bytes of the fixed header. This does not include the identifier, extra headers, or data.
pub const FIXED_HEADER_SIZE: usize = 40;

/// Offset to the 4-byte CRC within the header.
pub const CRC_OFFSET: usize = 28;

/// The fixed section of the header. Does not contain the identifier, extra headers, or timeseries data.
#[derive(Debug, Clone)]
pub struct MSeed3Header {
    pub record_indicator: [u8; 2],
    pub format_version: u8,
    pub flags: u8,
    pub nanosecond: u32,
    pub year: u16,
    pub day_of_year: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub encoding: DataEncoding,
    pub sample_rate_period: f64,
    pub num_samples: u32,
    pub crc: u32,
    pub publication_version: u8,
    identifier_length: u8,
    extra_headers_length: u16,
    data_length: u32,
}

impl MSeed3Header {
    /// First two bytes of a miniseed3 header must be `MS`
    pub const REC_IND: [u8; 2] = [b'M', b'S'];
    /// The header field representing the length of the identifier. Note that this is the value
    /// at the time the record was created. If the identifier was changed this value may be
    /// wrong and will be recalculated on write.
    pub fn raw_identifier_length(&self) -> u8 {
        self.identifier_length
    }
    /// The header field representing the length of the extra headers string. Note that this is the value
    /// at the time the record was created. If the extra headers have been changed this value may be
    /// wrong and will be recalculated on write.
    pub fn raw_extra_headers_length(&self) -> u16 {
        self.extra_headers_length
    }
    /// The header field representing the length of the timeseries data. Note that this is the value
    /// at the time the record was created. If the data was changed this value may be
    /// wrong and will be recalculated on write.
    pub fn raw_data_length(&self) -> u32 {
        self.data_length
    }

    pub fn recalculated_lengths(
        &mut self,
        identifier_length: u8,
        extra_headers_length: u16,
        data_length: u32,
        num_samples: u32,
    ) {
        self.identifier_length = identifier_length;
        self.extra_headers_length = extra_headers_length;
        self.data_length = data_length;
        self.num_samples = num_samples;
    }

    pub fn new(
        start: DateTime<Utc>,
        encoding: DataEncoding,
        sample_rate_period: f64,
        num_samples: usize,
    ) -> MSeed3Header {
        let mut header = MSeed3Header {
            record_indicator: MSeed3Header::REC_IND,
            format_version: 3,
            flags: 0,
            nanosecond: 0,
            year: 0,
            day_of_year: 0,
            hour: 0,
            minute: 0,
            second: 0,
            encoding,
            sample_rate_period,
            num_samples: num_samples as u32,
            crc: 0,
            publication_version: 0,
            identifier_length: 0,
            extra_headers_length: 0,
            data_length: 0,
        };
        header.set_start(start);
        header
    }

    /// Sets the start time fields from a DateTime.
    pub fn set_start(&mut self, start: DateTime<Utc>) {
        self.nanosecond = start.nanosecond();
        self.year = start.year() as u16;
        self.day_of_year = start.ordinal() as u16;
        self.hour = start.hour() as u8;
        self.minute = start.minute() as u8;
        self.second = start.second() as u8;
    }

    /// Start time as DateTime struct.
    pub fn get_start_as_utc(&self) -> Result<DateTime<Utc>, MSeedError> {
        NaiveDate::from_yo_opt(self.year as i32, self.day_of_year as u32)
            .and_then(|d| {
                d.and_hms_nano_opt(
                    self.hour as u32,
                    self.minute as u32,
                    self.second as u32,
                    self.nanosecond,
                )
            })
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or(MSeedError::BadStartTime(
                self.year,
                self.day_of_year,
                self.hour,
                self.minute,
                self.second,
                self.nanosecond,
            ))
    }

    /// Start time as ISO8601 string
    pub fn get_start_as_iso(&self) -> String {
        match self.get_start_as_utc() {
            Ok(start) => start.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string(),
            Err(_) => format!(
                "{},{:03},{:02}:{:02}:{:02}.{:09}",
                self.year, self.day_of_year, self.hour, self.minute, self.second, self.nanosecond
            ),
        }
    }

    /// Sample rate in Hz. Negative header values are a period in seconds.
    pub fn sample_rate_hz(&self) -> f64 {
        if self.sample_rate_period < 0.0 {
            -1.0 / self.sample_rate_period
        } else {
            self.sample_rate_period
        }
    }

    /// Time offset of the sample at `index` relative to the first sample, zero for
    /// records without a sample rate.
    pub fn sample_offset(&self, index: usize) -> Duration {
        let rate = self.sample_rate_hz();
        if rate == 0.0 || index == 0 {
            return Duration::zero();
        }
        Duration::nanoseconds((index as f64 * 1.0e9 / rate).round() as i64)
    }

    /// Time of the last sample.
    pub fn get_end_as_utc(&self) -> Result<DateTime<Utc>, MSeedError> {
        let start = self.get_start_as_utc()?;
        let last = (self.num_samples as usize).saturating_sub(1);
        Ok(start + self.sample_offset(last))
    }

    /// Writes a miniseed3 header to a BufWriter.
    pub fn write_to<W>(&self, buf: &mut BufWriter<W>) -> Result<(), MSeedError>
    where
        W: std::io::Write,
    {
        buf.write_all(&MSeed3Header::REC_IND)?;
        buf.write_all(&[self.format_version, self.flags])?;
        buf.write_u32::<LittleEndian>(self.nanosecond)?;
        buf.write_u16::<LittleEndian>(self.year)?;
        buf.write_u16::<LittleEndian>(self.day_of_year)?;
        buf.write_all(&[self.hour, self.minute, self.second, self.encoding.value()])?;
        buf.write_f64::<LittleEndian>(self.sample_rate_period)?;
        buf.write_u32::<LittleEndian>(self.num_samples)?;
        buf.write_u32::<LittleEndian>(self.crc)?;
        buf.write_all(&[self.publication_version, self.identifier_length])?;
        buf.write_u16::<LittleEndian>(self.extra_headers_length)?;
        buf.write_u32::<LittleEndian>(self.data_length)?;
        Ok(())
    }

    /// Format CRC as a hex string, like 0x106EAFA5
    pub fn crc_hex_string(&self) -> String {
        format!("{:#0X}", self.crc)
    }

    /// The size of the data record, including the identifier, extra headers and data. Note that
    /// this uses header values set on read, and so if any of these have changed, this value
    /// will be wrong.
    pub fn get_record_size(&self) -> u32 {
        FIXED_HEADER_SIZE as u32
            + self.identifier_length as u32
            + self.extra_headers_length as u32
            + self.data_length
    }
}

impl TryFrom<&[u8]> for MSeed3Header {
    type Error = MSeedError;

    /// Reads the fixed header from the first 40 bytes of the buffer.
    fn try_from(buffer: &[u8]) -> Result<Self, Self::Error> {
        if buffer.len() < FIXED_HEADER_SIZE {
            return Err(MSeedError::InsufficientBytes(buffer.len(), FIXED_HEADER_SIZE));
        }
        if buffer[0] != MSeed3Header::REC_IND[0] || buffer[1] != MSeed3Header::REC_IND[1] {
            return Err(MSeedError::BadRecordIndicator(buffer[0], buffer[1]));
        }
        if buffer[2] != 3 {
            return Err(MSeedError::UnknownFormatVersion(buffer[2]));
        }
        // skip M, S, format, flags
        let (_, mut header_bytes) = buffer.split_at(4);
        let nanosecond = read_le_u32(&mut header_bytes);
        let year = read_le_u16(&mut header_bytes);
        let day_of_year = read_le_u16(&mut header_bytes);
        let _ = read_le_u32(&mut header_bytes); // skip hour-encoding
        let sample_rate_period = read_le_f64(&mut header_bytes);
        let num_samples = read_le_u32(&mut header_bytes);
        let crc = read_le_u32(&mut header_bytes);
        let _ = read_le_u16(&mut header_bytes); // skip pub ver and id len
        let extra_headers_length = read_le_u16(&mut header_bytes);
        let data_length = read_le_u32(&mut header_bytes);
        Ok(MSeed3Header {
            record_indicator: MSeed3Header::REC_IND,
            format_version: buffer[2],
            flags: buffer[3],
            nanosecond,
            year,
            day_of_year,
            hour: buffer[12],
            minute: buffer[13],
            second: buffer[14],
            encoding: DataEncoding::from_int(buffer[15]),
            sample_rate_period,
            num_samples,
            crc,
            publication_version: buffer[32],
            identifier_length: buffer[33],
            extra_headers_length,
            data_length,
        })
    }
}

impl fmt::Display for MSeed3Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "version {}, {} bytes (format: {})",
            self.publication_version,
            self.get_record_size(),
            self.format_version
        )?;
        writeln!(f, "             start time: {}", self.get_start_as_iso())?;
        writeln!(f, "      number of samples: {}", self.num_samples)?;
        writeln!(f, "       sample rate (Hz): {}", self.sample_rate_hz())?;
        writeln!(f, "                  flags: [{:#010b}] 8 bits", self.flags)?;
        writeln!(f, "                    CRC: {}", self.crc_hex_string())?;
        writeln!(f, "    extra header length: {} bytes", self.extra_headers_length)?;
        writeln!(f, "    data payload length: {} bytes", self.data_length)?;
        write!(
            f,
            "       payload encoding: {} (val: {})",
            self.encoding,
            self.encoding.value()
        )
    }
}

/// read a single little endian 64 bit float (8 bytes) and reset input
fn read_le_f64(input: &mut &[u8]) -> f64 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<f64>());
    *input = rest;
    f64::from_le_bytes(int_bytes.try_into().unwrap())
}

/// read a single little endian 32 bit int (4 bytes) and reset input
fn read_le_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().unwrap())
}

/// read a single little endian 16 bit int (2 bytes) and reset input
fn read_le_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u16>());
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().unwrap())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn read_u32_buf() {
        let buf: [u8; 5] = [1, 0, 0, 0, 5];
        let mut header_bytes = &buf[0..5];
        let nanosecond = read_le_u32(&mut header_bytes);
        assert_eq!(1, nanosecond);
        assert_eq!(header_bytes[0], 5);
    }

    #[test]
    fn read_f64_buf() {
        let buf: [u8; 8] = [0, 0, 0, 0, 0, 0, 0xf0, 0x3f];
        let mut header_bytes = &buf[0..8];
        assert_eq!(1.0_f64, read_le_f64(&mut header_bytes));
    }

    pub(crate) fn get_dummy_header() -> [u8; 64] {
        // 00000000  4d 53 03 04 00 00 00 00  dc 07 01 00 00 00 00 01  |MS..............|
        // 00000010  00 00 00 00 00 00 f0 3f  f4 01 00 00 89 73 2b 64  |.......?.....s+d|
        // 00000020  01 14 00 00 e8 03 00 00  58 46 44 53 4e 3a 58 58  |........XFDSN:XX|
        // 00000030  5f 54 45 53 54 5f 5f 4c  5f 48 5f 5a 00 00 02 00  |_TEST__L_H_Z....|
        let buf: [u8; 64] = [
            0x4d, 0x53, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00, 0xdc, 0x07, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x3f, 0xf4, 0x01, 0x00, 0x00,
            0x89, 0x73, 0x2b, 0x64, 0x01, 0x14, 0x00, 0x00, 0xe8, 0x03, 0x00, 0x00, 0x58, 0x46,
            0x44, 0x53, 0x4e, 0x3a, 0x58, 0x58, 0x5f, 0x54, 0x45, 0x53, 0x54, 0x5f, 0x5f, 0x4c,
            0x5f, 0x48, 0x5f, 0x5a, 0x00, 0x00, 0x02, 0x00,
        ];
        buf
    }

    #[test]
    fn read_header_sin_int16() -> Result<(), MSeedError> {
        let buf = get_dummy_header();
        let head = MSeed3Header::try_from(&buf[..])?;
        assert_eq!(head.record_indicator, MSeed3Header::REC_IND);
        assert_eq!(head.format_version, 3);
        assert_eq!(head.flags, 4);
        assert_eq!(head.year, 2012);
        assert_eq!(head.day_of_year, 1);
        assert_eq!(head.encoding, DataEncoding::INT16);
        assert_eq!(head.sample_rate_hz(), 1.0);
        assert_eq!(head.num_samples, 500);
        assert_eq!(head.crc, 0x642B7389);
        assert_eq!(head.publication_version, 1);
        assert_eq!(head.raw_identifier_length(), "XFDSN:XX_TEST__L_H_Z".len() as u8);
        assert_eq!(head.raw_extra_headers_length(), 0);
        assert_eq!(head.raw_data_length(), 1000);
        assert_eq!(head.get_record_size(), 1060);
        assert_eq!(head.get_start_as_iso(), "2012-01-01T00:00:00.000000000Z");
        assert_eq!(
            head.get_end_as_utc()?.to_rfc3339(),
            "2012-01-01T00:08:19+00:00"
        );
        Ok(())
    }

    #[test]
    fn read_header_round_trip() -> Result<(), MSeedError> {
        let buf = &get_dummy_header()[0..FIXED_HEADER_SIZE];
        let head = MSeed3Header::try_from(buf)?;
        let mut out = Vec::new();
        {
            let mut buf_writer = BufWriter::new(&mut out);
            head.write_to(&mut buf_writer)?;
            buf_writer.flush()?;
        }
        assert_eq!(out, buf);
        Ok(())
    }

    #[test]
    fn short_and_foreign_headers_rejected() {
        let buf = get_dummy_header();
        assert!(matches!(
            MSeed3Header::try_from(&buf[0..20]),
            Err(MSeedError::InsufficientBytes(20, FIXED_HEADER_SIZE))
        ));
        let mut v2 = buf;
        v2[2] = 2;
        assert!(matches!(
            MSeed3Header::try_from(&v2[..]),
            Err(MSeedError::UnknownFormatVersion(2))
        ));
    }

    #[test]
    fn period_and_offsets() -> Result<(), MSeedError> {
        let start = "2020-02-29T23:59:59.5Z".parse::<DateTime<Utc>>()?;
        let mut head = MSeed3Header::new(start, DataEncoding::STEIM2, -10.0, 3);
        assert_eq!(head.sample_rate_hz(), 0.1);
        assert_eq!(head.sample_offset(2), Duration::seconds(20));
        assert_eq!(head.get_start_as_utc()?, start);
        head.sample_rate_period = 40.0;
        assert_eq!(head.sample_offset(1), Duration::milliseconds(25));
        head.sample_rate_period = 0.0;
        assert_eq!(head.sample_offset(7), Duration::zero());
        Ok(())
    }
}
