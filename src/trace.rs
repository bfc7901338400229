//! Regrouping a record's samples into a trace and packing it back into compressed records.

use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::data_encoding::DataEncoding;
use crate::encoded_timeseries::EncodedTimeseries;
use crate::header::FIXED_HEADER_SIZE;
use crate::mseed_error::MSeedError;
use crate::record::MSeed3Record;
use crate::sink::{Delivery, RecordSink};
use crate::steim2;
use crate::steim_frame_block::FRAME_SIZE;

pub const DEFAULT_RECORD_LENGTH: usize = 512;

/// Output record parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackConfig {
    /// Upper bound on the size of each output record, in bytes.
    pub max_record_length: usize,
    pub encoding: DataEncoding,
}

impl Default for PackConfig {
    fn default() -> Self {
        PackConfig {
            max_record_length: DEFAULT_RECORD_LENGTH,
            encoding: DataEncoding::STEIM2,
        }
    }
}

/// Result of one repack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Packed {
    pub samples: usize,
    pub records: usize,
    /// The sink gave up part way, later samples were not packed.
    pub abandoned: bool,
}

/// A single contiguous trace built from one decompressed record.
pub struct TraceGroup<'a> {
    record: &'a MSeed3Record,
    samples: &'a [i32],
    start: DateTime<Utc>,
}

impl<'a> TraceGroup<'a> {
    pub fn new(record: &'a MSeed3Record) -> Result<TraceGroup<'a>, MSeedError> {
        let samples = record.int_samples().ok_or_else(|| {
            MSeedError::Compression(format!(
                "{} has no decoded integer samples to pack",
                record.identifier
            ))
        })?;
        Ok(TraceGroup {
            record,
            samples,
            start: record.header.get_start_as_utc()?,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Bytes each output record needs before any data frame.
    fn overhead(&self) -> usize {
        FIXED_HEADER_SIZE
            + self.record.identifier.calc_len() as usize
            + self.record.extra_headers.to_record_bytes().len()
    }

    /// Packs every sample into records no larger than `config.max_record_length`, handing
    /// each to the sink in time order. Continuation records start at the time of their first
    /// sample and their first difference is relative to the previous record's last sample.
    pub fn pack(
        &self,
        config: &PackConfig,
        sink: &mut dyn RecordSink,
    ) -> Result<Packed, MSeedError> {
        if config.encoding != DataEncoding::STEIM2 {
            return Err(MSeedError::UnsupportedEncoding(config.encoding.value()));
        }
        let overhead = self.overhead();
        if config.max_record_length < overhead + FRAME_SIZE {
            return Err(MSeedError::RecordLength(config.max_record_length, overhead));
        }
        let max_frames = (config.max_record_length - overhead) / FRAME_SIZE;

        let mut packed = Packed::default();
        let mut offset = 0;
        let mut previous = None;
        while offset < self.samples.len() {
            let block = steim2::encode(&self.samples[offset..], max_frames, previous)?;
            let count = block.num_samples;

            let mut header = self.record.header.clone();
            header.set_start(self.start + header.sample_offset(offset));
            header.encoding = DataEncoding::STEIM2;
            header.num_samples = count as u32;
            header.crc = 0;
            let mut out = MSeed3Record::new(
                header,
                self.record.identifier.clone(),
                self.record.extra_headers.clone(),
                EncodedTimeseries::Steim2(block.get_encoded_data()?),
            );
            let bytes = out.to_bytes()?;

            if sink.write_record(&bytes) == Delivery::Abandoned {
                debug!("packing of {} abandoned at sample {}", self.record.identifier, offset);
                packed.abandoned = true;
                break;
            }
            packed.records += 1;
            packed.samples += count;
            previous = Some(self.samples[offset + count - 1]);
            offset += count;
        }
        Ok(packed)
    }
}

impl fmt::Display for TraceGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let end = self.start + self.record.header.sample_offset(self.samples.len().saturating_sub(1));
        write!(
            f,
            "{} {} - {} {} Hz, {} samples",
            self.record.identifier,
            self.start.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            end.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            self.record.header.sample_rate_hz(),
            self.samples.len()
        )
    }
}

/// Builds a trace from one transformed record, logs its summary and packs it.
pub fn repack(
    record: &MSeed3Record,
    config: &PackConfig,
    sink: &mut dyn RecordSink,
) -> Result<Packed, MSeedError> {
    let group = TraceGroup::new(record)?;
    info!("{}", group);
    group.pack(config, sink)
}
