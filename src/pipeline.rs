//! Batch and stream drivers: decode, transform, repack, emit.

use std::fmt;
use std::io::BufRead;

use log::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::mseed_error::MSeedError;
use crate::reader::RecordReader;
use crate::record::MSeed3Record;
use crate::scale::{transform, IneligiblePolicy, ScaleConfig};
use crate::seedlink::packet::{Packet, PacketKind};
use crate::seedlink::state::Checkpoint;
use crate::sink::{Delivery, RecordSink};
use crate::trace::{repack, PackConfig};

/// Something that yields SeedLink packets until it is cancelled or runs dry.
pub trait PacketSource {
    /// Blocks for the next packet. `None` means no more packets will come.
    fn next_packet(&mut self, cancel: &CancelToken) -> Option<Packet>;
}

/// What happened to one input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Transformed { samples: usize, records: usize, abandoned: bool },
    Passed(Delivery),
    Dropped,
}

fn decode(bytes: &[u8]) -> Result<MSeed3Record, MSeedError> {
    let mut rec = MSeed3Record::from_bytes(bytes)?;
    rec.decompress()?;
    Ok(rec)
}

/// Whether a repack error only affects its own record. A record whose identifier and extra
/// headers leave no room for a frame, or whose samples do not compress, is skipped.
fn skips_record(e: &MSeedError) -> bool {
    matches!(e, MSeedError::Compression(_) | MSeedError::RecordLength(..))
}

/// Transforms and repacks an eligible record, otherwise applies the ineligible policy to
/// the original bytes.
fn scale_record(
    mut rec: MSeed3Record,
    original: &[u8],
    scale: &ScaleConfig,
    pack: &PackConfig,
    sink: &mut dyn RecordSink,
) -> Result<Outcome, MSeedError> {
    let original = &original[..(rec.get_record_size() as usize).min(original.len())];
    if !transform(&mut rec, scale) {
        debug!("{} not eligible for scaling ({})", rec.identifier, rec.encoded_data);
        return Ok(match scale.ineligible {
            IneligiblePolicy::PassThrough => Outcome::Passed(sink.write_record(original)),
            IneligiblePolicy::Drop => Outcome::Dropped,
        });
    }
    let packed = repack(&rec, pack, sink)?;
    Ok(Outcome::Transformed {
        samples: packed.samples,
        records: packed.records,
        abandoned: packed.abandoned,
    })
}

/// Counts for one batch input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSummary {
    pub records: usize,
    pub transformed: usize,
    pub passed: usize,
    pub dropped: usize,
    /// Records skipped because they could not be repacked.
    pub skipped: usize,
    pub samples: usize,
    pub records_out: usize,
}

impl InputSummary {
    fn tally(&mut self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Transformed { samples, records, abandoned } => {
                self.transformed += 1;
                self.samples += samples;
                self.records_out += records;
                abandoned
            }
            Outcome::Passed(delivery) => {
                self.passed += 1;
                if delivery != Delivery::Dropped {
                    self.records_out += 1;
                }
                delivery == Delivery::Abandoned
            }
            Outcome::Dropped => {
                self.dropped += 1;
                false
            }
        }
    }
}

impl fmt::Display for InputSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} records read, {} scaled, {} passed, {} dropped, {} skipped; {} samples in {} records written",
            self.records,
            self.transformed,
            self.passed,
            self.dropped,
            self.skipped,
            self.samples,
            self.records_out
        )
    }
}

/// Processes every record of one finite input in order. A record that cannot be decoded
/// ends the input with an error; records already emitted stay emitted. A record that
/// cannot be repacked is only skipped.
pub fn process_input<R: BufRead>(
    reader: R,
    scale: &ScaleConfig,
    pack: &PackConfig,
    sink: &mut dyn RecordSink,
) -> Result<InputSummary, MSeedError> {
    let mut summary = InputSummary::default();
    for bytes in RecordReader::new(reader) {
        let bytes = bytes?;
        let rec = decode(&bytes)?;
        summary.records += 1;
        match scale_record(rec, &bytes, scale, pack, sink) {
            Ok(outcome) => {
                if summary.tally(outcome) {
                    info!("output abandoned, stopping input");
                    break;
                }
            }
            Err(e) if skips_record(&e) => {
                warn!("skipping record {}: {}", summary.records, e);
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    sink.flush()?;
    Ok(summary)
}

/// Counts for a stream run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub packets: usize,
    pub data_packets: usize,
    pub records: InputSummary,
    /// Data packets that did not decode.
    pub undecodable: usize,
    /// Packets whose forwarding was abandoned at shutdown.
    pub abandoned: usize,
    pub checkpoints_written: usize,
}

impl fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} packets, {} data, {} undecodable, {} abandoned; {}",
            self.packets, self.data_packets, self.undecodable, self.abandoned, self.records
        )
    }
}

fn save_checkpoint(checkpoint: &mut Checkpoint, summary: &mut StreamSummary) {
    match checkpoint.save() {
        Ok(()) => summary.checkpoints_written += 1,
        Err(e) => error!("unable to save state to {}: {}", checkpoint.path().display(), e),
    }
}

/// Processes packets until the source stops or shutdown is requested. The checkpoint, if
/// any, advances past each handled data packet unless its forwarding was abandoned, is
/// saved on its interval, and is saved once more when the loop ends. An output encoding
/// other than Steim-2 stops the run with an error, after the final save.
pub fn run_stream<S: PacketSource + ?Sized>(
    source: &mut S,
    scale: &ScaleConfig,
    pack: &PackConfig,
    sink: &mut dyn RecordSink,
    mut checkpoint: Option<&mut Checkpoint>,
    cancel: &CancelToken,
) -> Result<StreamSummary, MSeedError> {
    let mut summary = StreamSummary::default();
    let mut result = Ok(());

    while let Some(packet) = source.next_packet(cancel) {
        summary.packets += 1;
        if packet.kind != PacketKind::Data {
            debug!("{:?} packet from {} ignored", packet.kind, packet.station);
            continue;
        }
        summary.data_packets += 1;

        let mut abandoned = false;
        match decode(&packet.payload) {
            Err(e) => {
                warn!("error parsing record from {}: {}", packet.station, e);
                summary.undecodable += 1;
            }
            Ok(rec) => {
                summary.records.records += 1;
                match scale_record(rec, &packet.payload, scale, pack, sink) {
                    Ok(outcome) => abandoned = summary.records.tally(outcome),
                    Err(e) if skips_record(&e) => {
                        warn!("skipping record from {}: {}", packet.station, e);
                        summary.records.skipped += 1;
                    }
                    Err(e) => {
                        error!("cannot pack records: {}", e);
                        result = Err(e);
                        break;
                    }
                }
            }
        }

        if abandoned {
            summary.abandoned += 1;
            info!("forwarding of {} abandoned", packet.station);
            continue;
        }
        if let (Some(cp), Some(seq)) = (checkpoint.as_deref_mut(), packet.sequence) {
            match cp.advance(&packet.station, seq) {
                Ok(true) => summary.checkpoints_written += 1,
                Ok(false) => {}
                Err(e) => error!("unable to save state to {}: {}", cp.path().display(), e),
            }
        }
    }

    if let Some(cp) = checkpoint.as_deref_mut() {
        save_checkpoint(cp, &mut summary);
    }
    if let Err(e) = sink.flush() {
        warn!("error flushing output: {}", e);
    }
    result.map(|_| summary)
}
