//! Rescale the integer samples of miniseed3 records and repack them as Steim-2.
//!
//! The codec reads and writes miniseed3, see <https://docs.fdsn.org/projects/miniSEED3>.
//! On top of it sit the sample transform ([`scale`]), the repacker ([`trace`]), output
//! sinks ([`sink`]) and the batch and stream drivers ([`pipeline`]) used by the `msscale`
//! and `slscale` binaries. [`datalink`] and [`seedlink`] are the network clients the
//! stream driver runs against.

mod data_encoding;
mod encoded_timeseries;
mod extra_headers;
mod fdsn_source_identifier;
mod header;
mod link_error;
mod mseed_error;
mod reader;
mod record;
mod steim1;
mod steim2;
mod steim_frame_block;

pub mod cancel;
pub mod datalink;
pub mod logging;
pub mod pipeline;
pub mod scale;
pub mod seedlink;
pub mod sink;
pub mod trace;

use std::io::BufRead;

pub use self::data_encoding::DataEncoding;
pub use self::encoded_timeseries::{EncodedTimeseries, SampleType};
pub use self::extra_headers::ExtraHeaders;
pub use self::fdsn_source_identifier::{FdsnSourceIdentifier, SourceIdentifier};
pub use self::header::{MSeed3Header, FIXED_HEADER_SIZE};
pub use self::link_error::LinkError;
pub use self::mseed_error::MSeedError;
pub use self::reader::RecordReader;
pub use self::record::{read_record_bytes, MSeed3Record, CASTAGNOLI};
pub use self::steim_frame_block::FRAME_SIZE;

/// Read all miniseed3 records from a BufReader, decompressing their samples.
///
/// #Example
///
/// ```
/// use mseedscale::MSeedError;
/// # fn main() -> Result<(), MSeedError> {
/// # use chrono::{DateTime, Utc};
/// # let start = "2014-11-28T12:00:09Z".parse::<DateTime<Utc>>()?;
/// # let bytes = mseedscale::MSeed3Record::from_ints(start, 1.0, vec![1, 2, 3]).to_bytes()?;
/// let mut buf_reader = std::io::BufReader::new(&bytes[..]);
/// let records = mseedscale::read_mseed3(&mut buf_reader)?;
/// assert_eq!(records[0].int_samples(), Some(&[1, 2, 3][..]));
/// # Ok(())
/// # }
/// ```
///
pub fn read_mseed3<R: BufRead>(buf_reader: &mut R) -> Result<Vec<MSeed3Record>, MSeedError> {
    let mut records: Vec<MSeed3Record> = Vec::new();
    for bytes in RecordReader::new(buf_reader) {
        let mut rec = MSeed3Record::from_bytes(&bytes?)?;
        rec.decompress()?;
        records.push(rec);
    }
    Ok(records)
}
