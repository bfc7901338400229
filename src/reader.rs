use std::io::BufRead;

use crate::mseed_error::MSeedError;
use crate::record::read_record_bytes;

/// Iterates over the raw bytes of consecutive records in a stream. Stops cleanly at end of
/// input; a stream that ends part way through a record yields an error.
pub struct RecordReader<R> {
    buf_reader: R,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(buf_reader: R) -> RecordReader<R> {
        RecordReader {
            buf_reader,
            done: false,
        }
    }

    /// The next record's bytes, or `None` at end of input.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>, MSeedError> {
        if self.done || self.buf_reader.fill_buf()?.is_empty() {
            self.done = true;
            return Ok(None);
        }
        read_record_bytes(&mut self.buf_reader).map(Some)
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>, MSeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(bytes)) => Some(Ok(bytes)),
            Ok(None) => None,
            Err(e) => {
                // no way to resync on a broken stream
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MSeed3Record;
    use chrono::{DateTime, Utc};
    use std::io::Cursor;

    fn two_records() -> Result<Vec<u8>, MSeedError> {
        let start = "2014-11-28T12:00:09Z".parse::<DateTime<Utc>>()?;
        let mut stream = MSeed3Record::from_ints(start, 1.0, vec![5, 6]).to_bytes()?;
        stream.extend(MSeed3Record::from_ints(start, 1.0, vec![7]).to_bytes()?);
        Ok(stream)
    }

    #[test]
    fn reads_until_eof() -> Result<(), MSeedError> {
        let reader = RecordReader::new(Cursor::new(two_records()?));
        let records = reader.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[test]
    fn truncated_stream_errors_once() -> Result<(), MSeedError> {
        let mut stream = two_records()?;
        stream.truncate(stream.len() - 3);
        let mut reader = RecordReader::new(Cursor::new(stream));
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
        Ok(())
    }

    #[test]
    fn empty_input() -> Result<(), MSeedError> {
        let mut reader = RecordReader::new(Cursor::new(Vec::new()));
        assert!(reader.next_record()?.is_none());
        Ok(())
    }
}
