//! Destinations for packed records.

use std::io::{self, Write};
use std::time::Duration;

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::link_error::LinkError;
use crate::record::MSeed3Record;

/// Wait between failed reconnect attempts to a push server.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// Outcome of handing one record to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The record was lost, processing carries on with the next one.
    Dropped,
    /// Shutdown was requested before the record could be delivered.
    Abandoned,
}

/// Receives each output record, synchronously and in order.
pub trait RecordSink {
    fn write_record(&mut self, record: &[u8]) -> Delivery;

    /// Pushes out anything buffered.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_record(&mut self, record: &[u8]) -> Delivery {
        (**self).write_record(record)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write_record(&mut self, record: &[u8]) -> Delivery {
        (**self).write_record(record)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Collects records in memory.
impl RecordSink for Vec<Vec<u8>> {
    fn write_record(&mut self, record: &[u8]) -> Delivery {
        self.push(record.to_vec());
        Delivery::Delivered
    }
}

/// Writes record bytes verbatim to a writer, typically stdout or a file.
pub struct DirectSink<W: Write> {
    writer: W,
}

impl<W: Write> DirectSink<W> {
    pub fn new(writer: W) -> DirectSink<W> {
        DirectSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for DirectSink<W> {
    fn write_record(&mut self, record: &[u8]) -> Delivery {
        match self.writer.write_all(record) {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                warn!("error writing record: {}", e);
                Delivery::Dropped
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// A connection to a server that accepts records, such as DataLink.
pub trait PushClient {
    fn is_connected(&self) -> bool;
    fn connect(&mut self) -> Result<(), LinkError>;
    fn disconnect(&mut self);
    /// Sends one record. Times are microseconds since the epoch.
    fn write(
        &mut self,
        stream_id: &str,
        start_us: i64,
        end_us: i64,
        record: &[u8],
    ) -> Result<(), LinkError>;
}

/// Pushes records to a server, reconnecting until the write succeeds or shutdown is
/// requested.
pub struct ForwardingSink<C: PushClient> {
    client: C,
    cancel: CancelToken,
    backoff: Duration,
}

impl<C: PushClient> ForwardingSink<C> {
    pub fn new(client: C, cancel: CancelToken) -> ForwardingSink<C> {
        ForwardingSink {
            client,
            cancel,
            backoff: RECONNECT_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> ForwardingSink<C> {
        self.backoff = backoff;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }
}

/// `<identifier>/MSEED3`, plus start and end in microseconds.
fn stream_info(record: &[u8]) -> Result<(String, i64, i64), crate::MSeedError> {
    let rec = MSeed3Record::from_bytes(record)?;
    let start = rec.header.get_start_as_utc()?;
    let end = rec.header.get_end_as_utc()?;
    Ok((
        format!("{}/MSEED3", rec.identifier),
        start.timestamp_micros(),
        end.timestamp_micros(),
    ))
}

impl<C: PushClient> RecordSink for ForwardingSink<C> {
    fn write_record(&mut self, record: &[u8]) -> Delivery {
        let (stream_id, start_us, end_us) = match stream_info(record) {
            Ok(info) => info,
            Err(e) => {
                warn!("error unpacking record for forwarding: {}", e);
                return Delivery::Dropped;
            }
        };

        loop {
            match self.client.write(&stream_id, start_us, end_us, record) {
                Ok(()) => {
                    debug!("sent {} ({} bytes)", stream_id, record.len());
                    return Delivery::Delivered;
                }
                Err(e) => info!("re-connecting to datalink server after: {}", e),
            }
            if self.cancel.is_cancelled() {
                return Delivery::Abandoned;
            }
            if self.client.is_connected() {
                self.client.disconnect();
            }
            if let Err(e) = self.client.connect() {
                warn!(
                    "error re-connecting to datalink server, sleeping {} seconds: {}",
                    self.backoff.as_secs(),
                    e
                );
                if !self.cancel.sleep(self.backoff) {
                    return Delivery::Abandoned;
                }
            }
        }
    }
}
