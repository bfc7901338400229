use chrono::ParseError;
use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MSeedError {
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Insufficient bytes, {0} < expected size {1}")]
    InsufficientBytes(usize, usize),
    #[error("CRC invalid for record: calc:{0:#X} header:{1:#X}")]
    CrcInvalid(u32, u32),
    #[error("Text not UTF8")]
    FromUtf8Error(#[from] FromUtf8Error),
    #[error("cannot parse extra headers")]
    JsonError(#[from] serde_json::Error),
    #[error("MSeed3 header must start with MS, (77, 83)  but was `{0}{1}`")]
    BadRecordIndicator(u8, u8),
    #[error("MSeed3 header format_version must be 3 but was `{0}`")]
    UnknownFormatVersion(u8),
    #[error("invalid start time in header: year {0} day {1} {2:02}:{3:02}:{4:02}.{5:09}")]
    BadStartTime(u16, u16, u8, u8, u8, u32),
    #[error("cannot parse {1} in FDSN source identifier `{0}`")]
    IdentifierParse(String, String),
    #[error("extra headers must be a json object but was: `{0}`")]
    ExtraHeaderNotObject(serde_json::Value),
    #[error("Unknown data encoding: `{0}`")]
    UnknownEncoding(u8),
    #[error("cannot pack records with encoding `{0}`, only Steim-2 is supported")]
    UnsupportedEncoding(u8),
    #[error("Expected {0} bytes for {1} samples as encoding type {2} but header has data_length={3} bytes.",)]
    DataLength(u32, u32, u8, u32),
    #[error("Date parsing error: `{0}`")]
    ParseError(#[from] ParseError),
    #[error("record length {0} cannot hold {1} bytes of header plus one 64 byte frame")]
    RecordLength(usize, usize),
    #[error("MSeed3 compression/decompression error: `{0}`")]
    Compression(String),
    #[error("checkpoint error: `{0}`")]
    Checkpoint(String),
}
