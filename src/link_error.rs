use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("not connected to `{0}`")]
    NotConnected(String),
    #[error("cannot resolve server address `{0}`")]
    Address(String),
    #[error("server `{0}` is not writable")]
    NotWritable(String),
    #[error("server refused request: {0}")]
    Refused(String),
    #[error("unexpected reply from server: {0}")]
    Protocol(String),
    #[error("connection to `{0}` closed by server")]
    Closed(String),
    #[error("stream selection error: {0}")]
    Selection(String),
}
