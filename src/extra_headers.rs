use crate::mseed_error::MSeedError;
use serde_json::map::Map;
use serde_json::Value;
use std::fmt;

/// The json extra headers of a record. Kept as the raw text read from the record until
/// something asks for the parsed form, so records can be repacked without touching them.
#[derive(Debug, Clone)]
pub struct ExtraHeaders {
    raw_str: Option<String>,
    map: Map<String, Value>,
}

impl ExtraHeaders {
    pub fn new() -> ExtraHeaders {
        ExtraHeaders {
            raw_str: None,
            map: Map::new(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.raw_str.is_none()
    }

    /// Parses the raw text into a json object. On error the raw text is kept.
    pub fn parse(&mut self) -> Result<(), MSeedError> {
        if let Some(s) = &self.raw_str {
            match serde_json::from_str::<Value>(s)? {
                Value::Object(map) => {
                    self.map = map;
                    self.raw_str = None;
                }
                v => return Err(MSeedError::ExtraHeaderNotObject(v)),
            }
        }
        Ok(())
    }

    /// The bytes written to a record. An empty object is written as nothing.
    pub fn to_record_bytes(&self) -> Vec<u8> {
        let s = self.to_string();
        if s.trim() == "{}" || s.is_empty() {
            Vec::new()
        } else {
            s.into_bytes()
        }
    }
}

impl Default for ExtraHeaders {
    fn default() -> Self {
        ExtraHeaders::new()
    }
}

impl From<String> for ExtraHeaders {
    fn from(s: String) -> Self {
        ExtraHeaders {
            raw_str: Some(s),
            map: Map::new(),
        }
    }
}

impl fmt::Display for ExtraHeaders {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.raw_str {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "{}", Value::Object(self.map.clone())),
        }
    }
}
