//! Which stations and streams to subscribe to.

use std::fmt;
use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::link_error::LinkError;

lazy_static! {
    static ref STATION_REGEX: Regex = Regex::new(
        r"(?x)^
            (?P<net>[A-Z0-9*?]{1,8})_    # network, wildcards allowed
            (?P<sta>[-A-Z0-9*?]{1,8})$   # station
"
    )
    .unwrap();
    static ref SELECTOR_REGEX: Regex = Regex::new(r"^!?[-A-Z0-9*?._:]+$").unwrap();
}

pub const DEFAULT_SELECTORS: &str = "?TH";
/// Station pattern used when no stations are listed.
pub const ALL_STATIONS: &str = "*_*";

/// One `STATION` request and its `SELECT` patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSelection {
    /// `NET_STA`, possibly with wildcards.
    pub station: String,
    pub selectors: Vec<String>,
}

impl StationSelection {
    pub fn new(station: &str, selectors: Vec<String>) -> Result<StationSelection, LinkError> {
        let station = station.trim().to_uppercase();
        if !STATION_REGEX.is_match(&station) {
            return Err(LinkError::Selection(format!("bad station `{}`", station)));
        }
        for sel in &selectors {
            if !SELECTOR_REGEX.is_match(sel) {
                return Err(LinkError::Selection(format!(
                    "bad selector `{}` for {}",
                    sel, station
                )));
            }
        }
        Ok(StationSelection { station, selectors })
    }

    pub fn has_wildcard(&self) -> bool {
        self.station.contains(['*', '?'])
    }
}

impl fmt::Display for StationSelection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.station)?;
        if !self.selectors.is_empty() {
            write!(f, ":{}", self.selectors.join(" "))?;
        }
        Ok(())
    }
}

fn split_selectors(s: &str) -> Vec<String> {
    s.split_whitespace().map(|t| t.to_uppercase()).collect()
}

/// Selectors to use when a station names none of its own.
pub fn default_selectors(selectors: &str) -> Vec<String> {
    split_selectors(selectors)
}

/// Parses `NET_STA[:sel sel],NET_STA...`. Stations without selectors get `defaults`.
pub fn parse_multiselect(
    streams: &str,
    defaults: &[String],
) -> Result<Vec<StationSelection>, LinkError> {
    let mut stations = Vec::new();
    for item in streams.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (station, selectors) = match item.split_once(':') {
            Some((station, sels)) => (station, split_selectors(sels)),
            None => (item, Vec::new()),
        };
        let selectors = if selectors.is_empty() {
            defaults.to_vec()
        } else {
            selectors
        };
        stations.push(StationSelection::new(station, selectors)?);
    }
    if stations.is_empty() {
        return Err(LinkError::Selection(format!("no stations in `{}`", streams)));
    }
    Ok(stations)
}

/// Parses stream list text, one `NET STA [selectors...]` per line. Blank lines and lines
/// starting with `#` are ignored.
pub fn parse_stream_list(
    text: &str,
    defaults: &[String],
) -> Result<Vec<StationSelection>, LinkError> {
    let mut stations = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (net, sta) = match (fields.next(), fields.next()) {
            (Some(net), Some(sta)) => (net, sta),
            _ => {
                return Err(LinkError::Selection(format!(
                    "line {}: expected `NET STA [selectors]`, got `{}`",
                    lineno + 1,
                    line
                )))
            }
        };
        let mut selectors: Vec<String> = fields.map(str::to_uppercase).collect();
        if selectors.is_empty() {
            selectors = defaults.to_vec();
        }
        stations.push(StationSelection::new(&format!("{}_{}", net, sta), selectors)?);
    }
    if stations.is_empty() {
        return Err(LinkError::Selection(String::from("stream list is empty")));
    }
    Ok(stations)
}

pub fn read_stream_list(
    path: &Path,
    defaults: &[String],
) -> Result<Vec<StationSelection>, LinkError> {
    let text = fs::read_to_string(path)?;
    parse_stream_list(&text, defaults)
}

/// A single selection covering every station the server offers.
pub fn all_stations(defaults: &[String]) -> Result<Vec<StationSelection>, LinkError> {
    Ok(vec![StationSelection::new(ALL_STATIONS, defaults.to_vec())?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiselect() -> Result<(), LinkError> {
        let defaults = default_selectors(DEFAULT_SELECTORS);
        let stations = parse_multiselect("NZ_WEL:HH? BN?, nz_tsz", &defaults)?;
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].station, "NZ_WEL");
        assert_eq!(stations[0].selectors, vec!["HH?", "BN?"]);
        assert_eq!(stations[1].station, "NZ_TSZ");
        assert_eq!(stations[1].selectors, vec!["?TH"]);
        assert_eq!(stations[0].to_string(), "NZ_WEL:HH? BN?");
        Ok(())
    }

    #[test]
    fn bad_multiselect() {
        assert!(parse_multiselect("NZWEL", &[]).is_err());
        assert!(parse_multiselect(" , ", &[]).is_err());
        assert!(parse_multiselect("NZ_WEL:HH#", &[]).is_err());
    }

    #[test]
    fn stream_list() -> Result<(), LinkError> {
        let text = "# stations\nNZ WEL\n\n  IU ANMO BHZ 00BH?\n";
        let stations = parse_stream_list(text, &default_selectors("?TH"))?;
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].selectors, vec!["?TH"]);
        assert_eq!(stations[1].station, "IU_ANMO");
        assert_eq!(stations[1].selectors, vec!["BHZ", "00BH?"]);
        Ok(())
    }

    #[test]
    fn stream_list_errors() {
        assert!(parse_stream_list("NZ\n", &[]).is_err());
        assert!(parse_stream_list("# nothing\n", &[]).is_err());
    }

    #[test]
    fn read_from_file() -> Result<(), LinkError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("streams");
        fs::write(&path, "NZ WEL HHZ\n")?;
        let stations = read_stream_list(&path, &[])?;
        assert_eq!(stations[0].to_string(), "NZ_WEL:HHZ");
        assert!(read_stream_list(&dir.path().join("missing"), &[]).is_err());
        Ok(())
    }

    #[test]
    fn wildcard_everything() -> Result<(), LinkError> {
        let stations = all_stations(&default_selectors(DEFAULT_SELECTORS))?;
        assert!(stations[0].has_wildcard());
        assert_eq!(stations[0].to_string(), "*_*:?TH");
        Ok(())
    }
}
