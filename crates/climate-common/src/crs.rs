//! Coordinate reference system tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::GridError;

/// A coordinate reference system identified by its EPSG code.
///
/// Grids only carry the tag; two grids can be combined when their tags are
/// equal. `CRS:84` is normalised to `EPSG:4326`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    /// Create a CRS tag from an EPSG code.
    pub const fn epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// WGS84 geographic (lat/lon in degrees).
    pub const fn wgs84() -> Self {
        Self::epsg(4326)
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4269 | 4258)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl FromStr for Crs {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        if normalized == "CRS:84" {
            return Ok(Self::wgs84());
        }
        normalized
            .strip_prefix("EPSG:")
            .and_then(|code| code.parse::<u32>().ok())
            .map(Self::epsg)
            .ok_or_else(|| GridError::InvalidCrs(s.to_string()))
    }
}

impl TryFrom<String> for Crs {
    type Error = GridError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}
