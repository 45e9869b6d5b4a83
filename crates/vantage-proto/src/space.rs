use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtoError;

/// Coordinate space a matrix maps from or into.
///
/// - `Data`: world space, transformed by the camera's view and projection
/// - `Pixel`: device pixels, origin bottom-left
/// - `Relative`: the unit square `[0, 1] x [0, 1]` over the viewport
/// - `Clip`: post-projection space
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Space {
    Data,
    Pixel,
    Relative,
    Clip,
}

impl Space {
    pub const fn as_str(self) -> &'static str {
        match self {
            Space::Data => "data",
            Space::Pixel => "pixel",
            Space::Relative => "relative",
            Space::Clip => "clip",
        }
    }
}

impl FromStr for Space {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(Space::Data),
            "pixel" => Ok(Space::Pixel),
            "relative" => Ok(Space::Relative),
            "clip" => Ok(Space::Clip),
            other => Err(ProtoError::UnknownSpace(other.to_string())),
        }
    }
}

impl TryFrom<String> for Space {
    type Error = ProtoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Space> for String {
    fn from(s: Space) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Space a plot's geometry is authored in.
///
/// Decides which camera outputs get wired into the plot's camera uniforms.
/// `None` wires nothing; the plot supplies its own matrices.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CoordinateSpace {
    Space(Space),
    None,
}

impl TryFrom<String> for CoordinateSpace {
    type Error = ProtoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "none" {
            return Ok(CoordinateSpace::None);
        }
        s.parse().map(CoordinateSpace::Space)
    }
}

impl From<CoordinateSpace> for String {
    fn from(s: CoordinateSpace) -> Self {
        match s {
            CoordinateSpace::Space(space) => space.as_str().to_string(),
            CoordinateSpace::None => "none".to_string(),
        }
    }
}

impl Default for CoordinateSpace {
    fn default() -> Self {
        CoordinateSpace::Space(Space::Data)
    }
}

/// `(space, markerspace)` pair selecting a preprojection matrix.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PickingSpaces {
    pub space: Space,
    pub markerspace: Space,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_space() {
        for s in ["data", "pixel", "relative", "clip"] {
            let space: Space = s.parse().unwrap();
            assert_eq!(space.as_str(), s);
        }
    }

    #[test]
    fn unknown_space_is_an_error() {
        let err = "screen".parse::<Space>().unwrap_err();
        assert_eq!(err, ProtoError::UnknownSpace("screen".into()));
    }

    #[test]
    fn unknown_space_fails_json_decode() {
        let err = serde_json::from_str::<Space>("\"world\"").unwrap_err();
        assert!(err.to_string().contains("unknown coordinate space `world`"));
    }

    #[test]
    fn coordinate_space_accepts_none() {
        let cs: CoordinateSpace = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(cs, CoordinateSpace::None);
        let cs: CoordinateSpace = serde_json::from_str("\"pixel\"").unwrap();
        assert_eq!(cs, CoordinateSpace::Space(Space::Pixel));
    }
}
