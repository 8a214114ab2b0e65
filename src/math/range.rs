use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

static RANGE_TO_DEGREES: &[f64] = &[
    0.0741166859218728,
    0.1852917159505975,
    0.3705834319011951,
    0.7411668638023902,
    1.482333728177738,
    2.964667456355476,
    5.929334912710953,
    12.19177852817075,
    24.38355705691446,
];

static RANGE_TO_NAUTICAL_MILES: &[u32] = &[2, 5, 10, 20, 40, 80, 160, 320, 640];

/// The selectable display ranges of the map, named after the distance in nautical
/// miles from the aircraft to the top of the map.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Range {
    Nm2,
    Nm5,
    #[default]
    Nm10,
    Nm20,
    Nm40,
    Nm80,
    Nm160,
    Nm320,
    Nm640,
}

impl Range {
    pub const ALL: [Range; 9] = [
        Range::Nm2,
        Range::Nm5,
        Range::Nm10,
        Range::Nm20,
        Range::Nm40,
        Range::Nm80,
        Range::Nm160,
        Range::Nm320,
        Range::Nm640,
    ];

    /// The angle in degrees spanned from the top to the bottom of the map.
    pub fn vertical_degrees(self) -> f64 {
        RANGE_TO_DEGREES[self as usize]
    }

    pub fn horizontal_degrees(self, mode: DisplayMode) -> f64 {
        self.vertical_degrees() * mode.aspect_ratio()
    }

    pub fn nautical_miles(self) -> u32 {
        RANGE_TO_NAUTICAL_MILES[self as usize]
    }

    /// The count of tile rows that may be visible at once.
    pub fn vertical_tiles_loaded(self) -> u32 {
        self.vertical_degrees().ceil() as u32 + 1
    }

    /// The count of tile columns that may be visible at once.
    pub fn horizontal_tiles_loaded(self, mode: DisplayMode) -> u32 {
        self.horizontal_degrees(mode).ceil() as u32 + 1
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nautical_miles())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRangeError(String);

impl fmt::Display for ParseRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid range `{}`, expected one of 2, 5, 10, 20, 40, 80, 160, 320, 640",
            self.0
        )
    }
}

impl std::error::Error for ParseRangeError {}

impl FromStr for Range {
    type Err = ParseRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let miles: u32 = s.trim().parse().map_err(|_| ParseRangeError(s.to_string()))?;

        Range::ALL
            .into_iter()
            .find(|range| range.nautical_miles() == miles)
            .ok_or_else(|| ParseRangeError(s.to_string()))
    }
}

/// The layout of the display the map is drawn on, which determines its aspect ratio.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    HalfPage,
    FullPage,
}

impl DisplayMode {
    pub fn aspect_ratio(self) -> f64 {
        match self {
            DisplayMode::HalfPage => 0.71153846153,
            DisplayMode::FullPage => 1.42307692308,
        }
    }
}
