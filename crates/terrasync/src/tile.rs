use std::fmt;
use std::str::FromStr;

/// Errors produced when parsing or constructing a tile name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileNameError {
    #[error("not a tile name: {0:?}")]
    Malformed(String),

    #[error("latitude {0} out of range")]
    Latitude(i32),

    #[error("longitude {0} out of range")]
    Longitude(i32),
}

/// A 1°×1° scenery tile identified by its south-west corner.
///
/// Names follow the `[ew]DDD[ns]DD` scheme, e.g. `e012n45` or `w123s09`.
/// West longitudes and south latitudes are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileName {
    lat: i32,
    lon: i32,
}

impl TileName {
    /// Latitude is accepted in `-90..=90`, longitude in `-180..180`.
    pub fn new(lat: i32, lon: i32) -> Result<Self, TileNameError> {
        if !(-90..=90).contains(&lat) {
            return Err(TileNameError::Latitude(lat));
        }
        if !(-180..180).contains(&lon) {
            return Err(TileNameError::Longitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// The tile containing a point, flooring both coordinates.
    pub fn containing(lat: f64, lon: f64) -> Result<Self, TileNameError> {
        Self::new(lat.floor() as i32, lon.floor() as i32)
    }

    pub fn lat(&self) -> i32 {
        self.lat
    }

    pub fn lon(&self) -> i32 {
        self.lon
    }

    /// The 10°×10° cell this tile lives in, named like a tile.
    pub fn container(&self) -> TileName {
        TileName {
            lat: self.lat.div_euclid(10) * 10,
            lon: self.lon.div_euclid(10) * 10,
        }
    }

    /// Path of the tile below a directory type: `e010n40/e012n45`.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.container(), self)
    }

    /// Tile offset by whole degrees, or `None` past the poles or the antimeridian.
    pub fn neighbour(&self, dlat: i32, dlon: i32) -> Option<TileName> {
        let lat = self.lat.checked_add(dlat)?;
        let lon = self.lon.checked_add(dlon)?;
        TileName::new(lat, lon).ok()
    }

    /// True if `name` is shaped like a tile name.
    pub fn is_tile_name(name: &str) -> bool {
        name.parse::<TileName>().is_ok()
    }
}

impl fmt::Display for TileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ew = if self.lon < 0 { 'w' } else { 'e' };
        let ns = if self.lat < 0 { 's' } else { 'n' };
        write!(
            f,
            "{ew}{:03}{ns}{:02}",
            self.lon.unsigned_abs(),
            self.lat.unsigned_abs()
        )
    }
}

impl FromStr for TileName {
    type Err = TileNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TileNameError::Malformed(s.to_owned());
        let bytes = s.as_bytes();
        if bytes.len() != 7 || !s.is_ascii() {
            return Err(malformed());
        }

        let lon_sign = match bytes[0] {
            b'e' => 1,
            b'w' => -1,
            _ => return Err(malformed()),
        };
        let lat_sign = match bytes[4] {
            b'n' => 1,
            b's' => -1,
            _ => return Err(malformed()),
        };

        let digits = |range: std::ops::Range<usize>| -> Result<i32, TileNameError> {
            let part = &s[range];
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            part.parse().map_err(|_| malformed())
        };

        let lon = digits(1..4)? * lon_sign;
        let lat = digits(5..7)? * lat_sign;
        TileName::new(lat, lon)
    }
}
