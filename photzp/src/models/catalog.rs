use serde::{Deserialize, Serialize};
use std::fmt;

/// Sky position in equatorial coordinates (ICRS, degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPosition {
    pub ra: qtty::Degrees,
    pub dec: qtty::Degrees,
}

impl SkyPosition {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self {
            ra: qtty::Degrees::new(ra),
            dec: qtty::Degrees::new(dec),
        }
    }

    /// Unit vector on the celestial sphere.
    pub fn to_unit_vector(&self) -> [f64; 3] {
        let ra = self.ra.value().to_radians();
        let dec = self.dec.value().to_radians();
        let cos_dec = dec.cos();
        [cos_dec * ra.cos(), cos_dec * ra.sin(), dec.sin()]
    }

    /// Great-circle separation to another position.
    pub fn separation(&self, other: &SkyPosition) -> qtty::Arcseconds {
        let a = self.to_unit_vector();
        let b = other.to_unit_vector();
        let chord = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt();
        qtty::Degrees::new(angle_from_chord(chord).to_degrees()).to::<qtty::Arcsecond>()
    }
}

/// Converts the straight-line distance between two unit vectors into the
/// angle (radians) they subtend.
pub fn angle_from_chord(chord: f64) -> f64 {
    2.0 * (chord / 2.0).clamp(0.0, 1.0).asin()
}

/// Photometric bands carried by the reference catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceBand {
    #[serde(rename = "u")]
    SdssU,
    #[serde(rename = "g")]
    SdssG,
    #[serde(rename = "r")]
    SdssR,
    #[serde(rename = "i")]
    SdssI,
    #[serde(rename = "z")]
    SdssZ,
    #[serde(rename = "y")]
    SdssY,
    #[serde(rename = "U")]
    JohnsonU,
    #[serde(rename = "B")]
    JohnsonB,
    #[serde(rename = "V")]
    JohnsonV,
    #[serde(rename = "R")]
    JohnsonR,
    #[serde(rename = "I")]
    JohnsonI,
}

impl ReferenceBand {
    pub const ALL: [ReferenceBand; 11] = [
        ReferenceBand::SdssU,
        ReferenceBand::SdssG,
        ReferenceBand::SdssR,
        ReferenceBand::SdssI,
        ReferenceBand::SdssZ,
        ReferenceBand::SdssY,
        ReferenceBand::JohnsonU,
        ReferenceBand::JohnsonB,
        ReferenceBand::JohnsonV,
        ReferenceBand::JohnsonR,
        ReferenceBand::JohnsonI,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceBand::SdssU => "u",
            ReferenceBand::SdssG => "g",
            ReferenceBand::SdssR => "r",
            ReferenceBand::SdssI => "i",
            ReferenceBand::SdssZ => "z",
            ReferenceBand::SdssY => "y",
            ReferenceBand::JohnsonU => "U",
            ReferenceBand::JohnsonB => "B",
            ReferenceBand::JohnsonV => "V",
            ReferenceBand::JohnsonR => "R",
            ReferenceBand::JohnsonI => "I",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ReferenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Magnitude and its uncertainty in one band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandMagnitude {
    pub mag: f64,
    pub err: f64,
}

/// A star from the reference catalog with per-band photometry.
///
/// Bands the catalog does not provide are absent; transforms fill in
/// derived systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStar {
    pub position: SkyPosition,
    magnitudes: [Option<BandMagnitude>; 11],
}

impl ReferenceStar {
    pub fn new(position: SkyPosition) -> Self {
        Self {
            position,
            magnitudes: [None; 11],
        }
    }

    /// Builder-style setter for one band.
    pub fn with_band(mut self, band: ReferenceBand, mag: f64, err: f64) -> Self {
        self.set_band(band, mag, err);
        self
    }

    pub fn set_band(&mut self, band: ReferenceBand, mag: f64, err: f64) {
        self.magnitudes[band.index()] = Some(BandMagnitude { mag, err });
    }

    pub fn band(&self, band: ReferenceBand) -> Option<BandMagnitude> {
        self.magnitudes[band.index()]
    }

    pub fn mag(&self, band: ReferenceBand) -> Option<f64> {
        self.band(band).map(|b| b.mag)
    }

    /// The g − i color used by the zeropoint fit.
    pub fn color_gi(&self) -> Option<f64> {
        Some(self.mag(ReferenceBand::SdssG)? - self.mag(ReferenceBand::SdssI)?)
    }
}

/// A source measured on the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    /// Background-subtracted flux in detector units.
    pub flux: f64,
}

impl Detection {
    pub fn new(x: f64, y: f64, flux: f64) -> Self {
        Self { x, y, flux }
    }

    /// −2.5·log10(flux / exptime). NaN for non-positive flux.
    pub fn instrumental_mag(&self, exposure: qtty::Seconds) -> f64 {
        if self.flux <= 0.0 || exposure.value() <= 0.0 {
            return f64::NAN;
        }
        -2.5 * (self.flux / exposure.value()).log10()
    }
}

/// A detection bound to its nearest reference star.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub detection_index: usize,
    pub reference_index: usize,
    pub x: f64,
    pub y: f64,
    pub flux: f64,
    pub position: SkyPosition,
    pub instrumental_mag: f64,
    pub reference_mag: f64,
    /// Reference g − i color.
    pub reference_color: f64,
    pub separation: qtty::Arcseconds,
}

impl MatchedPair {
    /// Reference magnitude minus instrumental magnitude.
    pub fn mag_difference(&self) -> f64 {
        self.reference_mag - self.instrumental_mag
    }
}
