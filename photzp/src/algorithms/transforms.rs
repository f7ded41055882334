//! Photometric system transforms applied to reference catalog stars.
//!
//! PS1 → SDSS follows Finkbeiner et al. 2016 (Table 2), SDSS →
//! Johnson-Cousins follows Jordi, Grebel & Ammon 2005. Both are valid for
//! stars only.

use crate::models::{ReferenceBand, ReferenceStar};

/// Cubic in `c = g − i`, coefficients in ascending power.
struct Ps1Term {
    band: ReferenceBand,
    coefficients: [f64; 4],
}

const PS1_TO_SDSS: [Ps1Term; 6] = [
    Ps1Term {
        band: ReferenceBand::SdssU,
        coefficients: [0.04438, -2.26095, -0.13387, 0.27099],
    },
    Ps1Term {
        band: ReferenceBand::SdssG,
        coefficients: [-0.01808, -0.13595, 0.01941, -0.00183],
    },
    Ps1Term {
        band: ReferenceBand::SdssR,
        coefficients: [-0.01836, -0.03577, 0.02612, -0.00558],
    },
    Ps1Term {
        band: ReferenceBand::SdssI,
        coefficients: [0.01170, -0.00400, 0.00066, -0.00058],
    },
    Ps1Term {
        band: ReferenceBand::SdssZ,
        coefficients: [-0.01062, 0.07529, -0.03592, 0.00890],
    },
    Ps1Term {
        band: ReferenceBand::SdssY,
        coefficients: [0.08924, -0.20878, 0.10360, -0.02441],
    },
];

fn poly(coefficients: &[f64; 4], c: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, k| acc * c + k)
}

/// Converts a star with PS1 g r i z photometry to SDSS u g r i z y in place.
///
/// u is derived from PS1 g, y from the converted z. Stars without PS1 g
/// and i are left untouched.
pub fn ps1_to_sdss(star: &mut ReferenceStar) {
    let Some(color) = star.color_gi() else {
        return;
    };
    for term in &PS1_TO_SDSS {
        let correction = poly(&term.coefficients, color);
        let source = match term.band {
            ReferenceBand::SdssU => ReferenceBand::SdssG,
            ReferenceBand::SdssY => ReferenceBand::SdssZ,
            other => other,
        };
        if let Some(base) = star.band(source) {
            star.set_band(term.band, base.mag - correction, base.err);
        }
    }
}

/// `target = base + k·(c1 − c2) + offset`
struct JohnsonTerm {
    target: ReferenceBand,
    base: ReferenceBand,
    c1: ReferenceBand,
    c2: ReferenceBand,
    k: f64,
    offset: f64,
}

// U depends on B, so it comes last.
const SDSS_TO_JOHNSON: [JohnsonTerm; 5] = [
    JohnsonTerm {
        target: ReferenceBand::JohnsonB,
        base: ReferenceBand::SdssG,
        c1: ReferenceBand::SdssG,
        c2: ReferenceBand::SdssR,
        k: 0.313,
        offset: 0.219,
    },
    JohnsonTerm {
        target: ReferenceBand::JohnsonV,
        base: ReferenceBand::SdssG,
        c1: ReferenceBand::SdssG,
        c2: ReferenceBand::SdssR,
        k: -0.565,
        offset: -0.016,
    },
    JohnsonTerm {
        target: ReferenceBand::JohnsonR,
        base: ReferenceBand::SdssR,
        c1: ReferenceBand::SdssR,
        c2: ReferenceBand::SdssI,
        k: -0.153,
        offset: -0.117,
    },
    JohnsonTerm {
        target: ReferenceBand::JohnsonI,
        base: ReferenceBand::SdssI,
        c1: ReferenceBand::SdssI,
        c2: ReferenceBand::SdssZ,
        k: -0.386,
        offset: -0.397,
    },
    JohnsonTerm {
        target: ReferenceBand::JohnsonU,
        base: ReferenceBand::JohnsonB,
        c1: ReferenceBand::SdssU,
        c2: ReferenceBand::SdssG,
        k: 0.79,
        offset: -0.93,
    },
];

/// Adds Johnson-Cousins U B V R I derived from SDSS photometry. Bands whose
/// inputs are missing stay absent. Errors are copied from the base band.
pub fn sdss_to_johnson(star: &mut ReferenceStar) {
    for term in &SDSS_TO_JOHNSON {
        let (Some(base), Some(c1), Some(c2)) = (star.band(term.base), star.mag(term.c1), star.mag(term.c2))
        else {
            continue;
        };
        star.set_band(term.target, base.mag + term.k * (c1 - c2) + term.offset, base.err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkyPosition;

    fn ps1_star() -> ReferenceStar {
        ReferenceStar::new(SkyPosition::new(0.0, 0.0))
            .with_band(ReferenceBand::SdssG, 16.0, 0.01)
            .with_band(ReferenceBand::SdssR, 15.5, 0.01)
            .with_band(ReferenceBand::SdssI, 15.0, 0.02)
            .with_band(ReferenceBand::SdssZ, 14.8, 0.03)
    }

    #[test]
    fn test_poly_ascending_order() {
        assert!((poly(&[1.0, 2.0, 3.0, 4.0], 2.0) - 49.0).abs() < 1e-12);
    }

    #[test]
    fn test_ps1_to_sdss() {
        let mut star = ps1_star();
        ps1_to_sdss(&mut star);
        let c: f64 = 1.0;
        let g_corr = -0.01808 - 0.13595 * c + 0.01941 * c * c - 0.00183 * c.powi(3);
        let u_corr = 0.04438 - 2.26095 * c - 0.13387 * c * c + 0.27099 * c.powi(3);
        let z_corr = -0.01062 + 0.07529 * c - 0.03592 * c * c + 0.00890 * c.powi(3);
        let y_corr = 0.08924 - 0.20878 * c + 0.10360 * c * c - 0.02441 * c.powi(3);

        assert!((star.mag(ReferenceBand::SdssG).unwrap() - (16.0 - g_corr)).abs() < 1e-12);
        assert!((star.mag(ReferenceBand::SdssU).unwrap() - (16.0 - u_corr)).abs() < 1e-12);
        let z = 14.8 - z_corr;
        assert!((star.mag(ReferenceBand::SdssZ).unwrap() - z).abs() < 1e-12);
        assert!((star.mag(ReferenceBand::SdssY).unwrap() - (z - y_corr)).abs() < 1e-12);
        assert_eq!(star.band(ReferenceBand::SdssY).unwrap().err, 0.03);
    }

    #[test]
    fn test_ps1_to_sdss_needs_color() {
        let mut star = ReferenceStar::new(SkyPosition::new(0.0, 0.0)).with_band(ReferenceBand::SdssR, 15.0, 0.01);
        let before = star.clone();
        ps1_to_sdss(&mut star);
        assert_eq!(star, before);
    }

    #[test]
    fn test_sdss_to_johnson() {
        let mut star = ps1_star().with_band(ReferenceBand::SdssU, 17.5, 0.05);
        sdss_to_johnson(&mut star);
        let b = 16.0 + 0.313 * 0.5 + 0.219;
        assert!((star.mag(ReferenceBand::JohnsonB).unwrap() - b).abs() < 1e-12);
        assert!((star.mag(ReferenceBand::JohnsonV).unwrap() - (16.0 - 0.565 * 0.5 - 0.016)).abs() < 1e-12);
        assert!((star.mag(ReferenceBand::JohnsonR).unwrap() - (15.5 - 0.153 * 0.5 - 0.117)).abs() < 1e-12);
        assert!((star.mag(ReferenceBand::JohnsonI).unwrap() - (15.0 - 0.386 * 0.2 - 0.397)).abs() < 1e-12);
        assert!((star.mag(ReferenceBand::JohnsonU).unwrap() - (b + 0.79 * 1.5 - 0.93)).abs() < 1e-12);
    }

    #[test]
    fn test_sdss_to_johnson_skips_missing_inputs() {
        let mut star = ps1_star();
        sdss_to_johnson(&mut star);
        assert!(star.mag(ReferenceBand::JohnsonU).is_none());
        assert!(star.mag(ReferenceBand::JohnsonB).is_some());
    }
}
