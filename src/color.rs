//! Colorimetric conversion: 3-vectors, 3×3 matrices and the device-RGB
//! to XYZ pipeline used to interpret HUEY samples.
//!
//! The conversion is dark-offset subtraction followed by a 3×3 matrix
//! multiply, with scalar pre/post calibration factors.  Also provides the
//! generic matrix operations (multiply, Cramer's-rule invert) and guarded
//! Yxy↔XYZ conversions.

use std::fmt;

/// Determinants smaller than this are treated as singular.
const DETERMINANT_EPS: f64 = 1e-6;

/// Guard for divisions in the Yxy↔XYZ conversions.
const DIVISOR_EPS: f64 = 1e-6;

/// A color triple.  Interpreted as native RGB or XYZ depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Elementwise scale.
    pub fn scale(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Elementwise subtraction.
    pub fn sub(self, other: Vec3) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} {:.6} {:.6}", self.x, self.y, self.z)
    }
}

/// Luminance plus chromaticity coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Yxy {
    /// Luminance (Y).
    pub luminance: f64,
    /// x chromaticity.
    pub x: f64,
    /// y chromaticity.
    pub y: f64,
}

/// A row-major 3×3 matrix of doubles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3x3 {
    pub m: [f64; 9],
}

impl Mat3x3 {
    pub fn new(m: [f64; 9]) -> Self {
        Self { m }
    }

    pub fn identity() -> Self {
        Self::new([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    /// Matrix-vector multiply.
    pub fn transform(&self, v: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0] * v.x + m[1] * v.y + m[2] * v.z,
            m[3] * v.x + m[4] * v.y + m[5] * v.z,
            m[6] * v.x + m[7] * v.y + m[8] * v.z,
        )
    }

    /// Matrix-matrix multiply, `self × other`.
    pub fn multiply(&self, other: &Mat3x3) -> Mat3x3 {
        let a = &self.m;
        let b = &other.m;
        let mut out = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = a[row * 3] * b[col]
                    + a[row * 3 + 1] * b[3 + col]
                    + a[row * 3 + 2] * b[6 + col];
            }
        }
        Mat3x3::new(out)
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
            + m[2] * (m[3] * m[7] - m[4] * m[6])
    }

    /// Invert via Cramer's rule (cofactor expansion).
    ///
    /// Returns `None` when the determinant magnitude is below 1e-6 rather
    /// than producing a garbage result.
    pub fn invert(&self) -> Option<Mat3x3> {
        let det = self.determinant();
        if det.abs() < DETERMINANT_EPS {
            return None;
        }
        let m = &self.m;
        let inv_det = 1.0 / det;
        Some(Mat3x3::new([
            (m[4] * m[8] - m[5] * m[7]) * inv_det,
            (m[2] * m[7] - m[1] * m[8]) * inv_det,
            (m[1] * m[5] - m[2] * m[4]) * inv_det,
            (m[5] * m[6] - m[3] * m[8]) * inv_det,
            (m[0] * m[8] - m[2] * m[6]) * inv_det,
            (m[2] * m[3] - m[0] * m[5]) * inv_det,
            (m[3] * m[7] - m[4] * m[6]) * inv_det,
            (m[1] * m[6] - m[0] * m[7]) * inv_det,
            (m[0] * m[4] - m[1] * m[3]) * inv_det,
        ]))
    }
}

impl fmt::Display for Mat3x3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            writeln!(
                f,
                "{:.6} {:.6} {:.6}",
                self.m[row * 3],
                self.m[row * 3 + 1],
                self.m[row * 3 + 2]
            )?;
        }
        Ok(())
    }
}

/// Convert a native sensor RGB triple into XYZ.
///
/// Pipeline: elementwise pre-scale, dark-offset subtraction, 3×3
/// calibration multiply, elementwise post-scale.
pub fn convert_device_rgb_to_xyz(
    rgb: Vec3,
    calibration: &Mat3x3,
    dark_offset: Vec3,
    pre_scale: f64,
    post_scale: f64,
) -> Vec3 {
    let corrected = rgb.scale(pre_scale).sub(dark_offset);
    calibration.transform(corrected).scale(post_scale)
}

/// XYZ → Yxy.  A near-zero stimulus sum yields a zero result instead of
/// dividing by zero.
pub fn xyz_to_yxy(xyz: Vec3) -> Yxy {
    let sum = xyz.x + xyz.y + xyz.z;
    if sum.abs() < DIVISOR_EPS {
        return Yxy::default();
    }
    Yxy {
        luminance: xyz.y,
        x: xyz.x / sum,
        y: xyz.y / sum,
    }
}

/// Yxy → XYZ.  A near-zero y chromaticity yields a zero result.
pub fn yxy_to_xyz(yxy: Yxy) -> Vec3 {
    if yxy.y.abs() < DIVISOR_EPS || yxy.luminance.abs() < DIVISOR_EPS {
        return Vec3::default();
    }
    let scale = yxy.luminance / yxy.y;
    Vec3::new(yxy.x * scale, yxy.luminance, (1.0 - yxy.x - yxy.y) * scale)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
