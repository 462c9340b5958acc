//! Spherical angles and rigid rotations on the unit sphere.

use std::f64::consts::{FRAC_PI_2, TAU};

use serde::{Deserialize, Serialize};

/// Largest deviation of [`small_angle_cos`] from `cos` for angles below π/6.
pub const SMALL_ANGLE_EPSILON: f64 = 1e-6;

/// Polynomial cosine for small angles: `1 - a²/2 + a⁴/24 - a⁶/720`.
/// The truncation error is below `a⁸/40320`, about 1.4e-7 at π/6.
#[inline]
pub fn small_angle_cos(a: f64) -> f64 {
    let a2 = a * a;
    1.0 - a2 * (0.5 - a2 * (1.0 / 24.0 - a2 / 720.0))
}

/// Longitude/latitude of a point on the unit sphere, with cached latitude
/// trigonometry. `theta` is in `[0, 2π)`, `phi` in `[-π/2, π/2]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngularPoint {
    pub theta: f64,
    pub phi: f64,
    pub cos_phi: f64,
    pub sin_phi: f64,
}

impl AngularPoint {
    pub fn new(theta: f64, phi: f64) -> Self {
        Self {
            theta: theta.rem_euclid(TAU),
            phi,
            cos_phi: phi.cos(),
            sin_phi: phi.sin(),
        }
    }

    pub fn from_cartesian(v: [f64; 3]) -> Self {
        let [x, y, z] = v;
        let len = (x * x + y * y + z * z).sqrt();
        let z = (z / len).clamp(-1.0, 1.0);
        let phi = z.asin();
        let theta = if x == 0.0 && y == 0.0 { 0.0 } else { y.atan2(x) };
        Self::new(theta, phi)
    }

    pub fn to_cartesian(&self) -> [f64; 3] {
        [
            self.cos_phi * self.theta.cos(),
            self.cos_phi * self.theta.sin(),
            self.sin_phi,
        ]
    }

    /// Exact chord-squared distance, `2·(1 - cos(central angle))`.
    pub fn chord_squared(&self, other: &AngularPoint) -> f64 {
        let cos_dtheta = (self.theta - other.theta).cos();
        (2.0 * (1.0 - self.sin_phi * other.sin_phi - self.cos_phi * other.cos_phi * cos_dtheta))
            .abs()
    }

    /// Area-corrected acceptance: `uniform > threshold^cos(phi)`.
    ///
    /// Rows near the poles cover less solid angle, so they must pass a
    /// harder test to be sampled as often per unit area as the equator.
    pub fn test_momentum(&self, uniform: f64, threshold: f64) -> bool {
        uniform > threshold.powf(self.cos_phi)
    }

    pub fn is_finite(&self) -> bool {
        self.theta.is_finite() && self.phi.is_finite()
    }
}

/// The three angles of a plate step: the rotation axis direction and the
/// time-scaled rotation angle about it.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationAngles {
    pub axis_theta: f64,
    pub axis_phi: f64,
    pub angle: f64,
}

impl RotationAngles {
    pub fn new(axis_theta: f64, axis_phi: f64, angle: f64) -> Self {
        Self { axis_theta, axis_phi, angle }
    }

    /// Same axis, opposite sense.
    pub fn inverse(&self) -> Self {
        Self { angle: -self.angle, ..*self }
    }

    pub fn is_finite(&self) -> bool {
        self.axis_theta.is_finite() && self.axis_phi.is_finite() && self.angle.is_finite()
    }
}

/// A 3x3 rotation matrix acting on Cartesian unit vectors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotation {
    m: [[f64; 3]; 3],
}

impl Rotation {
    pub const IDENTITY: Rotation = Rotation {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    pub fn about_x(a: f64) -> Self {
        let (s, c) = a.sin_cos();
        Self { m: [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]] }
    }

    pub fn about_y(a: f64) -> Self {
        let (s, c) = a.sin_cos();
        Self { m: [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]] }
    }

    pub fn about_z(a: f64) -> Self {
        let (s, c) = a.sin_cos();
        Self { m: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]] }
    }

    /// Apply `self`, then `next`.
    pub fn then(&self, next: &Rotation) -> Rotation {
        let mut m = [[0.0; 3]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| next.m[i][k] * self.m[k][j]).sum();
            }
        }
        Rotation { m }
    }

    /// Rotation by `angles.angle` about the axis at `(axis_theta, axis_phi)`.
    ///
    /// The axis is turned onto +Z (about Z, then about Y), the plate angle is
    /// applied about Z, and the alignment is undone in reverse order.
    pub fn from_angles(angles: &RotationAngles) -> Rotation {
        if angles.angle == 0.0 {
            return Rotation::IDENTITY;
        }
        let tilt = FRAC_PI_2 - angles.axis_phi;
        Rotation::about_z(-angles.axis_theta)
            .then(&Rotation::about_y(-tilt))
            .then(&Rotation::about_z(angles.angle))
            .then(&Rotation::about_y(tilt))
            .then(&Rotation::about_z(angles.axis_theta))
    }

    /// The inverse of a rotation is its transpose.
    pub fn inverse(&self) -> Rotation {
        let mut m = [[0.0; 3]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.m[j][i];
            }
        }
        Rotation { m }
    }

    pub fn apply(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.m;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    pub fn rotate_point(&self, p: &AngularPoint) -> AngularPoint {
        AngularPoint::from_cartesian(self.apply(p.to_cartesian()))
    }
}
