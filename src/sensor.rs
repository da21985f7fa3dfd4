//! Line sensor model: per-pixel lines of sight in the spacecraft frame,
//! sensor origin, mean-plane normal, and line datation.

use hifitime::{Epoch, Unit};

use crate::error::RuggedError;
use crate::linalg::Vector3;

/// A pushbroom line sensor: an ordered set of pixel lines of sight plus the
/// mapping from acquisition line number to date.
#[derive(Debug, Clone)]
pub struct LineSensor {
    name: String,
    pixel_los: Vec<Vector3>,
    position: Vector3,
    mean_plane_normal: Vector3,
    line0_date: Epoch,
    line_period_s: f64,
}

impl LineSensor {
    /// Builds a sensor with an explicit mean-plane normal.
    pub fn new(
        name: impl Into<String>,
        pixel_los: Vec<Vector3>,
        position: Vector3,
        mean_plane_normal: Vector3,
        line0_date: Epoch,
        line_period_s: f64,
    ) -> Self {
        LineSensor {
            name: name.into(),
            pixel_los,
            position,
            mean_plane_normal: mean_plane_normal.normalize(),
            line0_date,
            line_period_s,
        }
    }

    /// Builds a sensor whose mean-plane normal is computed from the pixel
    /// LOS set: the principal axis of smallest variance.
    pub fn with_computed_mean_plane(
        name: impl Into<String>,
        pixel_los: Vec<Vector3>,
        position: Vector3,
        line0_date: Epoch,
        line_period_s: f64,
    ) -> Self {
        let normal = smallest_variance_axis(&pixel_los);
        LineSensor::new(name, pixel_los, position, normal, line0_date, line_period_s)
    }

    /// This sensor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of pixels.
    pub fn num_pixels(&self) -> usize {
        self.pixel_los.len()
    }

    /// The sensor origin, in the spacecraft frame.
    pub fn position(&self) -> Vector3 {
        self.position
    }

    /// The unit normal of the sensor's mean sweep plane, in the spacecraft
    /// frame.
    pub fn mean_plane_normal(&self) -> Vector3 {
        self.mean_plane_normal
    }

    /// The integer-indexed pixel line-of-sight vector. Panics if `i` is out
    /// of range; callers are expected to stay within `[0, num_pixels())`.
    pub fn los(&self, i: usize) -> Vector3 {
        self.pixel_los[i]
    }

    /// The line-of-sight for a fractional pixel index, via normalized
    /// linear interpolation of the two neighboring integer-indexed vectors.
    pub fn interpolated_los(&self, pixel: f64) -> Vector3 {
        let n = self.pixel_los.len();
        if n < 2 {
            return self.pixel_los[0];
        }
        let lo = (pixel.floor() as i64).clamp(0, n as i64 - 2) as usize;
        let t = pixel - lo as f64;
        self.pixel_los[lo].slerp_linear(self.pixel_los[lo + 1], t)
    }

    /// Maps a real-valued line number to an absolute date. Monotonically
    /// increasing in `line`.
    pub fn date(&self, line: f64) -> Epoch {
        self.line0_date + (self.line_period_s * line) * Unit::Second
    }

    /// Approximate inverse of [`Self::date`]: the fractional line number
    /// whose date is `epoch`. Exact when `date` is affine in `line`, which
    /// it is here.
    pub fn line_at(&self, epoch: Epoch) -> Result<f64, RuggedError> {
        if self.line_period_s.abs() < 1e-15 {
            return Err(RuggedError::InternalError { reason: "line sensor has zero line period".into() });
        }
        Ok((epoch - self.line0_date).to_seconds() / self.line_period_s)
    }
}

/// The axis of smallest variance of a set of (assumed roughly unit-length)
/// vectors, found via the power iteration on `(I - that axis)`, i.e. by
/// taking the smallest-eigenvalue eigenvector of the 3x3 covariance matrix.
/// Falls back to the vector orthogonal to the mean LOS direction and the
/// sensor's along-track spread if the covariance is degenerate (e.g. a
/// single-pixel sensor).
fn smallest_variance_axis(los: &[Vector3]) -> Vector3 {
    if los.len() < 2 {
        return Vector3::new(0.0, 0.0, 1.0);
    }
    let mean = los.iter().fold(Vector3::ZERO, |acc, v| acc + *v) / los.len() as f64;
    let mut cov = [[0.0_f64; 3]; 3];
    for v in los {
        let d = [v.x - mean.x, v.y - mean.y, v.z - mean.z];
        for r in 0..3 {
            for c in 0..3 {
                cov[r][c] += d[r] * d[c];
            }
        }
    }

    // Jacobi eigenvalue algorithm for the symmetric 3x3 covariance matrix:
    // a handful of sweeps is enough for a well-conditioned 3x3 case.
    let mut a = cov;
    let mut v = [[1.0_f64, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    for _ in 0..30 {
        let (mut p, mut q, mut max_off) = (0usize, 1usize, a[0][1].abs());
        for (r, c) in [(0, 2), (1, 2)] {
            if a[r][c].abs() > max_off {
                max_off = a[r][c].abs();
                p = r;
                q = c;
            }
        }
        if max_off < 1e-15 {
            break;
        }
        let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
        let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
        let c = 1.0 / (t * t + 1.0).sqrt();
        let s = t * c;
        let app = a[p][p];
        let aqq = a[q][q];
        let apq = a[p][q];
        a[p][p] = c * c * app - 2.0 * s * c * apq + s * s * aqq;
        a[q][q] = s * s * app + 2.0 * s * c * apq + c * c * aqq;
        a[p][q] = 0.0;
        a[q][p] = 0.0;
        for r in 0..3 {
            if r != p && r != q {
                let arp = a[r][p];
                let arq = a[r][q];
                a[r][p] = c * arp - s * arq;
                a[p][r] = a[r][p];
                a[r][q] = s * arp + c * arq;
                a[q][r] = a[r][q];
            }
        }
        for r in 0..3 {
            let vrp = v[r][p];
            let vrq = v[r][q];
            v[r][p] = c * vrp - s * vrq;
            v[r][q] = s * vrp + c * vrq;
        }
    }

    let eigenvalues = [a[0][0], a[1][1], a[2][2]];
    let min_idx = (0..3).min_by(|&i, &j| eigenvalues[i].partial_cmp(&eigenvalues[j]).unwrap()).unwrap();
    Vector3::new(v[0][min_idx], v[1][min_idx], v[2][min_idx]).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolated_los_at_integer_pixel_matches_exact() {
        let los = vec![Vector3::new(0.0, 0.0, -1.0), Vector3::new(0.05, 0.0, -1.0).normalize(), Vector3::new(0.1, 0.0, -1.0).normalize()];
        let sensor = LineSensor::with_computed_mean_plane(
            "test",
            los.clone(),
            Vector3::ZERO,
            Epoch::from_gregorian_utc_at_midnight(2020, 1, 1),
            0.01,
        );
        let mid = sensor.interpolated_los(1.0);
        assert!((mid - los[1]).norm() < 1e-9);
    }

    #[test]
    fn mean_plane_normal_is_perpendicular_to_in_plane_los_spread() {
        // All LOS vectors lie (approximately) in the x-z plane; the normal
        // should align with +/-y.
        let los: Vec<Vector3> = (0..11)
            .map(|k| {
                let a = (k as f64 - 5.0) * 0.01;
                Vector3::new(a, 0.0, -1.0).normalize()
            })
            .collect();
        let normal = smallest_variance_axis(&los);
        assert!(normal.x.abs() < 1e-6);
        assert!(normal.y.abs() > 0.99);
    }

    #[test]
    fn date_is_monotonically_increasing_in_line() {
        let sensor = LineSensor::new(
            "test",
            vec![Vector3::new(0.0, 0.0, -1.0); 4],
            Vector3::ZERO,
            Vector3::new(0.0, 1.0, 0.0),
            Epoch::from_gregorian_utc_at_midnight(2020, 1, 1),
            0.01,
        );
        assert!(sensor.date(10.0) > sensor.date(5.0));
    }
}
