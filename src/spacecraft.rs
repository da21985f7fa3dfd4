//! Spacecraft-to-body geometric pipeline: immutable ordered ephemeris and
//! attitude samples, interpolated into time-parameterized `Transform`s.
//!
//! Samples are kept sorted by time; a query partitions for the bracketing
//! window and blends the nearest `n` samples. Position/velocity uses
//! Lagrange polynomial interpolation of the configured order; attitude
//! quaternions use pairwise `slerp`, since a quaternion has no additive
//! Lagrange basis.

use hifitime::Epoch;

use crate::error::RuggedError;
use crate::linalg::{Quaternion, Transform, Vector3};

/// One sample of inertial position and velocity at an epoch.
#[derive(Debug, Clone, Copy)]
pub struct PvSample {
    /// The sample's epoch.
    pub epoch: Epoch,
    /// Position in the inertial frame, meters.
    pub position: Vector3,
    /// Velocity in the inertial frame, meters/second.
    pub velocity: Vector3,
}

/// One sample of attitude (spacecraft frame to inertial frame rotation) at
/// an epoch.
#[derive(Debug, Clone, Copy)]
pub struct AttitudeSample {
    /// The sample's epoch.
    pub epoch: Epoch,
    /// Rotation carrying spacecraft-frame vectors into the inertial frame.
    pub rotation: Quaternion,
    /// Angular velocity of the spacecraft frame, expressed in the
    /// spacecraft frame, rad/s.
    pub angular_velocity: Vector3,
}

fn bracket<T>(samples: &[T], epoch: Epoch, order: usize, epoch_of: impl Fn(&T) -> Epoch) -> Result<(usize, usize), RuggedError> {
    if samples.len() < 2 {
        return Err(RuggedError::OutOfTimeRange { epoch: format!("{epoch}") });
    }
    if epoch < epoch_of(&samples[0]) || epoch > epoch_of(&samples[samples.len() - 1]) {
        return Err(RuggedError::OutOfTimeRange { epoch: format!("{epoch}") });
    }
    let idx = samples.partition_point(|s| epoch_of(s) <= epoch);
    // `idx` is the first sample strictly after `epoch`; the bracketing pair
    // for order-2 interpolation is (idx-1, idx), widened symmetrically for
    // higher orders and clamped to the available range.
    let half = order / 2;
    let lo = idx.saturating_sub(half.max(1));
    let hi = (lo + order).min(samples.len());
    let lo = hi.saturating_sub(order).min(lo);
    Ok((lo, hi))
}

/// Lagrange polynomial interpolation of `ys[k]` at `xs[k]`, evaluated at `x`.
fn lagrange(xs: &[f64], ys: &[Vector3], x: f64) -> Vector3 {
    let mut result = Vector3::ZERO;
    for k in 0..xs.len() {
        let mut weight = 1.0;
        for m in 0..xs.len() {
            if m != k {
                weight *= (x - xs[m]) / (xs[k] - xs[m]);
            }
        }
        result = result + ys[k] * weight;
    }
    result
}

/// Derivative at `x` of the Lagrange polynomial through `(xs[k], ys[k])`,
/// used to interpolate velocity consistently with the interpolated
/// position (rather than storing velocity samples and interpolating them
/// independently, which can disagree with d/dt of the interpolated
/// position).
fn lagrange_derivative(xs: &[f64], ys: &[Vector3], x: f64) -> Vector3 {
    let mut result = Vector3::ZERO;
    for k in 0..xs.len() {
        let mut sum_terms = 0.0;
        for i in 0..xs.len() {
            if i == k {
                continue;
            }
            let mut term = 1.0 / (xs[k] - xs[i]);
            for m in 0..xs.len() {
                if m != k && m != i {
                    term *= (x - xs[m]) / (xs[k] - xs[m]);
                }
            }
            sum_terms += term;
        }
        result = result + ys[k] * sum_terms;
    }
    result
}

/// An ephemeris provider backed by immutable ordered `(t, position,
/// velocity)` samples, interpolated to Lagrange order `order`.
#[derive(Debug, Clone)]
pub struct Ephemeris {
    samples: Vec<PvSample>,
    order: usize,
}

impl Ephemeris {
    /// Builds a provider from samples (sorted ascending by epoch) and an
    /// interpolation order (clamped to at least 2).
    pub fn new(mut samples: Vec<PvSample>, order: usize) -> Self {
        samples.sort_by_key(|s| s.epoch);
        Ephemeris { samples, order: order.max(2) }
    }

    /// Interpolates position and velocity at `epoch`.
    pub fn interpolate(&self, epoch: Epoch) -> Result<(Vector3, Vector3), RuggedError> {
        let (lo, hi) = bracket(&self.samples, epoch, self.order, |s| s.epoch)?;
        let window = &self.samples[lo..hi];
        let t0 = window[0].epoch;
        let xs: Vec<f64> = window.iter().map(|s| (s.epoch - t0).to_seconds()).collect();
        let ys: Vec<Vector3> = window.iter().map(|s| s.position).collect();
        let x = (epoch - t0).to_seconds();
        let position = lagrange(&xs, &ys, x);
        let velocity = lagrange_derivative(&xs, &ys, x);
        Ok((position, velocity))
    }
}

/// An attitude provider backed by immutable ordered `(t, quaternion)`
/// samples, interpolated by `slerp` between the bracketing pair.
#[derive(Debug, Clone)]
pub struct AttitudeProvider {
    samples: Vec<AttitudeSample>,
    order: usize,
}

impl AttitudeProvider {
    /// Builds a provider from samples (sorted ascending by epoch) and an
    /// interpolation order (clamped to at least 2; only the innermost
    /// bracketing pair is actually blended, since quaternions have no
    /// Lagrange basis, but the order still governs how wide a neighborhood
    /// must be available for the query to succeed).
    pub fn new(mut samples: Vec<AttitudeSample>, order: usize) -> Self {
        samples.sort_by_key(|s| s.epoch);
        AttitudeProvider { samples, order: order.max(2) }
    }

    /// Interpolates rotation and angular velocity at `epoch`.
    pub fn interpolate(&self, epoch: Epoch) -> Result<(Quaternion, Vector3), RuggedError> {
        let (lo, hi) = bracket(&self.samples, epoch, self.order, |s| s.epoch)?;
        let window = &self.samples[lo..hi];
        let before = window
            .iter()
            .rev()
            .find(|s| s.epoch <= epoch)
            .or_else(|| window.first())
            .expect("bracket() guarantees a nonempty window");
        let after = window.iter().find(|s| s.epoch >= epoch).unwrap_or(before);
        if before.epoch == after.epoch {
            return Ok((before.rotation, before.angular_velocity));
        }
        let span = (after.epoch - before.epoch).to_seconds();
        let t = (epoch - before.epoch).to_seconds() / span;
        let rotation = before.rotation.slerp(after.rotation, t);
        let angular_velocity = before.angular_velocity.slerp_linear(after.angular_velocity, t);
        Ok((rotation, angular_velocity))
    }
}

/// Produces the spacecraft-frame-to-inertial-frame transform at a given
/// epoch by composing interpolated attitude with interpolated ephemeris.
#[derive(Debug, Clone)]
pub struct ScToInertial {
    ephemeris: Ephemeris,
    attitude: AttitudeProvider,
}

impl ScToInertial {
    /// Constructs a provider from an ephemeris and an attitude provider.
    pub fn new(ephemeris: Ephemeris, attitude: AttitudeProvider) -> Self {
        ScToInertial { ephemeris, attitude }
    }

    /// The spacecraft-to-inertial transform at `epoch`.
    pub fn transform_at(&self, epoch: Epoch) -> Result<Transform, RuggedError> {
        let (position, velocity) = self.ephemeris.interpolate(epoch)?;
        let (rotation, angular_velocity) = self.attitude.interpolate(epoch)?;
        Ok(Transform { rotation, angular_velocity, translation: position, velocity })
    }
}

/// Produces the inertial-frame-to-body-frame transform at a given epoch.
/// The actual frame/rotation math (precession, nutation, polar motion,
/// sidereal rotation) normally lives in an external frame library; this
/// provider exposes the same time-parameterized interface over sample data
/// supplied the same way as `ScToInertial`, so the rest of the pipeline
/// (light-time's `shifted_by`) is indifferent to which frame library
/// eventually backs it.
#[derive(Debug, Clone)]
pub struct InertialToBody {
    attitude: AttitudeProvider,
}

impl InertialToBody {
    /// Constructs a provider from a rotation-sample series (e.g. sidereal
    /// rotation plus polar motion, pre-composed by the caller).
    pub fn new(attitude: AttitudeProvider) -> Self {
        InertialToBody { attitude }
    }

    /// The inertial-to-body transform at `epoch`. Its translation and
    /// velocity are zero: this provider models a pure body-rotation frame
    /// change, not a frame with a shifted origin.
    pub fn transform_at(&self, epoch: Epoch) -> Result<Transform, RuggedError> {
        let (rotation, angular_velocity) = self.attitude.interpolate(epoch)?;
        Ok(Transform { rotation, angular_velocity, translation: Vector3::ZERO, velocity: Vector3::ZERO })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hifitime::Unit;

    fn epoch_at(seconds: f64) -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2020, 1, 1) + seconds * Unit::Second
    }

    #[test]
    fn ephemeris_interpolates_linear_motion_exactly() {
        let samples: Vec<PvSample> = (0..5)
            .map(|k| {
                let t = k as f64 * 10.0;
                PvSample {
                    epoch: epoch_at(t),
                    position: Vector3::new(7_000_000.0 + 7_500.0 * t, 0.0, 0.0),
                    velocity: Vector3::new(7_500.0, 0.0, 0.0),
                }
            })
            .collect();
        let eph = Ephemeris::new(samples, 4);
        let (p, v) = eph.interpolate(epoch_at(15.0)).unwrap();
        assert!((p.x - (7_000_000.0 + 7_500.0 * 15.0)).abs() < 1e-3);
        assert!((v.x - 7_500.0).abs() < 1e-6);
    }

    #[test]
    fn ephemeris_query_outside_span_fails() {
        let samples: Vec<PvSample> = (0..3)
            .map(|k| PvSample { epoch: epoch_at(k as f64 * 10.0), position: Vector3::ZERO, velocity: Vector3::ZERO })
            .collect();
        let eph = Ephemeris::new(samples, 2);
        assert!(eph.interpolate(epoch_at(1000.0)).is_err());
    }

    #[test]
    fn attitude_slerp_at_bracket_midpoint_is_halfway() {
        let a = AttitudeSample {
            epoch: epoch_at(0.0),
            rotation: Quaternion::IDENTITY,
            angular_velocity: Vector3::ZERO,
        };
        let b = AttitudeSample {
            epoch: epoch_at(10.0),
            rotation: Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), 1.0),
            angular_velocity: Vector3::ZERO,
        };
        let provider = AttitudeProvider::new(vec![a, b], 2);
        let (rotation, _) = provider.interpolate(epoch_at(5.0)).unwrap();
        let expected = Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), 0.5);
        assert!((rotation.w - expected.w).abs() < 1e-9);
    }
}
