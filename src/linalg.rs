//! Minimal vector and rotation primitives.
//!
//! Frame and rotation libraries live outside this crate in a full
//! deployment, but the localization pipeline only ever needs a small closed
//! set of operations, so they are supplied directly here in the same
//! component-at-a-time style as `erfa`'s numerical kernels (`era_pdp`,
//! `era_pxp`, `era_ab`, `era_ld`): plain `f64` arithmetic per component,
//! wrapped in a `Copy` struct for ergonomics at call sites.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// A three-component Cartesian vector, meters or meters/second depending on
/// context (position, velocity, or a unit line-of-sight direction).
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vector3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vector3 {
    /// The zero vector.
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    /// Constructs a vector from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Dot product.
    pub fn dot(self, other: Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    pub fn cross(self, other: Vector3) -> Vector3 {
        Vector3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Euclidean norm.
    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Returns this vector scaled to unit length. The zero vector is
    /// returned unchanged (callers operating near-degenerate geometry, e.g.
    /// a collinear mean-plane cross product, must check for this).
    pub fn normalize(self) -> Vector3 {
        let n = self.norm();
        if n == 0.0 {
            self
        } else {
            self * (1.0 / n)
        }
    }

    /// Linearly interpolates between `self` at `t=0` and `other` at `t=1`,
    /// renormalizing the result. Used for fractional pixel line-of-sight
    /// interpolation.
    pub fn slerp_linear(self, other: Vector3, t: f64) -> Vector3 {
        (self * (1.0 - t) + other * t).normalize()
    }

    /// Angle between `self` and `other`, in radians, in `[0, pi]`.
    pub fn angle_with(self, other: Vector3) -> f64 {
        let cos_theta = (self.dot(other) / (self.norm() * other.norm())).clamp(-1.0, 1.0);
        cos_theta.acos()
    }
}

impl Add for Vector3 {
    type Output = Vector3;
    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;
    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;
    fn mul(self, rhs: f64) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Vector3 {
    type Output = Vector3;
    fn div(self, rhs: f64) -> Vector3 {
        Vector3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

/// A unit quaternion (scalar-first), used for spacecraft attitude and for
/// composing the small rotations of `shiftedBy`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    /// Scalar (real) part.
    pub w: f64,
    /// Vector (imaginary) part.
    pub v: Vector3,
}

impl Quaternion {
    /// The identity rotation.
    pub const IDENTITY: Quaternion = Quaternion { w: 1.0, v: Vector3::ZERO };

    /// Constructs a quaternion from raw components and normalizes it.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Quaternion { w, v: Vector3::new(x, y, z) }.normalize()
    }

    /// Constructs the quaternion representing a right-handed rotation of
    /// `angle_rad` radians about `axis` (need not be normalized).
    pub fn from_axis_angle(axis: Vector3, angle_rad: f64) -> Self {
        let axis = axis.normalize();
        let half = angle_rad * 0.5;
        let s = half.sin();
        Quaternion {
            w: half.cos(),
            v: axis * s,
        }
    }

    fn norm(self) -> f64 {
        (self.w * self.w + self.v.dot(self.v)).sqrt()
    }

    /// Normalizes this quaternion to unit length.
    pub fn normalize(self) -> Self {
        let n = self.norm();
        if n == 0.0 {
            Quaternion::IDENTITY
        } else {
            Quaternion { w: self.w / n, v: self.v / n }
        }
    }

    /// Returns the conjugate (== inverse, for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Quaternion { w: self.w, v: -self.v }
    }

    /// Hamilton product `self * other`.
    pub fn mul(self, other: Quaternion) -> Quaternion {
        let w = self.w * other.w - self.v.dot(other.v);
        let v = other.v * self.w + self.v * other.w + self.v.cross(other.v);
        Quaternion { w, v }
    }

    /// Rotates `p` by this (unit) quaternion.
    pub fn rotate(self, p: Vector3) -> Vector3 {
        let qp = Quaternion { w: 0.0, v: p };
        self.mul(qp).mul(self.conjugate()).v
    }

    /// Spherical linear interpolation between `self` at `t=0` and `other`
    /// at `t=1`. Falls back to normalized linear interpolation when the two
    /// quaternions are nearly parallel, to avoid dividing by a vanishing
    /// `sin(theta)`.
    pub fn slerp(self, mut other: Quaternion, t: f64) -> Quaternion {
        let mut cos_theta = self.w * other.w + self.v.dot(other.v);
        if cos_theta < 0.0 {
            other = Quaternion { w: -other.w, v: -other.v };
            cos_theta = -cos_theta;
        }
        if cos_theta > 1.0 - 1e-9 {
            let w = self.w + (other.w - self.w) * t;
            let v = self.v + (other.v - self.v) * t;
            return Quaternion { w, v }.normalize();
        }
        let theta = cos_theta.acos();
        let sin_theta = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin_theta;
        let b = (t * theta).sin() / sin_theta;
        Quaternion {
            w: self.w * a + other.w * b,
            v: self.v * a + other.v * b,
        }
    }
}

/// A rigid transform between two frames at a single instant: a rotation
/// plus the translational and rotational rates needed for first-order
/// kinematic extrapolation (`shifted_by`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation from the transform's source frame to its destination frame.
    pub rotation: Quaternion,
    /// Angular velocity of the destination frame as seen in the source
    /// frame, expressed in the source frame (rad/s), about which
    /// `shifted_by` extrapolates `rotation`.
    pub angular_velocity: Vector3,
    /// Translation of the destination frame's origin, expressed in the
    /// source frame (m).
    pub translation: Vector3,
    /// Velocity of the destination frame's origin, expressed in the source
    /// frame (m/s), about which `shifted_by` extrapolates `translation`.
    pub velocity: Vector3,
}

impl Transform {
    /// The identity transform.
    pub const IDENTITY: Transform = Transform {
        rotation: Quaternion::IDENTITY,
        angular_velocity: Vector3::ZERO,
        translation: Vector3::ZERO,
        velocity: Vector3::ZERO,
    };

    /// Transports a direction vector (a line of sight, not a point) from
    /// the source frame into the destination frame.
    pub fn transform_vector(&self, v: Vector3) -> Vector3 {
        self.rotation.rotate(v)
    }

    /// Transports a point from the source frame into the destination frame.
    pub fn transform_point(&self, p: Vector3) -> Vector3 {
        self.rotation.rotate(p) + self.translation
    }

    /// Approximates this transform at `t + dt` using first-order kinematics:
    /// the rotation is advanced by `angular_velocity * dt` and the
    /// translation by `velocity * dt`. This is the mechanism light-time
    /// correction uses: a coarse ground point fixes a round-trip delay, and
    /// the body-to-inertial transform is re-evaluated at the shifted epoch
    /// without a second ephemeris interpolation.
    pub fn shifted_by(&self, dt_s: f64) -> Transform {
        let angle = self.angular_velocity.norm() * dt_s;
        let delta_rotation = if angle == 0.0 {
            Quaternion::IDENTITY
        } else {
            Quaternion::from_axis_angle(self.angular_velocity, angle)
        };
        Transform {
            rotation: delta_rotation.mul(self.rotation),
            angular_velocity: self.angular_velocity,
            translation: self.translation + self.velocity * dt_s,
            velocity: self.velocity,
        }
    }

    /// Composes `self` (source -> mid) with `next` (mid -> destination),
    /// yielding a single source -> destination transform.
    pub fn compose(&self, next: &Transform) -> Transform {
        Transform {
            rotation: next.rotation.mul(self.rotation),
            angular_velocity: self.angular_velocity + self.rotation.conjugate().rotate(next.angular_velocity),
            translation: next.transform_point(self.translation),
            velocity: next.transform_vector(self.velocity) + next.velocity,
        }
    }

    /// The inverse transform (destination -> source).
    pub fn inverse(&self) -> Transform {
        let inv_rotation = self.rotation.conjugate();
        let inv_translation = inv_rotation.rotate(-self.translation);
        let inv_angular_velocity = inv_rotation.rotate(-self.angular_velocity);
        let inv_velocity = inv_rotation.rotate(-self.velocity);
        Transform {
            rotation: inv_rotation,
            angular_velocity: inv_angular_velocity,
            translation: inv_translation,
            velocity: inv_velocity,
        }
    }
}
