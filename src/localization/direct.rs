//! Direct localization: for a sensor and acquisition line, where on the
//! ground does each pixel see.

use std::ops::Range;

use crate::dem::IntersectionAlgorithm;
use crate::ellipsoid::{Ellipsoid, GeodeticPoint};
use crate::error::RuggedError;
use crate::linalg::Vector3;
use crate::localization::SPEED_OF_LIGHT;
use crate::sensor::LineSensor;
use crate::spacecraft::{InertialToBody, ScToInertial};

/// Localizes every pixel of `sensor` at line `line`, in `pixel_range`, onto
/// the ground via `algorithm`.
#[allow(clippy::too_many_arguments)]
pub fn direct_localization(
    ellipsoid: &Ellipsoid,
    sc_to_inertial: &ScToInertial,
    inertial_to_body: &InertialToBody,
    sensor: &LineSensor,
    algorithm: &mut dyn IntersectionAlgorithm,
    light_time_correction: bool,
    aberration_of_light_correction: bool,
    line: f64,
    pixel_range: Range<usize>,
) -> Result<Vec<GeodeticPoint>, RuggedError> {
    let epoch = sensor.date(line);
    let sc2i = sc_to_inertial.transform_at(epoch)?;
    let i2b = inertial_to_body.transform_at(epoch)?;

    pixel_range
        .map(|pixel| {
            localize_one(
                ellipsoid,
                &sc2i,
                &i2b,
                sensor.position(),
                sensor.los(pixel),
                algorithm,
                light_time_correction,
                aberration_of_light_correction,
            )
        })
        .collect()
}

/// The per-pixel geometry pipeline, shared between direct localization and
/// inverse localization's bilinear-quadrilateral corners, which localize a
/// single `(line, pixel)` pair each with a different `algorithm` (the
/// selected DEM algorithm vs. a fixed-altitude ellipsoid offset).
#[allow(clippy::too_many_arguments)]
pub(crate) fn localize_one(
    ellipsoid: &Ellipsoid,
    sc2i: &crate::linalg::Transform,
    i2b: &crate::linalg::Transform,
    p_sc: Vector3,
    los_sc: Vector3,
    algorithm: &mut dyn IntersectionAlgorithm,
    light_time_correction: bool,
    aberration_of_light_correction: bool,
) -> Result<GeodeticPoint, RuggedError> {
    let mut los_inert = sc2i.transform_vector(los_sc);
    let p_inert = sc2i.transform_point(p_sc);

    if aberration_of_light_correction {
        let v_sc = sc2i.velocity;
        los_inert = (los_inert * SPEED_OF_LIGHT + v_sc).normalize();
    }

    if !light_time_correction {
        let p_body = i2b.transform_point(p_inert);
        let los_body = i2b.transform_vector(los_inert);
        return algorithm.intersection(ellipsoid, p_body, los_body);
    }

    // First pass: coarse ellipsoid-only ground point at the un-shifted
    // epoch, to estimate the one-way light travel time.
    let p_body0 = i2b.transform_point(p_inert);
    let los_body0 = i2b.transform_vector(los_inert);
    let gp1 = ellipsoid.point_on_ground(p_body0, los_body0)?;
    let gp1_cart = ellipsoid.geodetic_to_cartesian(&gp1);
    let dt1 = (gp1_cart - p_body0).norm() / SPEED_OF_LIGHT;

    let i2b_1 = i2b.shifted_by(-dt1);
    let p_body1 = i2b_1.transform_point(p_inert);
    let los_body1 = i2b_1.transform_vector(los_inert);
    let gp1_prime = algorithm.intersection(ellipsoid, p_body1, los_body1)?;

    // Second pass: refine against the tighter delay estimate from gp1'.
    let gp1_prime_cart = ellipsoid.geodetic_to_cartesian(&gp1_prime);
    let dt2 = (gp1_prime_cart - p_body1).norm() / SPEED_OF_LIGHT;

    let i2b_2 = i2b.shifted_by(-dt2);
    let p_body2 = i2b_2.transform_point(p_inert);
    let los_body2 = i2b_2.transform_vector(los_inert);
    algorithm.refine_intersection(ellipsoid, p_body2, los_body2, gp1_prime)
}
