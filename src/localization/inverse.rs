//! Inverse localization: for a ground point, which sensor line and pixel
//! observes it, if any, within a prescribed line range.

use crate::dem::{FixedAltitudeAlgorithm, IntersectionAlgorithm};
use crate::ellipsoid::{Ellipsoid, GeodeticPoint, NormalizedGeodeticPoint};
use crate::error::RuggedError;
use crate::linalg::Vector3;
use crate::localization::direct::localize_one;
use crate::localization::SPEED_OF_LIGHT;
use crate::sensor::LineSensor;
use crate::spacecraft::{InertialToBody, ScToInertial};

const MAX_EVAL: u32 = 1000;
const LINE_BRACKET_SAMPLES: u32 = 64;
const LINE_ABS_ACCURACY: f64 = 1e-2;
const PIXEL_ABS_ACCURACY: f64 = 1e-2;

/// A resolved sensor pixel from inverse localization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPixel {
    /// Fractional acquisition line index.
    pub line: f64,
    /// Fractional pixel index.
    pub pixel: f64,
}

/// Finds the sensor pixel observing ground point `g`, if any, within
/// `[line_min, line_max]`.
#[allow(clippy::too_many_arguments)]
pub fn inverse_localization(
    ellipsoid: &Ellipsoid,
    sc_to_inertial: &ScToInertial,
    inertial_to_body: &InertialToBody,
    sensor: &LineSensor,
    g: GeodeticPoint,
    line_min: f64,
    line_max: f64,
    light_time_correction: bool,
    aberration_of_light_correction: bool,
) -> Result<Option<SensorPixel>, RuggedError> {
    let g_cart = ellipsoid.geodetic_to_cartesian(&g);
    let normal = sensor.mean_plane_normal();

    let target_dir = |line: f64| -> Result<Vector3, RuggedError> {
        target_direction(
            ellipsoid,
            sc_to_inertial,
            inertial_to_body,
            sensor,
            g_cart,
            line,
            light_time_correction,
            aberration_of_light_correction,
        )
    };

    let mean_plane_residual = |line: f64| -> Result<f64, RuggedError> {
        Ok(target_dir(line)?.angle_with(normal) - std::f64::consts::FRAC_PI_2)
    };

    let line_star = match bracket_and_bisect(line_min, line_max, LINE_BRACKET_SAMPLES, LINE_ABS_ACCURACY, mean_plane_residual)? {
        Some(l) => l,
        None => return Ok(None),
    };

    let target_at_line_star = target_dir(line_star)?;
    let cross = normal.cross(target_at_line_star).normalize();

    let num_pixels = sensor.num_pixels();
    let pixel_residual =
        |pixel: f64| -> Result<f64, RuggedError> { Ok(sensor.interpolated_los(pixel).angle_with(cross) - std::f64::consts::FRAC_PI_2) };

    let pixel_star = match bracket_and_bisect(
        -1.0,
        num_pixels as f64,
        LINE_BRACKET_SAMPLES,
        PIXEL_ABS_ACCURACY,
        pixel_residual,
    )? {
        Some(p) => p,
        None => return Ok(None),
    };

    refine_bilinear(
        ellipsoid,
        sc_to_inertial,
        inertial_to_body,
        sensor,
        g,
        line_star,
        pixel_star,
        light_time_correction,
        aberration_of_light_correction,
    )
}

/// The spacecraft-frame direction, at `sensor.date(line)`, from the
/// spacecraft to ground point `g_cart`, with light-time and aberration
/// handled symmetrically to the forward pipeline: light-time shifts
/// `inertial_to_body` by the estimated round-trip delay before
/// transporting `g_cart` into the inertial frame, and aberration is undone
/// by the algebraic inverse of the forward composition
/// `normalize(c*l + v_sc)`, i.e. `normalize(c*dir - v_sc)` (the model is
/// non-relativistic, so this is the correct first-order inverse, not an
/// approximation of a more exact inverse formula).
#[allow(clippy::too_many_arguments)]
fn target_direction(
    ellipsoid: &Ellipsoid,
    sc_to_inertial: &ScToInertial,
    inertial_to_body: &InertialToBody,
    sensor: &LineSensor,
    g_cart: Vector3,
    line: f64,
    light_time_correction: bool,
    aberration_of_light_correction: bool,
) -> Result<Vector3, RuggedError> {
    let epoch = sensor.date(line);
    let sc2i = sc_to_inertial.transform_at(epoch)?;
    let i2b = inertial_to_body.transform_at(epoch)?;
    let p_sc_inertial = sc2i.transform_point(sensor.position());

    let i2b_used = if light_time_correction {
        let p_sc_body = i2b.transform_point(p_sc_inertial);
        let dt = (g_cart - p_sc_body).norm() / SPEED_OF_LIGHT;
        i2b.shifted_by(-dt)
    } else {
        i2b
    };

    let g_inertial = i2b_used.inverse().transform_point(g_cart);
    let mut dir_inertial = (g_inertial - p_sc_inertial).normalize();

    if aberration_of_light_correction {
        let v_sc = sc2i.velocity;
        dir_inertial = (dir_inertial * SPEED_OF_LIGHT - v_sc).normalize();
    }

    Ok(sc2i.inverse().transform_vector(dir_inertial))
}

/// Scans `[lo, hi]` in `samples` steps for a sign change in `f`, then
/// bisects the bracketing sub-interval to `abs_accuracy`. Returns `None` if
/// no sign change is found — absorbed as a null result, not an error — and
/// an error only if the evaluation budget is exhausted.
fn bracket_and_bisect(
    lo: f64,
    hi: f64,
    samples: u32,
    abs_accuracy: f64,
    mut f: impl FnMut(f64) -> Result<f64, RuggedError>,
) -> Result<Option<f64>, RuggedError> {
    let mut evals = 0u32;
    let mut eval = |x: f64, evals: &mut u32| -> Result<f64, RuggedError> {
        *evals += 1;
        if *evals > MAX_EVAL {
            return Err(RuggedError::SolverExhausted { max_eval: MAX_EVAL });
        }
        f(x)
    };

    let step = (hi - lo) / samples as f64;
    let mut x_prev = lo;
    let mut f_prev = eval(x_prev, &mut evals)?;
    for k in 1..=samples {
        let x_curr = lo + step * k as f64;
        let f_curr = eval(x_curr, &mut evals)?;
        if f_prev == 0.0 {
            return Ok(Some(x_prev));
        }
        if f_prev.signum() != f_curr.signum() {
            let mut a = x_prev;
            let mut fa = f_prev;
            let mut b = x_curr;
            while (b - a).abs() > abs_accuracy {
                let mid = 0.5 * (a + b);
                let fm = eval(mid, &mut evals)?;
                if fm == 0.0 || fa.signum() != fm.signum() {
                    b = mid;
                } else {
                    a = mid;
                    fa = fm;
                }
            }
            return Ok(Some(0.5 * (a + b)));
        }
        x_prev = x_curr;
        f_prev = f_curr;
    }
    Ok(None)
}

/// Final refinement stage: runs direct localization at `g`'s altitude (via
/// [`FixedAltitudeAlgorithm`]) for the four corners of the enclosing
/// integer-indexed cell around `(line_star, pixel_star)`, then solves the
/// bilinear system for `(u, v)` matching `g`'s latitude and longitude.
#[allow(clippy::too_many_arguments)]
fn refine_bilinear(
    ellipsoid: &Ellipsoid,
    sc_to_inertial: &ScToInertial,
    inertial_to_body: &InertialToBody,
    sensor: &LineSensor,
    g: GeodeticPoint,
    line_star: f64,
    pixel_star: f64,
    light_time_correction: bool,
    aberration_of_light_correction: bool,
) -> Result<Option<SensorPixel>, RuggedError> {
    let num_pixels = sensor.num_pixels();
    let l_inf = line_star.floor();
    let p_inf = (pixel_star.floor() as i64).clamp(0, num_pixels as i64 - 2) as usize;

    let mut algorithm = FixedAltitudeAlgorithm { altitude: g.alt_m() };
    let mut corner = |line: f64, pixel: usize| -> Result<GeodeticPoint, RuggedError> {
        let epoch = sensor.date(line);
        let sc2i = sc_to_inertial.transform_at(epoch)?;
        let i2b = inertial_to_body.transform_at(epoch)?;
        localize_one(
            ellipsoid,
            &sc2i,
            &i2b,
            sensor.position(),
            sensor.los(pixel),
            &mut algorithm,
            light_time_correction,
            aberration_of_light_correction,
        )
    };

    let c00 = corner(l_inf, p_inf)?;
    let c10 = corner(l_inf, p_inf + 1)?;
    let c01 = corner(l_inf + 1.0, p_inf)?;
    let c11 = corner(l_inf + 1.0, p_inf + 1)?;

    let lon_ref = c00.lon_rad();
    let n00 = NormalizedGeodeticPoint::new(c00, lon_ref);
    let n10 = NormalizedGeodeticPoint::new(c10, lon_ref);
    let n01 = NormalizedGeodeticPoint::new(c01, lon_ref);
    let n11 = NormalizedGeodeticPoint::new(c11, lon_ref);
    let g_norm = NormalizedGeodeticPoint::new(g, lon_ref);

    let solve_axis = |v00: f64, v10: f64, v01: f64, v11: f64, target: f64| -> (f64, f64, f64, f64) {
        (v00 - target, v10 - v00, v01 - v00, v11 - v10 - v01 + v00)
    };

    let (a1, b1, c1, d1) = solve_axis(n00.point.lat_rad(), n10.point.lat_rad(), n01.point.lat_rad(), n11.point.lat_rad(), g_norm.point.lat_rad());
    let (a2, b2, c2, d2) = solve_axis(
        n00.point.lon_rad(),
        n10.point.lon_rad(),
        n01.point.lon_rad(),
        n11.point.lon_rad(),
        g_norm.point.lon_rad(),
    );

    let a_u = b2 * d1 - d2 * b1;
    let b_u = a2 * d1 + b2 * c1 - c2 * b1 - d2 * a1;
    let c_u = a2 * c1 - c2 * a1;

    let roots = quadratic_roots(a_u, b_u, c_u);
    let eps = 1e-6;
    let mut best: Option<(f64, f64)> = None;
    for u in roots {
        let denom = c1 + d1 * u;
        let v = if denom.abs() > 1e-12 { -(a1 + b1 * u) / denom } else { continue };
        if u >= -eps && u <= 1.0 + eps && v >= -eps && v <= 1.0 + eps {
            let u = u.clamp(0.0, 1.0);
            let v = v.clamp(0.0, 1.0);
            if best.is_none() {
                best = Some((u, v));
            }
        }
    }

    let (u, v) = match best {
        Some(uv) => uv,
        None => {
            return Err(RuggedError::GroundPointOutOfColumnRange {
                pixel: p_inf as f64 + pixel_star.fract(),
                num_pixels,
            })
        }
    };

    let pixel = p_inf as f64 + u;
    if pixel < 0.0 || pixel > num_pixels as f64 {
        return Err(RuggedError::GroundPointOutOfColumnRange { pixel, num_pixels });
    }
    Ok(Some(SensorPixel { line: l_inf + v, pixel }))
}

fn quadratic_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a.abs() < 1e-14 {
        if b.abs() < 1e-14 {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    let sqrt_disc = disc.sqrt();
    vec![(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)]
}
