//! Direct and inverse localization: the two dual queries the rest of the
//! crate exists to answer.

pub mod direct;
pub mod inverse;

pub use direct::direct_localization;
pub use inverse::inverse_localization;

/// Vacuum speed of light, m/s (exact, SI).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
