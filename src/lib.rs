#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

//! Geodetic direct/inverse localization for pushbroom line-sensor imagery.
//!
//! The crate is organized leaf-first, matching spec component order:
//! [`linalg`] and [`ellipsoid`] are pure geometry, [`dem`] is the ray/DEM
//! intersection engine and its tile cache, [`spacecraft`] and [`sensor`]
//! describe the time-varying observation geometry, and [`localization`]
//! wires them together for the direct and inverse queries. [`facade`]
//! exposes the top-level entry point, [`Rugged`].

pub mod error;
pub mod linalg;

pub mod ellipsoid;

pub mod dem;

pub mod spacecraft;

pub mod sensor;

pub mod localization;

pub mod config;

pub mod facade;

#[cfg(feature = "atmosphere")]
pub mod atmosphere;

pub use facade::{Rugged, RuggedBuilder};
