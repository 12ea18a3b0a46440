//! Crate containing models for sample-by-sample energy-flow and thermal
//! simulation of electric-vehicle drivetrains: mission profile in, per-sample
//! component losses, temperatures, and battery state out.

#[macro_use]
pub mod macros;

pub mod cycle;
pub mod imports;
pub mod params;
pub mod powertrain;
pub mod prelude;
pub mod setup;
pub mod simdrive;
pub mod thermal;
pub mod traits;
pub mod utils;
pub mod vehicle;
