//! Convenience re-exports of the types most consumers need.

pub use crate::cycle::MissionProfile;
pub use crate::powertrain::battery::Battery;
pub use crate::powertrain::e_machine::{ElectricMachine, MagnetType, SolverStatus};
pub use crate::powertrain::gearbox::Gearbox;
pub use crate::powertrain::inverter::{Inverter, SwitchTech};
pub use crate::setup::{
    CoolingMode, LimitMode, SimOptions, SimSetup, SolverMode, TraceMode, VoltageSource,
};
pub use crate::simdrive::{SimDrive, SimSummary};
pub use crate::thermal::ThermalNetwork;
pub use crate::traits::SerdeAPI;
pub use crate::vehicle::{Drivetrain, Vehicle};
