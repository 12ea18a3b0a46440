//! Simulation setup: experiment options and the immutable per-component
//! parameter sets, loaded once from a YAML file and read-only afterwards.

use crate::imports::*;
use crate::powertrain::battery::Battery;
use crate::powertrain::e_machine::{ElectricMachine, MagnetType};
use crate::powertrain::gearbox::Gearbox;
use crate::powertrain::inverter::{Inverter, SwitchTech};
use crate::thermal::ThermalNetwork;
use crate::vehicle::{Drivetrain, Vehicle};

/// Enforcement of rated current/torque/power limits.
/// `Off` additionally pins the DC link to a high constant voltage so no
/// operating point is voltage-limited.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    Off,
    On,
    VoltageOnly,
}

/// Machine control-law solver flavor
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverMode {
    /// non-iterative saturated current laws
    ClosedForm,
    /// MTPA/field-weakening root search with de-rating retry
    RootSearch,
}

/// Where the DC-link voltage and SOC come from
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageSource {
    /// nominal battery voltage, held constant
    Constant,
    /// measured trace from the mission profile
    Measured,
    /// battery model output fed back each sample
    SocDerived,
}

/// Where the coolant temperature comes from
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolingMode {
    /// constant setup value
    Constant,
    /// measured trace from the mission profile
    Measured,
    /// lumped coolant-loop model fed by component losses
    Model,
}

/// Whether the speed trace is prescribed or derived from achievable torque
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    Prescribed,
    Achieved,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SimOptions {
    pub drivetrain: Drivetrain,
    pub limits: LimitMode,
    pub solver: SolverMode,
    pub voltage_source: VoltageSource,
    pub cooling: CoolingMode,
    pub trace: TraceMode,
    /// de-rating retry budget of the machine solver
    pub max_solver_iter: usize,
    /// simulation rate the mission profile is resampled to [Hz]
    pub sample_rate_hz: f64,
    /// initial battery state of charge
    pub soc_init: f64,
    /// coolant temperature in `CoolingMode::Constant` [°C]
    pub cool_te_deg_c: f64,
    /// abort the run on an unrecovered solver failure instead of flagging the
    /// sample and continuing
    pub abort_on_infeasible: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            drivetrain: Drivetrain::Awd,
            limits: LimitMode::On,
            solver: SolverMode::RootSearch,
            voltage_source: VoltageSource::Constant,
            cooling: CoolingMode::Constant,
            trace: TraceMode::Prescribed,
            max_solver_iter: 50,
            sample_rate_hz: 10.0,
            soc_init: 0.9,
            cool_te_deg_c: 25.0,
            abort_on_infeasible: true,
        }
    }
}

impl SerdeAPI for SimOptions {}

/// Complete simulation setup. Component parameter sets are constructed here
/// once and shared read-only by the front and rear instances.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimSetup {
    #[serde(default)]
    pub options: SimOptions,
    pub vehicle: Vehicle,
    pub gearbox: Gearbox,
    pub machine: ElectricMachine,
    pub inverter: Inverter,
    pub battery: Battery,
}

impl SerdeAPI for SimSetup {}

impl SimSetup {
    /// Mid-size BEV parameter set used by tests and demo runs: ~150 kW
    /// surface-magnet machine behind a single-speed 9:1 reduction on each
    /// axle, 400 V class pack.
    pub fn mock() -> Self {
        Self {
            options: SimOptions::default(),
            vehicle: Vehicle {
                mass_kg: 1900.0,
                c_rr: 0.011,
                frontal_area_m2: 2.3,
                c_drag: 0.27,
                headwind_mps: 0.0,
                r_rim_m: 0.24,
                m_rim_kg: 12.0,
                r_tire_m: 0.35,
                m_tire_kg: 11.0,
                r_flat: 0.95,
                split_accel: 0.5,
                split_brake: 0.6,
                eta_driveline: 0.9,
                cool_rho_kg_per_m3: 1060.0,
                cool_cp_j_per_kg_k: 3500.0,
                cool_htc_w_per_m2_k: 150.0,
                area_radiator_m2: 0.4,
            },
            gearbox: Gearbox {
                ratio: 9.0,
                trq_max_nm: 350.0,
                speed_max_rps: 270.0,
                pwr_max_w: 250e3,
                c_bearing: 0.8,
                c_mesh: 1.2,
                c_windage: 5e-4,
                thrm: ThermalNetwork {
                    r_th_k_per_w: 0.08,
                    c_th_j_per_k: 3.0e4,
                },
            },
            machine: ElectricMachine {
                magnet: MagnetType::Surface,
                pole_pairs: 4.0,
                speed_base_rps: 70.0,
                trq_max_nm: 300.0,
                speed_max_rps: 270.0,
                pwr_max_w: 150e3,
                i_max_a: 300.0,
                psi_vs: 0.1,
                l_d_h: 2.4e-4,
                l_q_h: 2.4e-4,
                l_sig_h: 3.0e-5,
                r_s_ohm: 0.01,
                c_bearing: 1.0,
                c_windage: 1.0e-3,
                k_hyst: 1.0e-2,
                k_eddy: 1.0e-4,
                thrm: ThermalNetwork {
                    r_th_k_per_w: 0.05,
                    c_th_j_per_k: 2.0e4,
                },
            },
            inverter: Inverter {
                f_sw_hz: 10e3,
                switch_tech: SwitchTech::Igbt,
                n_sw: 2.0,
                n_cap: 10.0,
                v_ref_v: 400.0,
                i_ref_a: 300.0,
                te_ref_deg_c: 25.0,
                tj_max_deg_c: 150.0,
                alpha_pct_per_k: 0.3,
                pwr_max_w: 200e3,
                i_max_a: 250.0,
                v_ce0_v: 0.9,
                r_t_ohm: 2.2e-3,
                v_d0_v: 1.0,
                r_d_ohm: 1.8e-3,
                e_on_j: 8e-3,
                e_off_j: 12e-3,
                e_rec_j: 6e-3,
                r_esr_ohm: 2e-3,
                r_ac_ohm: 1e-4,
                r_dc_ohm: 1e-4,
                thrm: ThermalNetwork {
                    r_th_k_per_w: 0.04,
                    c_th_j_per_k: 5.0e3,
                },
            },
            battery: Battery {
                pwr_max_w: 250e3,
                i_max_a: 600.0,
                r_i_ohm: 0.05,
                v_nom_v: 400.0,
                v_max_v: 450.0,
                v_min_v: 320.0,
                e_rated_kwh: 75.0,
                thrm: ThermalNetwork {
                    r_th_k_per_w: 0.02,
                    c_th_j_per_k: 2.0e5,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_roundtrip() {
        let setup = SimSetup::mock();
        let yaml = setup.to_yaml().unwrap();
        let back = SimSetup::from_yaml(yaml).unwrap();
        assert_eq!(setup, back);
    }

    #[test]
    fn test_options_default_when_missing() {
        let setup = SimSetup::mock();
        let mut value = serde_json::to_value(&setup).unwrap();
        value.as_object_mut().unwrap().remove("options");
        let back: SimSetup = serde_json::from_value(value).unwrap();
        assert_eq!(back.options, SimOptions::default());
    }

    #[test]
    fn test_mock_is_internally_consistent() {
        let setup = SimSetup::mock();
        assert!(setup.machine.i_max_a > 0.0);
        assert!(setup.battery.v_min_v < setup.battery.v_nom_v);
        assert!(setup.battery.v_nom_v < setup.battery.v_max_v);
        assert!(setup.options.soc_init > 0.0 && setup.options.soc_init <= 1.0);
    }
}
