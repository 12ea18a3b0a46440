//! High-voltage battery: internal-resistance electrical model behind the
//! narrow contract the co-simulation loop consumes, plus the shared thermal
//! parameters.

use crate::imports::*;
use crate::setup::LimitMode;
use crate::thermal::ThermalNetwork;
use crate::utils::sat;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Battery {
    /// rated discharge power [W]
    pub pwr_max_w: f64,
    /// rated current [A]
    pub i_max_a: f64,
    /// internal resistance [Ω]
    pub r_i_ohm: f64,
    /// nominal terminal voltage [V]
    pub v_nom_v: f64,
    /// terminal voltage at full charge [V]
    pub v_max_v: f64,
    /// terminal voltage at empty [V]
    pub v_min_v: f64,
    /// rated energy content [kWh]
    pub e_rated_kwh: f64,
    pub thrm: ThermalNetwork,
}

impl SerdeAPI for Battery {}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryElecOutput {
    /// charge drawn over the step [As]
    pub dq_as: f64,
    /// updated state of charge
    pub soc: f64,
    /// updated terminal voltage [V]
    pub vdc_v: f64,
    pub pwr_in_w: f64,
    pub pwr_out_w: f64,
    pub pwr_loss_w: f64,
    pub eff: f64,
}

impl Battery {
    /// Open-circuit voltage, linear in state of charge
    pub fn ocv_at(&self, soc: f64) -> f64 {
        self.v_min_v + (self.v_max_v - self.v_min_v) * soc
    }

    /// Electrical update for one step: internal-resistance loss, charge and
    /// SOC bookkeeping, and the new terminal voltage. Discharge current is
    /// positive.
    pub fn solve_electrical(
        &self,
        vdc_v: f64,
        i_dc_a: f64,
        dt_s: f64,
        soc: f64,
        _te_deg_c: f64,
        limits: LimitMode,
    ) -> BatteryElecOutput {
        let mut i_dc_a = i_dc_a;
        if limits == LimitMode::On {
            i_dc_a = sat(i_dc_a, self.i_max_a);
            let pwr_w = sat(vdc_v * i_dc_a, self.pwr_max_w);
            if vdc_v != 0.0 {
                i_dc_a = pwr_w / vdc_v;
            }
        }

        let pwr_loss_w = self.r_i_ohm * i_dc_a.powi(2);
        let pwr_out_w = vdc_v * i_dc_a;
        let pwr_in_w = pwr_out_w + pwr_loss_w;

        let dq_as = i_dc_a * dt_s;
        let soc = (soc - pwr_in_w * dt_s / (self.e_rated_kwh * 3.6e6)).clamp(0.0, 1.0);
        let vdc_v = self.ocv_at(soc) - self.r_i_ohm * i_dc_a;

        // regeneration sign inversion: magnitude, then reciprocal above unity
        let mut eff = (pwr_out_w / pwr_in_w).abs();
        if eff.is_nan() {
            eff = 1.0;
        }
        if eff >= 1.0 {
            eff = 1.0 / eff;
        }

        BatteryElecOutput {
            dq_as,
            soc,
            vdc_v,
            pwr_in_w,
            pwr_out_w,
            pwr_loss_w,
            eff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::SimSetup;

    fn battery() -> Battery {
        SimSetup::mock().battery
    }

    #[test]
    fn test_discharge_decreases_soc_and_voltage_sags() {
        let hvs = battery();
        let out = hvs.solve_electrical(380.0, 150.0, 1.0, 0.8, 25.0, LimitMode::Off);
        assert!(out.soc < 0.8);
        assert!(out.vdc_v < hvs.ocv_at(out.soc));
        assert!(out.pwr_loss_w > 0.0);
        assert!(out.eff > 0.0 && out.eff <= 1.0);
    }

    #[test]
    fn test_charge_increases_soc() {
        let hvs = battery();
        let out = hvs.solve_electrical(380.0, -100.0, 1.0, 0.5, 25.0, LimitMode::Off);
        assert!(out.soc > 0.5);
        assert!(out.dq_as < 0.0);
    }

    #[test]
    fn test_power_balance() {
        let hvs = battery();
        let out = hvs.solve_electrical(380.0, 200.0, 0.1, 0.7, 25.0, LimitMode::Off);
        assert!((out.pwr_in_w - out.pwr_out_w - out.pwr_loss_w).abs() < 1e-9);
    }

    #[test]
    fn test_idle_is_lossless_and_ideal() {
        let hvs = battery();
        let out = hvs.solve_electrical(380.0, 0.0, 1.0, 0.6, 25.0, LimitMode::Off);
        assert_eq!(out.pwr_loss_w, 0.0);
        assert_eq!(out.soc, 0.6);
        assert_eq!(out.eff, 1.0);
        assert_eq!(out.vdc_v, hvs.ocv_at(0.6));
    }

    #[test]
    fn test_limit_mode_caps_current_and_power() {
        let hvs = battery();
        let out = hvs.solve_electrical(380.0, 10.0 * hvs.i_max_a, 1.0, 0.9, 25.0, LimitMode::On);
        assert!(out.pwr_out_w <= hvs.pwr_max_w + 1e-9);
    }

    #[test]
    fn test_soc_saturates_at_bounds() {
        let hvs = battery();
        // absurdly long step fully drains the pack
        let out = hvs.solve_electrical(380.0, 400.0, 1e7, 0.05, 25.0, LimitMode::Off);
        assert_eq!(out.soc, 0.0);
    }
}
