//! Module for the lumped-parameter self-heating model shared by all
//! powertrain components.

use crate::imports::*;

/// Single-RC thermal network between a component hotspot and its coolant
/// reference. Every component (gearbox, machine, inverter, battery) carries
/// one of these and is integrated with the same bilinear scheme.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ThermalNetwork {
    /// thermal resistance to coolant [K/W]
    pub r_th_k_per_w: f64,
    /// thermal capacitance [J/K]
    pub c_th_j_per_k: f64,
}

impl ThermalNetwork {
    pub fn time_constant_s(&self) -> f64 {
        self.r_th_k_per_w * self.c_th_j_per_k
    }

    /// Bilinear-transform (Tustin) update of the temperature rise above
    /// coolant for one sample interval.
    ///
    /// # Arguments
    /// - `dt_s`: time between the two samples
    /// - `d_te_prev_k`: temperature rise above coolant at the previous sample
    /// - `pwr_loss_prev_w`: dissipated power at the previous sample
    /// - `pwr_loss_cur_w`: dissipated power at the current sample
    ///
    /// The discretization assumes `dt` is small relative to `2*tau`; this is
    /// not enforced here (see `SimDrive::new` for the advisory check).
    pub fn step(
        &self,
        dt_s: f64,
        d_te_prev_k: f64,
        pwr_loss_prev_w: f64,
        pwr_loss_cur_w: f64,
    ) -> f64 {
        let tau = self.time_constant_s();
        (2.0 * tau - dt_s) / (2.0 * tau + dt_s) * d_te_prev_k
            + (self.r_th_k_per_w * dt_s) / (2.0 * tau + dt_s)
                * (pwr_loss_prev_w + pwr_loss_cur_w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net() -> ThermalNetwork {
        ThermalNetwork {
            r_th_k_per_w: 0.05,
            c_th_j_per_k: 2.0e4,
        }
    }

    #[test]
    fn test_zero_loss_at_ambient_stays_at_ambient() {
        let net = net();
        let mut d_te = 0.0;
        for _ in 0..10_000 {
            d_te = net.step(0.1, d_te, 0.0, 0.0);
        }
        assert_eq!(d_te, 0.0);
    }

    #[test]
    fn test_constant_loss_settles_at_rth_times_pv() {
        let net = net();
        let pv = 500.0;
        let mut d_te = 0.0;
        // several time constants
        let dt = 1.0;
        let steps = (10.0 * net.time_constant_s() / dt) as usize;
        for _ in 0..steps {
            d_te = net.step(dt, d_te, pv, pv);
        }
        assert!(d_te.approx_eq(&(net.r_th_k_per_w * pv), 1e-4));
    }

    #[test]
    fn test_decay_toward_reference_without_loss() {
        let net = net();
        let d_te = net.step(1.0, 10.0, 0.0, 0.0);
        assert!(d_te < 10.0);
        assert!(d_te > 0.0);
    }
}
