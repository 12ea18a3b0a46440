//! Vehicle-level model: chassis parameters, road-load forces, the
//! acceleration and cooling contracts consumed by the co-simulation loop, and
//! the drivetrain torque split.

use crate::imports::*;
use crate::params::PhysicalProperties;

/// Driven-axle architecture. AWD splits torque between the axles by the
/// configured accelerating/braking fractions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drivetrain {
    Rwd,
    Fwd,
    Awd,
}

/// Per-sample road-load force breakdown [N]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoadLoads {
    pub f_drag_n: f64,
    pub f_roll_n: f64,
    pub f_climb_n: f64,
}

impl RoadLoads {
    pub fn total(&self) -> f64 {
        self.f_drag_n + self.f_roll_n + self.f_climb_n
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vehicle {
    /// curb mass [kg]
    pub mass_kg: f64,
    /// rolling resistance coefficient
    pub c_rr: f64,
    /// frontal area [m^2]
    pub frontal_area_m2: f64,
    /// aerodynamic drag coefficient
    pub c_drag: f64,
    /// headwind speed [m/s]
    pub headwind_mps: f64,
    /// rim radius [m]
    pub r_rim_m: f64,
    /// rim mass [kg]
    pub m_rim_kg: f64,
    /// tire radius [m]
    pub r_tire_m: f64,
    /// tire mass [kg]
    pub m_tire_kg: f64,
    /// tire flattening ratio, dynamic radius = r_tire * r_flat
    pub r_flat: f64,
    /// front-axle torque fraction while accelerating (AWD)
    pub split_accel: f64,
    /// front-axle torque fraction while braking (AWD)
    pub split_brake: f64,
    /// overall driveline efficiency for ideal-consumption estimates
    pub eta_driveline: f64,
    /// coolant density [kg/m^3]
    pub cool_rho_kg_per_m3: f64,
    /// coolant specific heat [J/(kg·K)]
    pub cool_cp_j_per_kg_k: f64,
    /// radiator convection coefficient at standstill [W/(m^2·K)]
    pub cool_htc_w_per_m2_k: f64,
    /// radiator area [m^2]
    pub area_radiator_m2: f64,
}

impl SerdeAPI for Vehicle {}

impl Vehicle {
    /// Dynamic tire radius [m]
    pub fn r_dyn_m(&self) -> f64 {
        self.r_tire_m * self.r_flat
    }

    /// Equivalent translational mass of the four rotating wheels [kg]
    pub fn mass_rot_kg(&self) -> f64 {
        let j_whl = 0.5 * self.m_rim_kg * self.r_rim_m.powi(2)
            + self.m_tire_kg * self.r_tire_m.powi(2);
        4.0 * j_whl / self.r_dyn_m().powi(2)
    }

    /// Road-load forces at speed `v_mps` on grade `grade_rad`. Rolling
    /// resistance only acts on a moving vehicle.
    pub fn road_loads(&self, props: &PhysicalProperties, v_mps: f64, grade_rad: f64) -> RoadLoads {
        let f_drag_n = 0.5
            * props.air_density_kg_per_m3
            * self.frontal_area_m2
            * self.c_drag
            * (self.headwind_mps - v_mps).powi(2);
        let f_roll_n = if v_mps > 0.0 {
            self.c_rr * self.mass_kg * props.a_grav_mps2 * grade_rad.cos()
        } else {
            0.0
        };
        let f_climb_n = self.mass_kg * props.a_grav_mps2 * grade_rad.sin();
        RoadLoads {
            f_drag_n,
            f_roll_n,
            f_climb_n,
        }
    }

    /// Achievable acceleration for a wheel torque against the road loads
    pub fn calc_acceleration(
        &self,
        props: &PhysicalProperties,
        trq_whl_nm: f64,
        v_mps: f64,
        grade_rad: f64,
    ) -> f64 {
        let f_whl_n = trq_whl_nm / self.r_dyn_m();
        (f_whl_n - self.road_loads(props, v_mps, grade_rad).total())
            / (self.mass_kg + self.mass_rot_kg())
    }

    /// Coolant-loop update: component losses heat the lumped coolant volume,
    /// the radiator rejects heat to ambient with speed-dependent convection.
    /// Returns the new coolant temperature and the rejected heat flow.
    pub fn calc_cooling(
        &self,
        pwr_loss_w: f64,
        v_mps: f64,
        cool_vol_m3: f64,
        amb_te_deg_c: f64,
        cool_te_deg_c: f64,
        dt_s: f64,
    ) -> (f64, f64) {
        let heat_cap_j_per_k = cool_vol_m3 * self.cool_rho_kg_per_m3 * self.cool_cp_j_per_kg_k;
        let htc = self.cool_htc_w_per_m2_k * (1.0 + v_mps.abs());
        let qdot_rej_w = htc * self.area_radiator_m2 * (cool_te_deg_c - amb_te_deg_c);
        let cool_te_deg_c =
            cool_te_deg_c + (pwr_loss_w - qdot_rej_w) * dt_s / heat_cap_j_per_k;
        (cool_te_deg_c, qdot_rej_w)
    }

    /// Fraction of the wheel torque carried by the front axle
    pub fn split_front(&self, drivetrain: Drivetrain, accelerating: bool) -> f64 {
        match drivetrain {
            Drivetrain::Rwd => 0.0,
            Drivetrain::Fwd => 1.0,
            Drivetrain::Awd => {
                if accelerating {
                    self.split_accel
                } else {
                    self.split_brake
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::SimSetup;

    fn vehicle() -> Vehicle {
        SimSetup::mock().vehicle
    }

    #[test]
    fn test_rolling_resistance_gated_on_motion() {
        let veh = vehicle();
        let props = PhysicalProperties::default();
        assert_eq!(veh.road_loads(&props, 0.0, 0.0).f_roll_n, 0.0);
        assert!(veh.road_loads(&props, 1.0, 0.0).f_roll_n > 0.0);
    }

    #[test]
    fn test_drag_grows_quadratically() {
        let veh = vehicle();
        let props = PhysicalProperties::default();
        let f10 = veh.road_loads(&props, 10.0, 0.0).f_drag_n;
        let f20 = veh.road_loads(&props, 20.0, 0.0).f_drag_n;
        assert!(f20 > 3.0 * f10);
    }

    #[test]
    fn test_acceleration_sign_follows_torque() {
        let veh = vehicle();
        let props = PhysicalProperties::default();
        assert!(veh.calc_acceleration(&props, 2000.0, 10.0, 0.0) > 0.0);
        assert!(veh.calc_acceleration(&props, -2000.0, 10.0, 0.0) < 0.0);
    }

    #[test]
    fn test_rotating_mass_increases_inertia() {
        let veh = vehicle();
        assert!(veh.mass_rot_kg() > 0.0);
        assert!(veh.mass_rot_kg() < 0.1 * veh.mass_kg);
    }

    #[test]
    fn test_cooling_moves_toward_ambient_without_losses() {
        let veh = vehicle();
        let (tc, qdot) = veh.calc_cooling(0.0, 20.0, 5e-3, 20.0, 60.0, 1.0);
        assert!(tc < 60.0);
        assert!(qdot > 0.0);
    }

    #[test]
    fn test_cooling_heats_under_loss() {
        let veh = vehicle();
        let (tc, _) = veh.calc_cooling(5_000.0, 0.0, 5e-3, 20.0, 20.0, 1.0);
        assert!(tc > 20.0);
    }

    #[test]
    fn test_split_fractions() {
        let veh = vehicle();
        assert_eq!(veh.split_front(Drivetrain::Rwd, true), 0.0);
        assert_eq!(veh.split_front(Drivetrain::Fwd, true), 1.0);
        assert_eq!(veh.split_front(Drivetrain::Awd, true), veh.split_accel);
        assert_eq!(veh.split_front(Drivetrain::Awd, false), veh.split_brake);
    }
}
