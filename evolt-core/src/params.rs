//! Module containing shared physical parameters.

use crate::imports::*;

/// Temperature coefficient of copper resistance [1/K], applied to stator and
/// busbar resistances relative to 20 °C
pub const ALPHA_CU_PER_K: f64 = 0.00393;

/// Reference temperature for resistance scaling [°C]
pub const TE_REF_DEG_C: f64 = 20.0;

/// Small value guarding divisions by near-zero quantities
pub const EPS: f64 = 1e-12;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PhysicalProperties {
    pub air_density_kg_per_m3: f64, // = 1.2, Sea level air density at approximately 20C
    pub a_grav_mps2: f64,           // = 9.81
}

impl Default for PhysicalProperties {
    fn default() -> Self {
        Self {
            air_density_kg_per_m3: 1.2,
            a_grav_mps2: 9.81,
        }
    }
}

impl SerdeAPI for PhysicalProperties {}

/// Stator/busbar resistance at temperature `te_deg_c`, scaled linearly from
/// the 20 °C reference value
pub fn resistance_at(r_ref_ohm: f64, te_deg_c: f64) -> f64 {
    r_ref_ohm * (1.0 + ALPHA_CU_PER_K * (te_deg_c - TE_REF_DEG_C))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resistance_at_reference_is_unscaled() {
        assert_eq!(resistance_at(0.01, 20.0), 0.01);
    }

    #[test]
    fn test_resistance_grows_with_temperature() {
        assert!(resistance_at(0.01, 120.0) > 0.01);
        assert!((resistance_at(1.0, 120.0) - (1.0 + 0.393)).abs() < 1e-12);
    }
}
