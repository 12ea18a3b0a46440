//! Module for mission profiles: loading, resampling, and derived kinematic
//! quantities consumed by the simulation loop.

use crate::imports::*;
use crate::utils::{cumtrapz, gradient, zoh_resample};

fn default_te_deg_c() -> f64 {
    20.0
}

fn default_cool_vol_m3() -> f64 {
    5e-3
}

/// One sample of a mission-profile file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MissionProfileElement {
    /// time [s]
    #[serde(alias = "t")]
    pub time_s: f64,
    /// target vehicle speed [m/s]
    #[serde(alias = "v")]
    pub speed_mps: f64,
    /// road angle [rad]
    #[serde(alias = "ang", default)]
    pub grade_rad: f64,
    /// ambient temperature [°C]
    #[serde(alias = "T_A", default = "default_te_deg_c")]
    pub amb_te_deg_c: f64,
    /// coolant temperature [°C]
    #[serde(alias = "T_C", default = "default_te_deg_c")]
    pub cool_te_deg_c: f64,
    /// coolant volume [m^3]
    #[serde(alias = "Vol_C", default = "default_cool_vol_m3")]
    pub cool_vol_m3: f64,
    /// measured DC-link voltage [V]
    #[serde(alias = "V_DC", default)]
    pub vdc_meas_v: f64,
}

/// Mission profile resampled to the simulation rate. Target acceleration and
/// distance are derived from the speed trace on `init`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MissionProfile {
    pub name: String,
    /// time [s]
    pub time_s: Array1<f64>,
    /// target vehicle speed [m/s]
    pub speed_mps: Array1<f64>,
    /// target acceleration [m/s^2], derived
    #[serde(skip)]
    pub accel_mps2: Array1<f64>,
    /// target distance [m], derived
    #[serde(skip)]
    pub dist_m: Array1<f64>,
    /// road angle [rad]
    pub grade_rad: Array1<f64>,
    /// ambient temperature [°C]
    pub amb_te_deg_c: Array1<f64>,
    /// coolant temperature [°C]
    pub cool_te_deg_c: Array1<f64>,
    /// coolant volume [m^3]
    pub cool_vol_m3: Array1<f64>,
    /// measured DC-link voltage [V]
    pub vdc_meas_v: Array1<f64>,
}

impl SerdeAPI for MissionProfile {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(self.len() >= 2, format_dbg!(self.len() < 2));
        ensure!(
            (1..self.len()).all(|i| self.time_s[i] > self.time_s[i - 1]),
            "mission profile time must be strictly increasing"
        );
        self.accel_mps2 = gradient(&self.speed_mps, &self.time_s);
        self.dist_m = cumtrapz(&self.speed_mps, &self.time_s);
        Ok(())
    }
}

impl MissionProfile {
    pub fn len(&self) -> usize {
        self.time_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_s.is_empty()
    }

    /// Time step duration preceding sample `i`
    pub fn dt_s_at_i(&self, i: usize) -> f64 {
        self.time_s[i] - self.time_s[i - 1]
    }

    pub fn push(&mut self, elem: MissionProfileElement) {
        self.time_s
            .append(ndarray::Axis(0), array![elem.time_s].view())
            .unwrap();
        self.speed_mps
            .append(ndarray::Axis(0), array![elem.speed_mps].view())
            .unwrap();
        self.grade_rad
            .append(ndarray::Axis(0), array![elem.grade_rad].view())
            .unwrap();
        self.amb_te_deg_c
            .append(ndarray::Axis(0), array![elem.amb_te_deg_c].view())
            .unwrap();
        self.cool_te_deg_c
            .append(ndarray::Axis(0), array![elem.cool_te_deg_c].view())
            .unwrap();
        self.cool_vol_m3
            .append(ndarray::Axis(0), array![elem.cool_vol_m3].view())
            .unwrap();
        self.vdc_meas_v
            .append(ndarray::Axis(0), array![elem.vdc_meas_v].view())
            .unwrap();
    }

    /// Read a mission profile from a CSV file with columns
    /// `time_s,speed_mps[,grade_rad,amb_te_deg_c,cool_te_deg_c,cool_vol_m3,vdc_meas_v]`
    /// (original short column names are accepted as aliases). The profile name
    /// is taken from the file stem.
    pub fn from_csv_file<P: AsRef<Path>>(filepath: P) -> anyhow::Result<Self> {
        let filepath = filepath.as_ref();
        let name = filepath
            .file_stem()
            .and_then(OsStr::to_str)
            .with_context(|| format!("Could not parse profile name from filepath: {filepath:?}"))?
            .to_string();
        let file = File::open(filepath)
            .with_context(|| format!("Could not open mission profile: {filepath:?}"))?;
        let mut profile = Self::from_csv_reader(file)?;
        profile.name = name;
        Ok(profile)
    }

    pub fn from_csv_str<S: AsRef<str>>(csv_str: S, name: String) -> anyhow::Result<Self> {
        let mut profile = Self::from_csv_reader(csv_str.as_ref().as_bytes())?;
        profile.name = name;
        Ok(profile)
    }

    fn from_csv_reader<R: std::io::Read>(rdr: R) -> anyhow::Result<Self> {
        let mut profile = Self::default();
        let mut rdr = csv::Reader::from_reader(rdr);
        for result in rdr.deserialize() {
            profile.push(result?);
        }
        profile.init()?;
        Ok(profile)
    }

    /// Zero-order-hold resampling onto a uniform grid at `rate_hz`, with
    /// derived quantities recomputed on the new grid. Returns `self` cloned if
    /// the requested rate matches the current mean rate.
    pub fn resample(&self, rate_hz: f64) -> anyhow::Result<Self> {
        ensure!(rate_hz > 0.0, format_dbg!(rate_hz));
        let t0 = self.time_s[0];
        let t1 = self.time_s[self.len() - 1];
        let dt = 1.0 / rate_hz;
        let n = ((t1 - t0) * rate_hz).floor() as usize + 1;
        let rate_cur_hz = (self.len() - 1) as f64 / (t1 - t0);
        if (rate_cur_hz - rate_hz).abs() / rate_hz < 1e-9 {
            log::info!(
                "profile '{}' already sampled at {:.3} Hz, skipping resample",
                self.name,
                rate_hz
            );
            return Ok(self.clone());
        }
        let time_s = Array1::from_iter((0..n).map(|k| t0 + dt * k as f64));
        let mut out = Self {
            name: self.name.clone(),
            speed_mps: zoh_resample(&time_s, &self.time_s, &self.speed_mps),
            grade_rad: zoh_resample(&time_s, &self.time_s, &self.grade_rad),
            amb_te_deg_c: zoh_resample(&time_s, &self.time_s, &self.amb_te_deg_c),
            cool_te_deg_c: zoh_resample(&time_s, &self.time_s, &self.cool_te_deg_c),
            cool_vol_m3: zoh_resample(&time_s, &self.time_s, &self.cool_vol_m3),
            vdc_meas_v: zoh_resample(&time_s, &self.time_s, &self.vdc_meas_v),
            time_s,
            accel_mps2: Array::zeros(n),
            dist_m: Array::zeros(n),
        };
        out.init()?;
        log::info!(
            "profile '{}' resampled from {:.3} Hz to {:.3} Hz ({} samples)",
            out.name,
            rate_cur_hz,
            rate_hz,
            out.len()
        );
        Ok(out)
    }

    /// Synthetic trapezoidal urban hop at 10 Hz: accelerate, cruise, brake,
    /// stand still. Useful for tests and demo runs.
    pub fn mock() -> Self {
        let rate_hz = 10.0;
        let phases_s = [20.0, 30.0, 20.0, 10.0];
        let v_cruise = 15.0;
        let n = (phases_s.iter().sum::<f64>() * rate_hz) as usize + 1;
        let time_s = Array1::from_iter((0..n).map(|k| k as f64 / rate_hz));
        let speed_mps = time_s.mapv(|t| {
            if t < phases_s[0] {
                v_cruise * t / phases_s[0]
            } else if t < phases_s[0] + phases_s[1] {
                v_cruise
            } else if t < phases_s[0] + phases_s[1] + phases_s[2] {
                v_cruise * (1.0 - (t - phases_s[0] - phases_s[1]) / phases_s[2])
            } else {
                0.0
            }
        });
        let mut profile = Self {
            name: "mock".into(),
            speed_mps,
            accel_mps2: Array::zeros(n),
            dist_m: Array::zeros(n),
            grade_rad: Array::zeros(n),
            amb_te_deg_c: Array::from_elem(n, 20.0),
            cool_te_deg_c: Array::from_elem(n, 25.0),
            cool_vol_m3: Array::from_elem(n, default_cool_vol_m3()),
            vdc_meas_v: Array::from_elem(n, 400.0),
            time_s,
        };
        profile.init().unwrap();
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_roundtrip_with_short_names() {
        let csv_str = "t,v,ang,T_A,T_C\n\
                       0.0,0.0,0.0,20.0,25.0\n\
                       1.0,1.0,0.0,20.0,25.0\n\
                       2.0,2.0,0.0,20.0,25.0\n";
        let profile = MissionProfile::from_csv_str(csv_str, "short".to_string()).unwrap();
        assert_eq!(profile.len(), 3);
        assert_eq!(profile.speed_mps[2], 2.0);
        assert_eq!(profile.cool_te_deg_c[0], 25.0);
        // derived on init
        assert!((profile.accel_mps2[1] - 1.0).abs() < 1e-12);
        assert!((profile.dist_m[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_resample_halves_step() {
        let profile = MissionProfile::mock();
        let resampled = profile.resample(20.0).unwrap();
        assert_eq!(resampled.len(), (profile.len() - 1) * 2 + 1);
        assert!((resampled.dt_s_at_i(1) - 0.05).abs() < 1e-12);
        // ZOH keeps the value plateau
        assert_eq!(resampled.speed_mps[resampled.len() - 1], 0.0);
    }

    #[test]
    fn test_mock_profile_is_consistent() {
        let profile = MissionProfile::mock();
        assert_eq!(profile.len(), 801);
        assert_eq!(profile.speed_mps[0], 0.0);
        assert!((profile.speed_mps[300] - 15.0).abs() < 1e-12);
        assert!(profile.dist_m[profile.len() - 1] > 0.0);
    }
}
