//! Co-simulation loop: drives every mission sample through the mechanical,
//! electrical, thermal, and (optionally) vehicle-feedback phases in strict
//! order, filling pre-allocated per-quantity time series.

use crate::cycle::MissionProfile;
use crate::imports::*;
use crate::params::PhysicalProperties;
use crate::powertrain::battery::Battery;
use crate::powertrain::e_machine::ElectricMachine;
use crate::powertrain::gearbox::Gearbox;
use crate::powertrain::inverter::Inverter;
use crate::setup::{CoolingMode, LimitMode, SimOptions, SimSetup, TraceMode, VoltageSource};
use crate::utils::max;
use crate::vehicle::Vehicle;

/// Tolerance for the per-sample power balance audit [W]
const PWR_BALANCE_TOL_W: f64 = 1e-6;
/// Bus voltage used when limit enforcement is off
const VDC_UNLIMITED_V: f64 = 1000.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WheelHistory {
    /// wheel torque [Nm]
    pub trq_nm: Array1<f64>,
    /// wheel speed [rev/s]
    pub speed_rps: Array1<f64>,
}

impl WheelHistory {
    fn new(n: usize) -> Self {
        Self {
            trq_nm: Array::zeros(n),
            speed_rps: Array::zeros(n),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GearboxHistory {
    /// hotspot temperature [°C]
    pub te_deg_c: Array1<f64>,
    /// machine-side torque demand [Nm]
    pub trq_nm: Array1<f64>,
    /// machine-side speed [rev/s]
    pub speed_rps: Array1<f64>,
    pub pwr_in_w: Array1<f64>,
    pub pwr_out_w: Array1<f64>,
    pub pwr_loss_w: Array1<f64>,
    pub pwr_loss_bearing_w: Array1<f64>,
    pub pwr_loss_mesh_w: Array1<f64>,
    pub pwr_loss_windage_w: Array1<f64>,
    pub eff: Array1<f64>,
}

impl GearboxHistory {
    fn new(n: usize, te_init_deg_c: f64) -> Self {
        Self {
            te_deg_c: Array::from_elem(n, te_init_deg_c),
            trq_nm: Array::zeros(n),
            speed_rps: Array::zeros(n),
            pwr_in_w: Array::zeros(n),
            pwr_out_w: Array::zeros(n),
            pwr_loss_w: Array::zeros(n),
            pwr_loss_bearing_w: Array::zeros(n),
            pwr_loss_mesh_w: Array::zeros(n),
            pwr_loss_windage_w: Array::zeros(n),
            eff: Array::zeros(n),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MachineHistory {
    /// winding hotspot temperature [°C]
    pub te_deg_c: Array1<f64>,
    /// torque demand from the mechanical pass [Nm]
    pub trq_dem_nm: Array1<f64>,
    /// rotational speed [rev/s]
    pub speed_rps: Array1<f64>,
    /// mechanical-pass power demand [W]
    pub pwr_mech_w: Array1<f64>,
    pub pwr_in_w: Array1<f64>,
    pub pwr_out_w: Array1<f64>,
    pub pwr_loss_w: Array1<f64>,
    pub pwr_loss_mech_w: Array1<f64>,
    pub pwr_loss_stator_w: Array1<f64>,
    pub eff: Array1<f64>,
    pub pwr_factor: Array1<f64>,
    pub i_d_a: Array1<f64>,
    pub i_q_a: Array1<f64>,
    pub i_s_a: Array1<f64>,
    pub v_d_v: Array1<f64>,
    pub v_q_v: Array1<f64>,
    pub v_s_v: Array1<f64>,
    pub flux_vs: Array1<f64>,
    pub trq_inner_nm: Array1<f64>,
    pub trq_shaft_nm: Array1<f64>,
    /// samples whose solve stayed infeasible after the retry budget
    pub infeasible: Array1<bool>,
}

impl MachineHistory {
    fn new(n: usize, te_init_deg_c: f64) -> Self {
        Self {
            te_deg_c: Array::from_elem(n, te_init_deg_c),
            trq_dem_nm: Array::zeros(n),
            speed_rps: Array::zeros(n),
            pwr_mech_w: Array::zeros(n),
            pwr_in_w: Array::zeros(n),
            pwr_out_w: Array::zeros(n),
            pwr_loss_w: Array::zeros(n),
            pwr_loss_mech_w: Array::zeros(n),
            pwr_loss_stator_w: Array::zeros(n),
            eff: Array::zeros(n),
            pwr_factor: Array::zeros(n),
            i_d_a: Array::zeros(n),
            i_q_a: Array::zeros(n),
            i_s_a: Array::zeros(n),
            v_d_v: Array::zeros(n),
            v_q_v: Array::zeros(n),
            v_s_v: Array::zeros(n),
            flux_vs: Array::zeros(n),
            trq_inner_nm: Array::zeros(n),
            trq_shaft_nm: Array::zeros(n),
            infeasible: Array::from_elem(n, false),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InverterHistory {
    /// junction temperature [°C]
    pub te_deg_c: Array1<f64>,
    pub pwr_in_w: Array1<f64>,
    pub pwr_out_w: Array1<f64>,
    pub pwr_loss_w: Array1<f64>,
    pub pwr_loss_switch_w: Array1<f64>,
    pub pwr_loss_cap_w: Array1<f64>,
    pub pwr_loss_busbar_ac_w: Array1<f64>,
    pub pwr_loss_busbar_dc_w: Array1<f64>,
    pub eff: Array1<f64>,
    pub i_dc_a: Array1<f64>,
    pub i_cap_a: Array1<f64>,
    pub i_s_a: Array1<f64>,
    pub mod_index: Array1<f64>,
}

impl InverterHistory {
    fn new(n: usize, te_init_deg_c: f64) -> Self {
        Self {
            te_deg_c: Array::from_elem(n, te_init_deg_c),
            pwr_in_w: Array::zeros(n),
            pwr_out_w: Array::zeros(n),
            pwr_loss_w: Array::zeros(n),
            pwr_loss_switch_w: Array::zeros(n),
            pwr_loss_cap_w: Array::zeros(n),
            pwr_loss_busbar_ac_w: Array::zeros(n),
            pwr_loss_busbar_dc_w: Array::zeros(n),
            eff: Array::zeros(n),
            i_dc_a: Array::zeros(n),
            i_cap_a: Array::zeros(n),
            i_s_a: Array::zeros(n),
            mod_index: Array::zeros(n),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatteryHistory {
    /// cell hotspot temperature [°C]
    pub te_deg_c: Array1<f64>,
    /// charge throughput per step [As]
    pub dq_as: Array1<f64>,
    pub soc: Array1<f64>,
    pub vdc_v: Array1<f64>,
    pub i_dc_a: Array1<f64>,
    pub pwr_in_w: Array1<f64>,
    pub pwr_out_w: Array1<f64>,
    pub pwr_loss_w: Array1<f64>,
    pub eff: Array1<f64>,
}

impl BatteryHistory {
    fn new(n: usize, te_init_deg_c: f64) -> Self {
        Self {
            te_deg_c: Array::from_elem(n, te_init_deg_c),
            dq_as: Array::zeros(n),
            soc: Array::zeros(n),
            vdc_v: Array::zeros(n),
            i_dc_a: Array::zeros(n),
            pwr_in_w: Array::zeros(n),
            pwr_out_w: Array::zeros(n),
            pwr_loss_w: Array::zeros(n),
            eff: Array::zeros(n),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VehicleHistory {
    /// DC-link voltage seen by the drivetrain [V]
    pub vdc_v: Array1<f64>,
    pub soc: Array1<f64>,
    /// coolant temperature [°C]
    pub cool_te_deg_c: Array1<f64>,
    /// radiator heat rejection [W]
    pub qdot_rej_w: Array1<f64>,
    pub f_drag_n: Array1<f64>,
    pub f_roll_n: Array1<f64>,
    pub f_climb_n: Array1<f64>,
    pub f_accel_n: Array1<f64>,
    pub f_total_n: Array1<f64>,
    /// tractive power demand at the wheels [W]
    pub pwr_trac_w: Array1<f64>,
    /// achieved speed (equals the target trace when prescribed) [m/s]
    pub speed_ach_mps: Array1<f64>,
    pub accel_ach_mps2: Array1<f64>,
    pub dist_ach_m: Array1<f64>,
}

impl VehicleHistory {
    fn new(cyc: &MissionProfile) -> Self {
        let n = cyc.len();
        Self {
            vdc_v: Array::zeros(n),
            soc: Array::zeros(n),
            cool_te_deg_c: Array::zeros(n),
            qdot_rej_w: Array::zeros(n),
            f_drag_n: Array::zeros(n),
            f_roll_n: Array::zeros(n),
            f_climb_n: Array::zeros(n),
            f_accel_n: Array::zeros(n),
            f_total_n: Array::zeros(n),
            pwr_trac_w: Array::zeros(n),
            speed_ach_mps: cyc.speed_mps.clone(),
            accel_ach_mps2: cyc.accel_mps2.clone(),
            dist_ach_m: cyc.dist_m.clone(),
        }
    }
}

/// Run-level results for reporting
impl SerdeAPI for SimSummary {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimSummary {
    pub samples: usize,
    pub dist_m: f64,
    pub energy_dc_wh: f64,
    pub energy_wh_per_km: f64,
    pub final_soc: f64,
    pub te_max_machine_deg_c: f64,
    pub te_max_inverter_deg_c: f64,
    pub te_max_gearbox_deg_c: f64,
    pub te_max_battery_deg_c: f64,
    pub infeasible_samples: usize,
}

impl SerdeAPI for SimDrive {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimDrive {
    pub cyc: MissionProfile,
    pub options: SimOptions,
    pub props: PhysicalProperties,
    pub veh: Vehicle,
    pub gbx: Gearbox,
    pub ema: ElectricMachine,
    pub inv: Inverter,
    pub hvs: Battery,
    /// current sample index
    pub i: usize,
    pub veh_hist: VehicleHistory,
    pub whe_front: WheelHistory,
    pub whe_rear: WheelHistory,
    pub gbx_front: GearboxHistory,
    pub gbx_rear: GearboxHistory,
    pub gbx_total: GearboxHistory,
    pub ema_front: MachineHistory,
    pub ema_rear: MachineHistory,
    pub ema_total: MachineHistory,
    pub inv_front: InverterHistory,
    pub inv_rear: InverterHistory,
    pub inv_total: InverterHistory,
    pub hvs_hist: BatteryHistory,
    pub infeasible_samples: usize,
}

impl SimDrive {
    /// Build a simulation from a setup and a mission profile. The profile is
    /// resampled to the configured rate; histories are pre-allocated to the
    /// mission length and initial conditions written at sample 0.
    pub fn new(setup: SimSetup, cyc: MissionProfile) -> anyhow::Result<Self> {
        let options = setup.options;
        let cyc = cyc.resample(options.sample_rate_hz)?;
        let n = cyc.len();
        ensure!(n >= 2, format_dbg!(n < 2));

        // coolant temperature source
        let cool_te_deg_c = match options.cooling {
            CoolingMode::Constant => Array::from_elem(n, options.cool_te_deg_c),
            CoolingMode::Measured | CoolingMode::Model => cyc.cool_te_deg_c.clone(),
        };
        let te_init_deg_c = cool_te_deg_c[0];

        // DC-link voltage and SOC sources
        let hvs = setup.battery.clone();
        let (vdc_v, soc) = if options.limits == LimitMode::Off {
            log::info!("limit enforcement off, pinning DC link to {VDC_UNLIMITED_V} V");
            (
                Array::from_elem(n, VDC_UNLIMITED_V),
                Array::from_elem(n, options.soc_init),
            )
        } else {
            match options.voltage_source {
                VoltageSource::Constant => (
                    Array::from_elem(n, hvs.v_nom_v),
                    Array::from_elem(
                        n,
                        (hvs.v_nom_v - hvs.v_min_v) / (hvs.v_max_v - hvs.v_min_v),
                    ),
                ),
                VoltageSource::Measured => (
                    cyc.vdc_meas_v.clone(),
                    cyc.vdc_meas_v
                        .mapv(|v| (v - hvs.v_min_v) / (hvs.v_max_v - hvs.v_min_v)),
                ),
                VoltageSource::SocDerived => {
                    let mut vdc = Array::zeros(n);
                    vdc[0] = hvs.ocv_at(options.soc_init);
                    let mut soc = Array::zeros(n);
                    soc[0] = options.soc_init;
                    (vdc, soc)
                }
            }
        };

        let dt_s = cyc.dt_s_at_i(1);
        for (name, tau_s) in [
            ("gearbox", setup.gearbox.thrm.time_constant_s()),
            ("machine", setup.machine.thrm.time_constant_s()),
            ("inverter", setup.inverter.thrm.time_constant_s()),
            ("battery", setup.battery.thrm.time_constant_s()),
        ] {
            if dt_s >= tau_s / 5.0 {
                log::warn!(
                    "{name} thermal time constant ({tau_s:.1} s) is close to the sample \
                     interval ({dt_s:.3} s); the bilinear update may be inaccurate"
                );
            }
        }

        let mut veh_hist = VehicleHistory::new(&cyc);
        veh_hist.vdc_v = vdc_v;
        veh_hist.soc = soc;
        veh_hist.cool_te_deg_c = cool_te_deg_c;

        let mut hvs_hist = BatteryHistory::new(n, te_init_deg_c);
        hvs_hist.vdc_v[0] = veh_hist.vdc_v[0];
        hvs_hist.soc[0] = veh_hist.soc[0];

        Ok(Self {
            options,
            props: PhysicalProperties::default(),
            veh: setup.vehicle,
            gbx: setup.gearbox,
            ema: setup.machine,
            inv: setup.inverter,
            hvs,
            i: 1,
            veh_hist,
            whe_front: WheelHistory::new(n),
            whe_rear: WheelHistory::new(n),
            gbx_front: GearboxHistory::new(n, te_init_deg_c),
            gbx_rear: GearboxHistory::new(n, te_init_deg_c),
            gbx_total: GearboxHistory::new(n, te_init_deg_c),
            ema_front: MachineHistory::new(n, te_init_deg_c),
            ema_rear: MachineHistory::new(n, te_init_deg_c),
            ema_total: MachineHistory::new(n, te_init_deg_c),
            inv_front: InverterHistory::new(n, te_init_deg_c),
            inv_rear: InverterHistory::new(n, te_init_deg_c),
            inv_total: InverterHistory::new(n, te_init_deg_c),
            hvs_hist,
            infeasible_samples: 0,
            cyc,
        })
    }

    /// Run all remaining samples
    pub fn walk(&mut self) -> anyhow::Result<()> {
        log::info!(
            "starting drive simulation: profile '{}', {} samples",
            self.cyc.name,
            self.cyc.len()
        );
        while self.i < self.cyc.len() {
            self.step()
                .with_context(|| format!("failure at sample {}", self.i))?;
        }
        if self.infeasible_samples > 0 {
            log::warn!(
                "{} of {} samples stayed infeasible after torque de-rating",
                self.infeasible_samples,
                self.cyc.len()
            );
        }
        log::info!("drive simulation finished");
        Ok(())
    }

    /// Advance one time step
    pub fn step(&mut self) -> anyhow::Result<()> {
        self.solve_step(self.i)?;
        self.i += 1;
        Ok(())
    }

    /// Perform all calculations to solve one time step, in strict phase order
    pub fn solve_step(&mut self, i: usize) -> anyhow::Result<()> {
        self.set_mech_calcs(i);
        self.set_elec_calcs(i)?;
        self.set_thermal_calcs(i);
        if self.options.trace == TraceMode::Achieved {
            self.set_ach_speed(i);
        }
        Ok(())
    }

    /// Mechanical pass: road loads, wheel torque/speed, per-axle split,
    /// gearbox and machine mechanical demand
    pub fn set_mech_calcs(&mut self, i: usize) {
        let (v_mps, accel_mps2) = match self.options.trace {
            TraceMode::Prescribed => (self.cyc.speed_mps[i], self.cyc.accel_mps2[i]),
            TraceMode::Achieved => (self.veh_hist.speed_ach_mps[i - 1], self.cyc.accel_mps2[i]),
        };
        let grade_rad = self.cyc.grade_rad[i];

        let loads = self.veh.road_loads(&self.props, v_mps, grade_rad);
        let f_accel_n = (self.veh.mass_kg + self.veh.mass_rot_kg()) * accel_mps2;
        let f_total_n = loads.total() + f_accel_n;
        self.veh_hist.f_drag_n[i] = loads.f_drag_n;
        self.veh_hist.f_roll_n[i] = loads.f_roll_n;
        self.veh_hist.f_climb_n[i] = loads.f_climb_n;
        self.veh_hist.f_accel_n[i] = f_accel_n;
        self.veh_hist.f_total_n[i] = f_total_n;
        self.veh_hist.pwr_trac_w[i] = f_total_n * v_mps;

        let r_dyn_m = self.veh.r_dyn_m();
        let speed_whl_rps = v_mps / (2.0 * PI * r_dyn_m);
        let trq_whl_nm = f_total_n * r_dyn_m;
        let split_front = self
            .veh
            .split_front(self.options.drivetrain, trq_whl_nm > 0.0);

        self.whe_front.trq_nm[i] = trq_whl_nm * split_front;
        self.whe_front.speed_rps[i] = speed_whl_rps;
        self.whe_rear.trq_nm[i] = trq_whl_nm * (1.0 - split_front);
        self.whe_rear.speed_rps[i] = speed_whl_rps;

        for axle in [Axle::Front, Axle::Rear] {
            let trq_axle_nm = self.whe(axle).trq_nm[i];
            let gbx_out = self
                .gbx
                .solve_mechanical(trq_axle_nm, speed_whl_rps, self.options.limits);
            let gbx_h = self.gbx_hist_mut(axle);
            gbx_h.trq_nm[i] = gbx_out.trq_out_nm;
            gbx_h.speed_rps[i] = gbx_out.speed_out_rps;
            gbx_h.pwr_in_w[i] = gbx_out.pwr_in_w;
            gbx_h.pwr_out_w[i] = gbx_out.pwr_out_w;
            gbx_h.pwr_loss_w[i] = gbx_out.losses.pwr_total_w;
            gbx_h.pwr_loss_bearing_w[i] = gbx_out.losses.pwr_bearing_w;
            gbx_h.pwr_loss_mesh_w[i] = gbx_out.losses.pwr_mesh_w;
            gbx_h.pwr_loss_windage_w[i] = gbx_out.losses.pwr_windage_w;
            gbx_h.eff[i] = gbx_out.eff;

            let ema_mech = self.ema.calc_mech(gbx_out.trq_out_nm, gbx_out.speed_out_rps);
            let ema_h = self.ema_hist_mut(axle);
            ema_h.trq_dem_nm[i] = ema_mech.trq_nm;
            ema_h.speed_rps[i] = ema_mech.speed_rps;
            ema_h.pwr_mech_w[i] = ema_mech.pwr_w;
        }

        // axis totals
        self.gbx_total.trq_nm[i] = self.gbx_front.trq_nm[i] + self.gbx_rear.trq_nm[i];
        self.gbx_total.speed_rps[i] = self.gbx_front.speed_rps[i];
        self.gbx_total.pwr_in_w[i] = self.gbx_front.pwr_in_w[i] + self.gbx_rear.pwr_in_w[i];
        self.gbx_total.pwr_out_w[i] = self.gbx_front.pwr_out_w[i] + self.gbx_rear.pwr_out_w[i];
        self.gbx_total.pwr_loss_w[i] = self.gbx_front.pwr_loss_w[i] + self.gbx_rear.pwr_loss_w[i];
        self.gbx_total.pwr_loss_bearing_w[i] =
            self.gbx_front.pwr_loss_bearing_w[i] + self.gbx_rear.pwr_loss_bearing_w[i];
        self.gbx_total.pwr_loss_mesh_w[i] =
            self.gbx_front.pwr_loss_mesh_w[i] + self.gbx_rear.pwr_loss_mesh_w[i];
        self.gbx_total.pwr_loss_windage_w[i] =
            self.gbx_front.pwr_loss_windage_w[i] + self.gbx_rear.pwr_loss_windage_w[i];
        self.gbx_total.eff[i] = 0.5 * (self.gbx_front.eff[i] + self.gbx_rear.eff[i]);

        self.ema_total.trq_dem_nm[i] = self.ema_front.trq_dem_nm[i] + self.ema_rear.trq_dem_nm[i];
        self.ema_total.speed_rps[i] = self.ema_front.speed_rps[i];
        self.ema_total.pwr_mech_w[i] = self.ema_front.pwr_mech_w[i] + self.ema_rear.pwr_mech_w[i];
    }

    /// Electrical pass: machine solve per axle against the previous-sample bus
    /// state, inverter pass, DC aggregation, battery update
    pub fn set_elec_calcs(&mut self, i: usize) -> anyhow::Result<()> {
        let dt_s = self.cyc.dt_s_at_i(i);
        let vdc_prev_v = self.veh_hist.vdc_v[i - 1];
        let soc_prev = self.veh_hist.soc[i - 1];

        for axle in [Axle::Front, Axle::Rear] {
            let ema_h = self.ema_hist(axle);
            let out = self.ema.solve_electrical(
                ema_h.speed_rps[i],
                ema_h.trq_dem_nm[i],
                self.options.solver,
                vdc_prev_v,
                self.inv.f_sw_hz,
                ema_h.te_deg_c[i - 1],
                self.options.max_solver_iter,
            );
            if !out.status.is_feasible() {
                self.infeasible_samples += 1;
                self.ema_hist_mut(axle).infeasible[i] = true;
                if self.options.abort_on_infeasible {
                    bail!(
                        "machine solver ended {:?} after {} de-rating retries \
                         ({:.1} Nm at {:.1} rev/s, {:.0} V bus)",
                        out.status,
                        out.derate_iters,
                        self.ema_hist(axle).trq_dem_nm[i],
                        self.ema_hist(axle).speed_rps[i],
                        vdc_prev_v,
                    );
                }
                log::warn!(
                    "sample {i}: machine solver ended {:?}, flagging sample and continuing",
                    out.status
                );
            }
            let ema_h = self.ema_hist_mut(axle);
            ema_h.pwr_in_w[i] = out.pwr_in_w;
            ema_h.pwr_out_w[i] = out.pwr_out_w;
            ema_h.pwr_loss_w[i] = out.pwr_loss_w;
            ema_h.pwr_loss_mech_w[i] = out.losses.pwr_mech_w;
            ema_h.pwr_loss_stator_w[i] = out.losses.pwr_stator_w;
            ema_h.eff[i] = out.eff;
            ema_h.pwr_factor[i] = out.pwr_factor;
            ema_h.i_d_a[i] = out.i_d_a;
            ema_h.i_q_a[i] = out.i_q_a;
            ema_h.i_s_a[i] = out.i_s_a;
            ema_h.v_d_v[i] = out.v_d_v;
            ema_h.v_q_v[i] = out.v_q_v;
            ema_h.v_s_v[i] = out.v_s_v;
            ema_h.flux_vs[i] = out.flux_vs;
            ema_h.trq_inner_nm[i] = out.trq_inner_nm;
            ema_h.trq_shaft_nm[i] = out.trq_shaft_nm;

            let inv_out = self.inv.solve_electrical(
                out.pwr_factor,
                out.v_s_v,
                out.i_s_a,
                vdc_prev_v,
                self.inv_hist(axle).te_deg_c[i - 1],
                self.options.limits,
            );
            let inv_h = self.inv_hist_mut(axle);
            inv_h.pwr_in_w[i] = inv_out.pwr_in_w;
            inv_h.pwr_out_w[i] = inv_out.pwr_out_w;
            inv_h.pwr_loss_w[i] = inv_out.pwr_loss_w;
            inv_h.pwr_loss_switch_w[i] = inv_out.losses.pwr_switch_w;
            inv_h.pwr_loss_cap_w[i] = inv_out.losses.pwr_cap_w;
            inv_h.pwr_loss_busbar_ac_w[i] = inv_out.losses.pwr_busbar_ac_w;
            inv_h.pwr_loss_busbar_dc_w[i] = inv_out.losses.pwr_busbar_dc_w;
            inv_h.eff[i] = inv_out.eff;
            inv_h.i_dc_a[i] = inv_out.i_dc_a;
            inv_h.i_cap_a[i] = inv_out.i_cap_a;
            inv_h.i_s_a[i] = inv_out.i_s_a;
            inv_h.mod_index[i] = inv_out.mod_index;
        }

        // machine totals
        self.ema_total.pwr_in_w[i] = self.ema_front.pwr_in_w[i] + self.ema_rear.pwr_in_w[i];
        self.ema_total.pwr_out_w[i] = self.ema_front.pwr_out_w[i] + self.ema_rear.pwr_out_w[i];
        self.ema_total.pwr_loss_w[i] = self.ema_front.pwr_loss_w[i] + self.ema_rear.pwr_loss_w[i];
        self.ema_total.pwr_loss_mech_w[i] =
            self.ema_front.pwr_loss_mech_w[i] + self.ema_rear.pwr_loss_mech_w[i];
        self.ema_total.pwr_loss_stator_w[i] =
            self.ema_front.pwr_loss_stator_w[i] + self.ema_rear.pwr_loss_stator_w[i];
        self.ema_total.eff[i] = 0.5 * (self.ema_front.eff[i] + self.ema_rear.eff[i]);
        self.ema_total.pwr_factor[i] =
            0.5 * (self.ema_front.pwr_factor[i] + self.ema_rear.pwr_factor[i]);
        self.ema_total.i_d_a[i] = self.ema_front.i_d_a[i] + self.ema_rear.i_d_a[i];
        self.ema_total.i_q_a[i] = self.ema_front.i_q_a[i] + self.ema_rear.i_q_a[i];
        self.ema_total.i_s_a[i] = self.ema_front.i_s_a[i] + self.ema_rear.i_s_a[i];
        self.ema_total.v_d_v[i] = 0.5 * (self.ema_front.v_d_v[i] + self.ema_rear.v_d_v[i]);
        self.ema_total.v_q_v[i] = 0.5 * (self.ema_front.v_q_v[i] + self.ema_rear.v_q_v[i]);
        self.ema_total.v_s_v[i] = 0.5 * (self.ema_front.v_s_v[i] + self.ema_rear.v_s_v[i]);
        self.ema_total.flux_vs[i] = 0.5 * (self.ema_front.flux_vs[i] + self.ema_rear.flux_vs[i]);
        self.ema_total.trq_inner_nm[i] =
            self.ema_front.trq_inner_nm[i] + self.ema_rear.trq_inner_nm[i];
        self.ema_total.trq_shaft_nm[i] =
            self.ema_front.trq_shaft_nm[i] + self.ema_rear.trq_shaft_nm[i];

        // inverter totals
        self.inv_total.pwr_in_w[i] = self.inv_front.pwr_in_w[i] + self.inv_rear.pwr_in_w[i];
        self.inv_total.pwr_out_w[i] = self.inv_front.pwr_out_w[i] + self.inv_rear.pwr_out_w[i];
        self.inv_total.pwr_loss_w[i] = self.inv_front.pwr_loss_w[i] + self.inv_rear.pwr_loss_w[i];
        self.inv_total.pwr_loss_switch_w[i] =
            self.inv_front.pwr_loss_switch_w[i] + self.inv_rear.pwr_loss_switch_w[i];
        self.inv_total.pwr_loss_cap_w[i] =
            self.inv_front.pwr_loss_cap_w[i] + self.inv_rear.pwr_loss_cap_w[i];
        self.inv_total.pwr_loss_busbar_ac_w[i] =
            self.inv_front.pwr_loss_busbar_ac_w[i] + self.inv_rear.pwr_loss_busbar_ac_w[i];
        self.inv_total.pwr_loss_busbar_dc_w[i] =
            self.inv_front.pwr_loss_busbar_dc_w[i] + self.inv_rear.pwr_loss_busbar_dc_w[i];
        self.inv_total.eff[i] = 0.5 * (self.inv_front.eff[i] + self.inv_rear.eff[i]);
        self.inv_total.i_dc_a[i] = self.inv_front.i_dc_a[i] + self.inv_rear.i_dc_a[i];
        self.inv_total.i_cap_a[i] = self.inv_front.i_cap_a[i] + self.inv_rear.i_cap_a[i];
        self.inv_total.i_s_a[i] = self.inv_front.i_s_a[i] + self.inv_rear.i_s_a[i];
        self.inv_total.mod_index[i] =
            0.5 * (self.inv_front.mod_index[i] + self.inv_rear.mod_index[i]);

        // battery update from the aggregated DC current
        let i_dc_total_a = self.inv_total.i_dc_a[i];
        let hvs_out = self.hvs.solve_electrical(
            vdc_prev_v,
            i_dc_total_a,
            dt_s,
            soc_prev,
            self.hvs_hist.te_deg_c[i - 1],
            self.options.limits,
        );
        self.hvs_hist.dq_as[i] = hvs_out.dq_as;
        self.hvs_hist.soc[i] = hvs_out.soc;
        self.hvs_hist.vdc_v[i] = hvs_out.vdc_v;
        self.hvs_hist.i_dc_a[i] = i_dc_total_a;
        self.hvs_hist.pwr_in_w[i] = hvs_out.pwr_in_w;
        self.hvs_hist.pwr_out_w[i] = hvs_out.pwr_out_w;
        self.hvs_hist.pwr_loss_w[i] = hvs_out.pwr_loss_w;
        self.hvs_hist.eff[i] = hvs_out.eff;

        // feed the battery state back to the bus only when SOC-derived
        if self.options.voltage_source == VoltageSource::SocDerived
            && self.options.limits != LimitMode::Off
        {
            self.veh_hist.vdc_v[i] = hvs_out.vdc_v;
            self.veh_hist.soc[i] = hvs_out.soc;
        }
        Ok(())
    }

    /// Thermal pass: bilinear temperature update per component referenced to
    /// the previous-sample coolant temperature, then the coolant update
    pub fn set_thermal_calcs(&mut self, i: usize) {
        let dt_s = self.cyc.dt_s_at_i(i);
        let tc_prev_deg_c = self.veh_hist.cool_te_deg_c[i - 1];

        let d_te = |h: &GearboxHistory, thrm: &crate::thermal::ThermalNetwork| {
            thrm.step(
                dt_s,
                h.te_deg_c[i - 1] - tc_prev_deg_c,
                h.pwr_loss_w[i - 1],
                h.pwr_loss_w[i],
            )
        };
        let d_te_gbx_f = d_te(&self.gbx_front, &self.gbx.thrm);
        let d_te_gbx_r = d_te(&self.gbx_rear, &self.gbx.thrm);
        let d_te_ema_f = self.ema.thrm.step(
            dt_s,
            self.ema_front.te_deg_c[i - 1] - tc_prev_deg_c,
            self.ema_front.pwr_loss_w[i - 1],
            self.ema_front.pwr_loss_w[i],
        );
        let d_te_ema_r = self.ema.thrm.step(
            dt_s,
            self.ema_rear.te_deg_c[i - 1] - tc_prev_deg_c,
            self.ema_rear.pwr_loss_w[i - 1],
            self.ema_rear.pwr_loss_w[i],
        );
        let d_te_inv_f = self.inv.thrm.step(
            dt_s,
            self.inv_front.te_deg_c[i - 1] - tc_prev_deg_c,
            self.inv_front.pwr_loss_w[i - 1],
            self.inv_front.pwr_loss_w[i],
        );
        let d_te_inv_r = self.inv.thrm.step(
            dt_s,
            self.inv_rear.te_deg_c[i - 1] - tc_prev_deg_c,
            self.inv_rear.pwr_loss_w[i - 1],
            self.inv_rear.pwr_loss_w[i],
        );
        let d_te_hvs = self.hvs.thrm.step(
            dt_s,
            self.hvs_hist.te_deg_c[i - 1] - tc_prev_deg_c,
            self.hvs_hist.pwr_loss_w[i - 1],
            self.hvs_hist.pwr_loss_w[i],
        );

        // coolant update; component losses from the previous sample heat the
        // loop so causality is preserved
        let tc_cur_deg_c = if self.options.cooling == CoolingMode::Model {
            let pwr_loss_prev_w = self.hvs_hist.pwr_loss_w[i - 1]
                + self.inv_front.pwr_loss_w[i - 1]
                + self.inv_rear.pwr_loss_w[i - 1]
                + self.ema_front.pwr_loss_w[i - 1]
                + self.ema_rear.pwr_loss_w[i - 1]
                + self.gbx_front.pwr_loss_w[i - 1]
                + self.gbx_rear.pwr_loss_w[i - 1];
            let (tc, qdot_rej_w) = self.veh.calc_cooling(
                pwr_loss_prev_w,
                self.veh_hist.speed_ach_mps[i - 1],
                self.cyc.cool_vol_m3[i - 1],
                self.cyc.amb_te_deg_c[i - 1],
                tc_prev_deg_c,
                dt_s,
            );
            self.veh_hist.qdot_rej_w[i] = qdot_rej_w;
            self.veh_hist.cool_te_deg_c[i] = tc;
            tc
        } else {
            self.veh_hist.cool_te_deg_c[i]
        };

        self.gbx_front.te_deg_c[i] = d_te_gbx_f + tc_cur_deg_c;
        self.gbx_rear.te_deg_c[i] = d_te_gbx_r + tc_cur_deg_c;
        self.gbx_total.te_deg_c[i] = max(d_te_gbx_f, d_te_gbx_r) + tc_cur_deg_c;
        self.ema_front.te_deg_c[i] = d_te_ema_f + tc_cur_deg_c;
        self.ema_rear.te_deg_c[i] = d_te_ema_r + tc_cur_deg_c;
        self.ema_total.te_deg_c[i] = max(d_te_ema_f, d_te_ema_r) + tc_cur_deg_c;
        self.inv_front.te_deg_c[i] = d_te_inv_f + tc_cur_deg_c;
        self.inv_rear.te_deg_c[i] = d_te_inv_r + tc_cur_deg_c;
        self.inv_total.te_deg_c[i] = max(d_te_inv_f, d_te_inv_r) + tc_cur_deg_c;
        self.hvs_hist.te_deg_c[i] = d_te_hvs + tc_cur_deg_c;
    }

    /// Vehicle feedback pass: convert the achieved shaft torque back to a
    /// wheel torque, compute the achievable acceleration, and re-integrate
    /// speed and distance
    pub fn set_ach_speed(&mut self, i: usize) {
        use crate::vehicle::Drivetrain;
        let dt_s = self.cyc.dt_s_at_i(i);
        let trq_shaft_nm = self.ema_total.trq_shaft_nm[i];
        let eff_gbx = self.gbx_total.eff[i];
        let ratio = self.gbx.ratio;

        let trq_whl_nm = if trq_shaft_nm > 0.0 {
            trq_shaft_nm * ratio * eff_gbx
        } else {
            // while braking, friction brakes carry the axle share the
            // drivetrain does not cover
            match self.options.drivetrain {
                Drivetrain::Fwd => trq_shaft_nm * ratio / eff_gbx / self.veh.split_brake,
                Drivetrain::Rwd => {
                    trq_shaft_nm * ratio / eff_gbx / (1.0 - self.veh.split_brake)
                }
                Drivetrain::Awd => trq_shaft_nm * ratio / eff_gbx,
            }
        };

        let v_prev_mps = self.veh_hist.speed_ach_mps[i - 1];
        let accel_mps2 =
            self.veh
                .calc_acceleration(&self.props, trq_whl_nm, v_prev_mps, self.cyc.grade_rad[i]);
        self.veh_hist.accel_ach_mps2[i] = accel_mps2;
        self.veh_hist.speed_ach_mps[i] = v_prev_mps
            + 0.5 * (self.veh_hist.accel_ach_mps2[i - 1] + accel_mps2) * dt_s;
        self.veh_hist.dist_ach_m[i] = self.veh_hist.dist_ach_m[i - 1]
            + 0.5 * (v_prev_mps + self.veh_hist.speed_ach_mps[i]) * dt_s;

        // achieved gearbox bookkeeping
        let trq_gbx_nm = trq_whl_nm / ratio;
        let split_front = self
            .veh
            .split_front(self.options.drivetrain, trq_shaft_nm > 0.0);
        self.gbx_total.trq_nm[i] = trq_gbx_nm;
        self.gbx_front.trq_nm[i] = trq_gbx_nm * split_front;
        self.gbx_rear.trq_nm[i] = trq_gbx_nm * (1.0 - split_front);
        for (gbx_h, ema_h) in [
            (&mut self.gbx_front, &self.ema_front),
            (&mut self.gbx_rear, &self.ema_rear),
            (&mut self.gbx_total, &self.ema_total),
        ] {
            gbx_h.pwr_out_w[i] = 2.0 * PI * ema_h.speed_rps[i] * gbx_h.trq_nm[i];
            gbx_h.pwr_in_w[i] = gbx_h.pwr_out_w[i] + gbx_h.pwr_loss_w[i];
        }
    }

    /// Largest power-balance residual over all components and samples,
    /// restricted to driving samples where the recuperation floor is inactive
    pub fn energy_audit_max_w(&self) -> f64 {
        let mut worst = 0.0_f64;
        let mut audit = |pwr_in: &Array1<f64>, pwr_out: &Array1<f64>, pwr_loss: &Array1<f64>| {
            for i in 1..pwr_in.len() {
                if pwr_out[i] >= 0.0 {
                    worst = worst.max((pwr_in[i] - pwr_out[i] - pwr_loss[i]).abs());
                }
            }
        };
        for gbx_h in [&self.gbx_front, &self.gbx_rear] {
            audit(&gbx_h.pwr_in_w, &gbx_h.pwr_out_w, &gbx_h.pwr_loss_w);
        }
        for ema_h in [&self.ema_front, &self.ema_rear] {
            audit(&ema_h.pwr_in_w, &ema_h.pwr_out_w, &ema_h.pwr_loss_w);
        }
        for inv_h in [&self.inv_front, &self.inv_rear] {
            audit(&inv_h.pwr_in_w, &inv_h.pwr_out_w, &inv_h.pwr_loss_w);
        }
        audit(
            &self.hvs_hist.pwr_in_w,
            &self.hvs_hist.pwr_out_w,
            &self.hvs_hist.pwr_loss_w,
        );
        if worst > PWR_BALANCE_TOL_W {
            log::warn!("power balance audit: worst residual {worst:.3e} W");
        }
        worst
    }

    /// Run-level summary for reporting
    pub fn summary(&self) -> SimSummary {
        let n = self.cyc.len();
        let energy_dc_wh =
            crate::utils::cumtrapz(&self.hvs_hist.pwr_out_w, &self.cyc.time_s)[n - 1] / 3.6e3;
        let dist_m = self.veh_hist.dist_ach_m[n - 1];
        let max_of = |arr: &Array1<f64>| arr.iter().copied().fold(f64::NAN, f64::max);
        SimSummary {
            samples: n,
            dist_m,
            energy_dc_wh,
            energy_wh_per_km: if dist_m > 0.0 {
                energy_dc_wh / (dist_m / 1e3)
            } else {
                0.0
            },
            final_soc: self.hvs_hist.soc[n - 1],
            te_max_machine_deg_c: max_of(&self.ema_total.te_deg_c),
            te_max_inverter_deg_c: max_of(&self.inv_total.te_deg_c),
            te_max_gearbox_deg_c: max_of(&self.gbx_total.te_deg_c),
            te_max_battery_deg_c: max_of(&self.hvs_hist.te_deg_c),
            infeasible_samples: self.infeasible_samples,
        }
    }

    fn whe(&self, axle: Axle) -> &WheelHistory {
        match axle {
            Axle::Front => &self.whe_front,
            Axle::Rear => &self.whe_rear,
        }
    }

    fn gbx_hist_mut(&mut self, axle: Axle) -> &mut GearboxHistory {
        match axle {
            Axle::Front => &mut self.gbx_front,
            Axle::Rear => &mut self.gbx_rear,
        }
    }

    fn ema_hist(&self, axle: Axle) -> &MachineHistory {
        match axle {
            Axle::Front => &self.ema_front,
            Axle::Rear => &self.ema_rear,
        }
    }

    fn ema_hist_mut(&mut self, axle: Axle) -> &mut MachineHistory {
        match axle {
            Axle::Front => &mut self.ema_front,
            Axle::Rear => &mut self.ema_rear,
        }
    }

    fn inv_hist(&self, axle: Axle) -> &InverterHistory {
        match axle {
            Axle::Front => &self.inv_front,
            Axle::Rear => &self.inv_rear,
        }
    }

    fn inv_hist_mut(&mut self, axle: Axle) -> &mut InverterHistory {
        match axle {
            Axle::Front => &mut self.inv_front,
            Axle::Rear => &mut self.inv_rear,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Axle {
    Front,
    Rear,
}
