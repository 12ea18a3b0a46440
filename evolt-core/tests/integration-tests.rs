use evolt_core::prelude::*;

#[test]
fn test_setup_file_roundtrip_drives_identical_run() {
    let setup = SimSetup::mock();
    let path = std::env::temp_dir().join("evolt-core-test-setup.yaml");
    setup.to_file(&path).unwrap();
    let setup_from_file = SimSetup::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(setup, setup_from_file);

    let mut sd_a = SimDrive::new(setup, MissionProfile::mock()).unwrap();
    let mut sd_b = SimDrive::new(setup_from_file, MissionProfile::mock()).unwrap();
    sd_a.walk().unwrap();
    sd_b.walk().unwrap();
    assert_eq!(sd_a.summary(), sd_b.summary());
}

#[test]
fn test_csv_profile_end_to_end() {
    let mut csv = String::from("time_s,speed_mps,grade_rad\n");
    for k in 0..600 {
        let t = k as f64 * 0.1;
        // ramp to 12 m/s, hold, on a slight climb
        let v = (t / 2.0).min(12.0);
        csv.push_str(&format!("{t:.1},{v:.4},0.01\n"));
    }
    let cyc = MissionProfile::from_csv_str(csv, "climb".to_string()).unwrap();
    let mut sd = SimDrive::new(SimSetup::mock(), cyc).unwrap();
    sd.walk().unwrap();

    let summary = sd.summary();
    assert_eq!(summary.samples, 600);
    assert_eq!(summary.infeasible_samples, 0);
    assert!(summary.energy_dc_wh > 0.0);
    // climbing costs more than the flat demo hop
    assert!(summary.energy_wh_per_km > 100.0);
    assert!(sd.energy_audit_max_w() < 1e-6);
}

#[test]
fn test_solver_modes_agree_in_base_speed_region() {
    // gentle profile that never leaves the base-speed region: the closed-form
    // and root-search control laws must produce matching stator currents
    let mut csv = String::from("time_s,speed_mps\n");
    for k in 0..400 {
        let t = k as f64 * 0.1;
        let v = (t / 4.0).min(8.0);
        csv.push_str(&format!("{t:.1},{v:.4}\n"));
    }
    let cyc = MissionProfile::from_csv_str(csv, "gentle".to_string()).unwrap();

    let mut setup_rs = SimSetup::mock();
    setup_rs.options.solver = SolverMode::RootSearch;
    let mut sd_rs = SimDrive::new(setup_rs, cyc.clone()).unwrap();
    sd_rs.walk().unwrap();

    let mut setup_cf = SimSetup::mock();
    setup_cf.options.solver = SolverMode::ClosedForm;
    let mut sd_cf = SimDrive::new(setup_cf, cyc).unwrap();
    sd_cf.walk().unwrap();

    for i in 1..sd_rs.cyc.len() {
        let diff = (sd_rs.ema_front.i_s_a[i] - sd_cf.ema_front.i_s_a[i]).abs();
        assert!(diff < 1e-6, "i_s differs by {diff} A at sample {i}");
    }
}
