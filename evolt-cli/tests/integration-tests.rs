use std::process::Command;

use assert_cmd::prelude::{CommandCargoExt, OutputAssertExt};
use predicates::prelude::predicate;

#[test]
fn test_that_cli_app_produces_result() -> Result<(), Box<dyn std::error::Error>> {
    // demo vehicle on the synthetic profile
    let mut cmd = Command::cargo_bin("evolt-cli")?;
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("final_soc"))
        .stdout(predicate::str::contains("energy_wh_per_km"));
    Ok(())
}

#[test]
fn test_yaml_result_format() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("evolt-cli")?;
    cmd.args(["--res-fmt", "yaml"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("final_soc:"));
    Ok(())
}

#[test]
fn test_explicit_profile_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("evolt-cli-test");
    std::fs::create_dir_all(&dir)?;
    let cyc_path = dir.join("ramp.csv");
    let mut csv = String::from("time_s,speed_mps\n");
    for k in 0..300 {
        let t = k as f64 * 0.1;
        let v = (t / 3.0).min(8.0);
        csv.push_str(&format!("{t:.1},{v:.4}\n"));
    }
    std::fs::write(&cyc_path, csv)?;

    let mut cmd = Command::cargo_bin("evolt-cli")?;
    cmd.args(["--cyc-file", cyc_path.to_str().unwrap()]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"samples\":300"));
    Ok(())
}

#[test]
fn test_missing_setup_file_fails_cleanly() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("evolt-cli")?;
    cmd.args(["--setup-file", "/nonexistent/setup.yaml"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Could not load setup file"));
    Ok(())
}
