use anyhow::Context;
use clap::Parser;

use evolt_core::prelude::*;

/// Wrapper for evolt drive simulations.
/// After running `cargo build --release`, run with
/// ```bash
/// ./target/release/evolt-cli --setup-file vehicle.yaml --cyc-file mission.csv
/// ```
/// Both files are optional; the built-in demo vehicle and a synthetic mission
/// profile are used when omitted.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct EvoltApi {
    #[clap(long, value_parser)]
    /// Path to simulation setup file (yaml)
    setup_file: Option<String>,
    #[clap(long, value_parser)]
    /// Path to mission profile file (csv)
    cyc_file: Option<String>,
    #[clap(long, value_parser)]
    /// How to return the run summary: `json` (default) or `yaml`
    res_fmt: Option<String>,
    #[clap(long, value_parser)]
    /// Write the full time series (json or yaml by extension) to this path
    timeseries_file: Option<String>,
}

fn main() -> anyhow::Result<()> {
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;
    let api = EvoltApi::parse();

    let setup = match &api.setup_file {
        Some(path) => SimSetup::from_file(path)
            .with_context(|| format!("Could not load setup file: {path}"))?,
        None => {
            log::info!("no setup file given, using the built-in demo vehicle");
            SimSetup::mock()
        }
    };
    let cyc = match &api.cyc_file {
        Some(path) => MissionProfile::from_csv_file(path)
            .with_context(|| format!("Could not load mission profile: {path}"))?,
        None => {
            log::info!("no mission profile given, using the synthetic demo profile");
            MissionProfile::mock()
        }
    };

    let mut sd = SimDrive::new(setup, cyc)?;
    sd.walk()?;
    sd.energy_audit_max_w();

    if let Some(path) = &api.timeseries_file {
        sd.to_file(path)
            .with_context(|| format!("Could not write time series: {path}"))?;
        log::info!("time series written to {path}");
    }

    let summary = sd.summary();
    let rendered = match api.res_fmt.as_deref().unwrap_or("json") {
        "yaml" | "yml" => summary.to_yaml()?,
        _ => summary.to_json()?,
    };
    println!("{rendered}");
    Ok(())
}
