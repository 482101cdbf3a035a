//! WSA peak finder
//!
//! Sweeps a span on a networked WSA spectrum analyzer and prints the strongest
//! peaks to stdout. Diagnostics go to stderr.

mod cli;

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cli::Cli;
use wsa_sweep::config::Config;
use wsa_sweep::device::{Device, TcpDevice};
use wsa_sweep::peaks::{find_peaks_separated, Peak};
use wsa_sweep::sweep::{sweep, FrequencyPlan, SweepOptions};
use wsa_sweep::SweepError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<SweepError>() {
                Some(sweep_error) => error!("{}: {:#}", sweep_error.kind(), e),
                None => error!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(separation) = cli.min_separation {
        config.min_peak_separation_hz = separation;
    }

    info!("Configuration:");
    info!("  Instrument: {}", cli.host);
    info!("  Mode: {}", cli.mode);
    info!("  Span: {} - {} Hz, rbw {} Hz", cli.start, cli.stop, cli.rbw);
    info!("  Samples per packet: {}", config.samples_per_packet);
    info!("  Capture timeout: {} ms, retries {}", config.capture_timeout_ms, config.capture_retries);

    // Validate everything before touching the instrument
    let plan = FrequencyPlan::new(cli.start, cli.stop, cli.rbw).context("bad sweep request")?;
    let options = SweepOptions::from_config(&config).context("bad capture geometry")?;

    let mut device = TcpDevice::connect(&cli.host, &config)
        .with_context(|| format!("failed to connect to {}", cli.host))?;

    if !device
        .request_acquisition_access()
        .context("acquisition access request failed")?
    {
        bail!("{} did not grant acquisition access", cli.host);
    }
    device.abort_capture().context("abort failed")?;
    device.flush().context("flush failed")?;

    let buffer = sweep(&mut device, &plan, &cli.mode, &options).context("sweep failed")?;
    let peaks = find_peaks_separated(&buffer, cli.peaks, config.min_peak_separation_hz);

    device.close();

    print_report(&peaks);
    Ok(())
}

fn print_report(peaks: &[Peak]) {
    println!("Peaks found:");
    for peak in peaks {
        println!("  {}", peak);
    }
}
