//! Command line for the peak finder

use clap::Parser;

use wsa_sweep::peaks::MAX_PEAKS;

const MAX_MODE_LEN: usize = 15;

#[derive(Parser, Debug)]
#[command(
    name = "wsa-peakfind",
    version,
    about = "Sweep a WSA spectrum analyzer and report the strongest peaks"
)]
pub struct Cli {
    /// Instrument IP address or host name
    #[arg(value_name = "IP")]
    pub host: String,

    /// Input mode (SH, SHN, ZIF, HDR, ...)
    #[arg(long, default_value = "SH", value_parser = parse_mode)]
    pub mode: String,

    /// Start frequency in Hz
    #[arg(long, default_value = "2000000000")]
    pub start: u64,

    /// Stop frequency in Hz
    #[arg(long, default_value = "3000000000")]
    pub stop: u64,

    /// Resolution bandwidth in Hz
    #[arg(long, default_value = "100000")]
    pub rbw: u32,

    /// Number of peaks to report
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(0..=MAX_PEAKS as i64))]
    pub peaks: u32,

    /// Drop peaks closer than this to a stronger one, in Hz (overrides WSA_MIN_PEAK_SEPARATION_HZ)
    #[arg(long)]
    pub min_separation: Option<u64>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn parse_mode(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("mode must not be empty".to_string());
    }
    if s.len() > MAX_MODE_LEN {
        return Err(format!("mode is limited to {} characters", MAX_MODE_LEN));
    }
    Ok(s.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["wsa-peakfind", "10.0.0.5"]).unwrap();
        assert_eq!(cli.host, "10.0.0.5");
        assert_eq!(cli.mode, "SH");
        assert_eq!(cli.start, 2_000_000_000);
        assert_eq!(cli.stop, 3_000_000_000);
        assert_eq!(cli.rbw, 100_000);
        assert_eq!(cli.peaks, 1);
        assert_eq!(cli.min_separation, None);
    }

    #[test]
    fn test_mode_is_upper_cased_and_bounded() {
        let cli = Cli::try_parse_from(["wsa-peakfind", "--mode", "zif", "host"]).unwrap();
        assert_eq!(cli.mode, "ZIF");
        assert!(Cli::try_parse_from(["wsa-peakfind", "--mode", "ABCDEFGHIJKLMNOP", "host"]).is_err());
    }

    #[test]
    fn test_peak_count_is_capped() {
        assert!(Cli::try_parse_from(["wsa-peakfind", "--peaks", "256", "host"]).is_ok());
        assert!(Cli::try_parse_from(["wsa-peakfind", "--peaks", "257", "host"]).is_err());
    }

    #[test]
    fn test_missing_ip_is_an_error() {
        assert!(Cli::try_parse_from(["wsa-peakfind", "--start", "100"]).is_err());
    }
}
