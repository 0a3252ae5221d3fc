mod base;
mod config;
mod converter;
mod difi;
mod edp;
mod filing;
mod grouping;
mod kdvp;
mod lots;
mod metatrader;
mod time;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::ConversionInfo;
use converter::{convert_file, ConversionOptions, DEFAULT_TARGET_BASE_NAME};
use metatrader::MissingDataPolicy;

/// Converts a MetaTrader 4 report history into FURS eDavki filings
/// (Doh-KDVP and D-IFI), one file per filing and closing year.
#[derive(Parser, Debug)]
#[command(name = "mt4furs", version)]
struct Cli {
    /// Report history exported from MetaTrader 4 as XML Spreadsheet 2003
    input: PathBuf,

    /// Base name of the output files, as in KDVP-<TARGET>-<YEAR>.xml
    #[arg(short, long, default_value = DEFAULT_TARGET_BASE_NAME)]
    target: String,

    /// Taxpayer and document settings
    #[arg(short, long, default_value = "conversion.json")]
    config: PathBuf,

    /// Settings merged over the config file, skipped when missing
    #[arg(long, default_value = "conversion.secret.json")]
    secret_config: PathBuf,

    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Fail when the report has no positions section
    #[arg(long)]
    require_data_section: bool,

    /// Only convert positions in this instrument (repeatable)
    #[arg(short, long = "instrument", value_name = "NAME")]
    instruments: Vec<String>,

    /// Export the filed lots with their price ratios to a CSV file
    #[arg(long, value_name = "FILE")]
    lots_csv: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mt4furs=info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let info = ConversionInfo::load(&cli.config, Some(&cli.secret_config))?;

    let options = ConversionOptions {
        target_base_name: cli.target,
        output_dir: cli.output_dir,
        missing_data: if cli.require_data_section { MissingDataPolicy::Fail } else { MissingDataPolicy::Warn },
        instruments: cli.instruments,
        lots_csv: cli.lots_csv,
    };

    let written = convert_file(&cli.input, &info, &options)
        .with_context(|| format!("Failed to convert {}", cli.input.display()))?;

    for path in written {
        println!("{}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["mt4furs", "history.xml"]).unwrap();
        assert_eq!(cli.target, "edavki");
        assert_eq!(cli.config, PathBuf::from("conversion.json"));
        assert_eq!(cli.secret_config, PathBuf::from("conversion.secret.json"));
        assert!(!cli.require_data_section);
        assert!(cli.instruments.is_empty());
        assert!(cli.lots_csv.is_none());
    }

    #[test]
    fn cli_repeated_instruments() {
        let cli = Cli::try_parse_from([
            "mt4furs", "history.xml", "--instrument", "EURUSD", "-i", "NatGas", "--require-data-section",
        ]).unwrap();
        assert_eq!(cli.instruments, vec!["EURUSD", "NatGas"]);
        assert!(cli.require_data_section);
    }
}
