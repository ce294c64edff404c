//! Command-line entry point for cookiebench.
//!
//! Scores captured page-load telemetry, re-prints existing artifacts and
//! validates configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Context, Result};
use env_logger::Env;
use log::info;

use cookiebench::detection::DetectorSettings;
use cookiebench::metrics::IterationCapture;
use cookiebench::network::hostname_of;
use cookiebench::scoring::AppMetadata;
use cookiebench::{config_loader, pipeline, report};

#[derive(Parser, Debug)]
#[command(name = "cookiebench")]
#[command(about = "Measures and scores the performance cost of cookie consent banners")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate, reduce and score captured iterations
    Score {
        /// Benchmark configuration (JSON or YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// JSON array of per-iteration captures
        #[arg(long)]
        captures: PathBuf,

        /// Output directory for the artifact and text report
        #[arg(short, long, default_value = "benchmark_results")]
        output: PathBuf,
    },

    /// Print the text report of an existing artifact
    Report {
        #[arg(short, long)]
        artifact: PathBuf,
    },

    /// Load and validate a configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    match cli.command {
        Commands::Score {
            config,
            captures,
            output,
        } => {
            let config = config_loader::load_config(&config)?;
            let captures = load_captures(&captures)?;
            info!(
                "Processing {} captured iterations for {}",
                captures.len(),
                config.name
            );

            let artifact = pipeline::process_captures(&config, &captures)
                .wrap_err_with(|| format!("Failed to score {}", config.name))?;
            report::write_artifact(&artifact, &output)?;
            report::print_summary(&artifact);
        }
        Commands::Report { artifact } => {
            let artifact = report::load_artifact(&artifact)?;
            println!("{}", report::render_text_report(&artifact));
        }
        Commands::Validate { config } => {
            let config = config_loader::load_config(&config)?;
            let detector = DetectorSettings::from_config(&config);
            let meta = AppMetadata::from_config(&config);

            println!("Configuration OK: {}", config.name);
            println!("  Iterations: {}", config.iterations);
            println!("  Selectors: {}", detector.selectors.join(", "));
            println!(
                "  Poll interval: {:.0}ms, timeout: {:.0}ms, visibility threshold: {}",
                detector.poll_interval_ms, detector.timeout_ms, detector.visibility_threshold
            );
            println!("  Service hosts: {}", config.cookie_banner.service_hosts.join(", "));
            match config.remote_url() {
                Some(url) => println!("  Target: {} (remote)", url),
                None => println!("  Target: local build"),
            }
            println!(
                "  Open source: {} ({:?})",
                meta.open_source.is_open_source, meta.open_source.rule
            );
        }
    }

    Ok(())
}

fn load_captures(path: &Path) -> Result<Vec<IterationCapture>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read captures from {}", path.display()))?;
    let captures: Vec<IterationCapture> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse captures JSON {}", path.display()))?;

    // Third-party classification is relative to the page host
    for (index, capture) in captures.iter().enumerate() {
        if hostname_of(&capture.page_url).is_none() {
            bail!(
                "Capture {} in {} has no usable pageUrl ('{}')",
                index + 1,
                path.display(),
                capture.page_url
            );
        }
    }
    Ok(captures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_score_command() {
        let cli = Cli::try_parse_from([
            "cookiebench",
            "score",
            "--config",
            "bench.json",
            "--captures",
            "captures.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Score { output, .. } => {
                assert_eq!(output, PathBuf::from("benchmark_results"))
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_score_requires_captures() {
        assert!(Cli::try_parse_from(["cookiebench", "score", "--config", "bench.json"]).is_err());
    }

    fn write_captures(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{}", json).unwrap();
        file
    }

    #[test]
    fn test_captures_without_page_url_rejected() {
        let file = write_captures(r#"[{ "pageUrl": "http://localhost:3000/" }, {}]"#);
        let err = load_captures(file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("Capture 2"));

        let file = write_captures(r#"[{ "pageUrl": "not a url" }]"#);
        assert!(load_captures(file.path()).is_err());
    }

    #[test]
    fn test_captures_with_page_url_load() {
        let file = write_captures(r#"[{ "pageUrl": "http://localhost:3000/" }]"#);
        let captures = load_captures(file.path()).unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].page_url, "http://localhost:3000/");
    }

    #[test]
    fn test_parse_validate_command() {
        let cli = Cli::try_parse_from(["cookiebench", "validate", "-c", "bench.yaml"]).unwrap();
        assert_eq!(cli.log_level, "info");
        assert!(matches!(cli.command, Commands::Validate { .. }));
    }
}
