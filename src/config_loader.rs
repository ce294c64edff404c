use crate::config::Config;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Supported configuration encodings, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from a path's extension; JSON is the default
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
            None => Ok(ConfigFormat::Json),
            Some(ext) if ext == "json" => Ok(ConfigFormat::Json),
            Some(ext) if ext == "yaml" || ext == "yml" => Ok(ConfigFormat::Yaml),
            Some(ext) => bail!("Unsupported configuration extension '.{}'", ext),
        }
    }
}

/// Load, parse and validate a benchmark configuration
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let format = ConfigFormat::from_path(config_path)?;
    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open config '{}'", config_path.display()))?;

    let config: Config = match format {
        ConfigFormat::Json => serde_json::from_reader(file)
            .wrap_err_with(|| format!("Failed to parse JSON config '{}'", config_path.display()))?,
        ConfigFormat::Yaml => serde_yaml::from_reader(file)
            .wrap_err_with(|| format!("Failed to parse YAML config '{}'", config_path.display()))?,
    };

    config
        .validate()
        .wrap_err_with(|| format!("Configuration '{}' is invalid", config.name))?;

    info!(
        "Loaded '{}': {} iteration(s), {} selector(s), {} service host(s)",
        config.name,
        config.iterations,
        config.cookie_banner.selectors.len(),
        config.cookie_banner.service_hosts.len()
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_load_json_config() {
        let json = r##"{
            "name": "didomi-cdn",
            "iterations": 3,
            "cookieBanner": {
                "selectors": ["#didomi-host"],
                "serviceHosts": ["sdk.privacy-center.org"]
            },
            "techStack": { "frameworks": ["react"], "bundleType": "external" }
        }"##;

        let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(temp_file, "{}", json).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.name, "didomi-cdn");
        assert_eq!(config.iterations, 3);
    }

    #[test]
    fn test_load_yaml_config() {
        let yaml = r##"
name: "baseline"
iterations: 2
baseline: true
cookieBanner:
  selectors: [".banner"]
techStack:
  languages: ["javascript"]
detection:
  pollInterval: "25ms"
  timeout: "2s"
  visibilityThreshold: 0.5
"##;

        let mut temp_file = Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert!(config.baseline);
        assert_eq!(config.detection.poll_interval.as_millis(), 25);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let json = r##"{
            "name": "broken",
            "iterations": 0,
            "cookieBanner": { "selectors": [".banner"] },
            "techStack": {}
        }"##;

        let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(temp_file, "{}", json).unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("iterations must be at least 1"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        assert!(ConfigFormat::from_path(Path::new("bench.toml")).is_err());
        assert_eq!(
            ConfigFormat::from_path(Path::new("bench.YML")).unwrap(),
            ConfigFormat::Yaml
        );
    }
}
