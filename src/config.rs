//! Extraction configuration.
//!
//! One TOML document drives a whole run: which accounts to pull, which month
//! ranges, and how the browser session behaves. Months use the bank's
//! customary `MM/YYYY` form; timeouts use humane duration strings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{de, Deserialize, Deserializer};

use crate::months::YearMonth;

/// One configured extraction: a month range applied to a set of accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionEntry {
    /// Oldest month to fetch, `MM/YYYY`.
    #[serde(deserialize_with = "crate::months::deserialize_month")]
    pub from: YearMonth,

    /// Most recent month to fetch, `MM/YYYY`.
    #[serde(deserialize_with = "crate::months::deserialize_month")]
    pub to: YearMonth,

    /// Account identifiers as the bank displays them (separators allowed).
    pub accounts: Vec<String>,
}

fn default_login_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_search_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Browser session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Chrome/Chromium executable. Probed from PATH when not set.
    pub chrome_path: Option<PathBuf>,

    /// Run without a visible window.
    pub headless: bool,

    /// Bounded wait for login and navigation surfaces.
    #[serde(deserialize_with = "deserialize_duration")]
    pub login_timeout: Duration,

    /// Bounded wait for each step of a month search.
    #[serde(deserialize_with = "deserialize_duration")]
    pub search_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            login_timeout: default_login_timeout(),
            search_timeout: default_search_timeout(),
        }
    }
}

fn default_max_passes() -> u32 {
    25
}

/// Extraction driver settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Search/reconcile passes allowed per account before the leftover
    /// months are reported unresolved.
    pub max_passes: u32,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
        }
    }
}

/// Application configuration as written in the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// National id number used to log in. Prompted interactively when absent.
    pub ssn: Option<SecretString>,

    /// Where the portal drops downloads and merged statements end up. If
    /// relative, resolved from the config file's directory. Defaults to the
    /// config file's directory.
    pub download_dir: Option<PathBuf>,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub driver: DriverSettings,

    #[serde(default)]
    pub extraction: Vec<ExtractionEntry>,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the download directory against the config file's directory.
    pub fn resolve_download_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.download_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub ssn: Option<SecretString>,
    pub download_dir: PathBuf,
    pub browser: BrowserSettings,
    pub driver: DriverSettings,
    pub extraction: Vec<ExtractionEntry>,
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        let download_dir = config.resolve_download_dir(config_dir);

        Ok(Self {
            ssn: config.ssn,
            download_dir,
            browser: config.browser,
            driver: config.driver,
            extraction: config.extraction,
        })
    }
}

/// Parse a duration like "60s", "5m", "2h" or "1d". A bare integer counts
/// as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let (num, multiplier) = match s.strip_suffix(['s', 'm', 'h', 'd']) {
        Some(num) => {
            let unit = s.as_bytes()[s.len() - 1];
            let multiplier = match unit {
                b's' => 1,
                b'm' => 60,
                b'h' => 60 * 60,
                _ => 24 * 60 * 60,
            };
            (num, multiplier)
        }
        None => (s.as_str(), 1),
    };

    let num: u64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration: {s:?}"))?;
    let secs = num
        .checked_mul(multiplier)
        .with_context(|| format!("Duration is too large: {s:?}"))?;

    Ok(Duration::from_secs(secs))
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration(" 45 ").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("10S").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("1.5h").is_err());
        assert!(parse_duration("-2m").is_err());
    }

    #[test]
    fn test_load_full_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("extraction.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "ssn = \"01019912345\"")?;
        writeln!(file, "download_dir = \"statements\"")?;
        writeln!(file, "[browser]")?;
        writeln!(file, "headless = false")?;
        writeln!(file, "search_timeout = \"10s\"")?;
        writeln!(file, "[driver]")?;
        writeln!(file, "max_passes = 5")?;
        writeln!(file, "[[extraction]]")?;
        writeln!(file, "from = \"01/2023\"")?;
        writeln!(file, "to = \"06/2023\"")?;
        writeln!(file, "accounts = [\"1234.56.78901\", \"9999.99.99999\"]")?;

        let config = Config::load(&config_path)?;
        assert_eq!(
            config.ssn.as_ref().map(|s| s.expose_secret().to_string()),
            Some("01019912345".to_string())
        );
        assert!(!config.browser.headless);
        assert_eq!(config.browser.search_timeout, Duration::from_secs(10));
        // Untouched settings keep their defaults.
        assert_eq!(config.browser.login_timeout, Duration::from_secs(60));
        assert_eq!(config.driver.max_passes, 5);

        let entry = &config.extraction[0];
        assert_eq!(entry.from, YearMonth::new(2023, 1).unwrap());
        assert_eq!(entry.to, YearMonth::new(2023, 6).unwrap());
        assert_eq!(entry.accounts.len(), 2);

        Ok(())
    }

    #[test]
    fn test_load_rejects_bad_month() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("extraction.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[[extraction]]")?;
        writeln!(file, "from = \"2023-01\"")?;
        writeln!(file, "to = \"06/2023\"")?;
        writeln!(file, "accounts = []")?;

        assert!(Config::load(&config_path).is_err());
        Ok(())
    }

    #[test]
    fn test_minimal_config_uses_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("extraction.toml");
        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert!(config.ssn.is_none());
        assert!(config.browser.headless);
        assert_eq!(config.browser.login_timeout, Duration::from_secs(60));
        assert_eq!(config.browser.search_timeout, Duration::from_secs(5));
        assert_eq!(config.driver.max_passes, 25);
        assert!(config.extraction.is_empty());

        Ok(())
    }

    #[test]
    fn test_download_dir_resolves_relative_to_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("extraction.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "download_dir = \"statements\"")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(
            resolved.download_dir,
            config_path.canonicalize()?.parent().unwrap().join("statements")
        );

        Ok(())
    }

    #[test]
    fn test_download_dir_defaults_to_config_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("extraction.toml");
        std::fs::File::create(&config_path)?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(
            resolved.download_dir,
            config_path.canonicalize()?.parent().unwrap()
        );

        Ok(())
    }
}
