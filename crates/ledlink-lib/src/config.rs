//! Application configuration: TOML-based, platform-aware paths.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::Operation;
use crate::error::{LedError, Result};
use crate::proxy::{AccessPolicy, PermissionSet};
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# ledlink configuration. Changes made outside ledlink may be overwritten.\n\n";

/// Grants every operation in an `[access.roles]` entry.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connect attempts, including the first. Default: 3.
    #[serde(default = "default_max_attempts")]
    pub max_connect_attempts: u32,

    /// Delay before the second attempt. Default: 1000.
    #[serde(default = "default_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Backoff ceiling. Default: 30000.
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Backoff growth per failure. Default: 2.0.
    #[serde(default = "default_multiplier")]
    pub retry_multiplier: f64,

    /// How long a scan listens for devices. Default: 10000.
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    /// Serial line speed (serial transport only). Default: 115200.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_true")]
    pub caching: bool,
    #[serde(default = "default_true")]
    pub logging: bool,
    #[serde(default = "default_true")]
    pub access_control: bool,
    /// Cache lifetime. Default: 5000.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Role in effect at startup. Default: "user".
    #[serde(default = "default_role")]
    pub role: String,

    /// Role → operation names (`set_color`, ...) or `"*"` for everything.
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<String, Vec<String>>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_scan_timeout_ms() -> u64 {
    10_000
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_cache_ttl_ms() -> u64 {
    5000
}
fn default_role() -> String {
    "user".into()
}

fn default_roles() -> BTreeMap<String, Vec<String>> {
    let all_ops = Operation::ALL.iter().map(|op| op.as_str().to_string()).collect();
    BTreeMap::from([
        ("admin".to_string(), vec![WILDCARD.to_string()]),
        ("user".to_string(), all_ops),
        ("guest".to_string(), vec![Operation::TogglePower.as_str().to_string()]),
    ])
}

fn default_true() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            max_connect_attempts: default_max_attempts(),
            retry_initial_delay_ms: default_initial_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_multiplier: default_multiplier(),
            scan_timeout_ms: default_scan_timeout_ms(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            caching: true,
            logging: true,
            access_control: true,
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        AccessConfig {
            role: default_role(),
            roles: default_roles(),
        }
    }
}

/// Problems that [`Config::validate`] can report.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// `max_connect_attempts` is 0.
    NoConnectAttempts,
    /// `retry_multiplier` is below 1.0 or not a number.
    InvalidMultiplier(f64),
    /// `retry_max_delay_ms` is smaller than `retry_initial_delay_ms`.
    MaxDelayBelowInitial { initial_ms: u64, max_ms: u64 },
    ZeroScanTimeout,
    ZeroCacheTtl,
    ZeroBaudRate,
    /// `access.role` is not defined in `access.roles`.
    UnknownRole(String),
    /// An `access.roles` entry names an operation that does not exist.
    UnknownOperation { role: String, operation: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NoConnectAttempts => {
                write!(f, "max_connect_attempts must be at least 1")
            }
            ValidationIssue::InvalidMultiplier(m) => {
                write!(f, "retry_multiplier must be at least 1.0, got {m}")
            }
            ValidationIssue::MaxDelayBelowInitial { initial_ms, max_ms } => write!(
                f,
                "retry_max_delay_ms ({max_ms}) is below retry_initial_delay_ms ({initial_ms})"
            ),
            ValidationIssue::ZeroScanTimeout => write!(f, "scan_timeout_ms must be positive"),
            ValidationIssue::ZeroCacheTtl => write!(f, "cache_ttl_ms must be positive"),
            ValidationIssue::ZeroBaudRate => write!(f, "baud_rate must be positive"),
            ValidationIssue::UnknownRole(r) => write!(f, "Unknown access role: {r}"),
            ValidationIssue::UnknownOperation { role, operation } => {
                write!(f, "Unknown operation in access.roles.{role}: {operation}")
            }
        }
    }
}

impl Config {
    /// `ledlink` under the platform config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ledlink"))
    }

    /// `<config dir>/ledlink/config.toml`.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Config from the platform path; defaults when absent or unreadable.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Like [`load`](Self::load), but hands back parse warnings instead of logging them.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Read `path`.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Write `path` atomically: sibling temp file, then rename.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Write to [`path`](Self::path).
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    // ── Conversions ──

    pub fn retry_policy(&self) -> RetryPolicy {
        let c = &self.connection;
        RetryPolicy {
            max_attempts: c.max_connect_attempts,
            initial_delay: Duration::from_millis(c.retry_initial_delay_ms),
            max_delay: Duration::from_millis(c.retry_max_delay_ms),
            multiplier: c.retry_multiplier,
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.scan_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.proxy.cache_ttl_ms)
    }

    /// Build the access policy from `[access.roles]`.
    pub fn access_policy(&self) -> Result<AccessPolicy> {
        let mut policy = AccessPolicy::empty();
        for (role, ops) in &self.access.roles {
            let set = if ops.iter().any(|op| op == WILDCARD) {
                PermissionSet::All
            } else {
                let parsed = ops
                    .iter()
                    .map(|op| {
                        op.parse::<Operation>().map_err(|_| {
                            LedError::Config(format!(
                                "unknown operation in access.roles.{role}: {op}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                PermissionSet::only(parsed)
            };
            policy = policy.with_role(role, set);
        }
        Ok(policy)
    }

    /// Validate the entire config, collecting all problems.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let c = &self.connection;

        if c.max_connect_attempts == 0 {
            issues.push(ValidationIssue::NoConnectAttempts);
        }
        if c.retry_multiplier.is_nan() || c.retry_multiplier < 1.0 {
            issues.push(ValidationIssue::InvalidMultiplier(c.retry_multiplier));
        }
        if c.retry_max_delay_ms < c.retry_initial_delay_ms {
            issues.push(ValidationIssue::MaxDelayBelowInitial {
                initial_ms: c.retry_initial_delay_ms,
                max_ms: c.retry_max_delay_ms,
            });
        }
        if c.scan_timeout_ms == 0 {
            issues.push(ValidationIssue::ZeroScanTimeout);
        }
        if c.baud_rate == 0 {
            issues.push(ValidationIssue::ZeroBaudRate);
        }
        if self.proxy.cache_ttl_ms == 0 {
            issues.push(ValidationIssue::ZeroCacheTtl);
        }

        if !self.access.roles.contains_key(&self.access.role) {
            issues.push(ValidationIssue::UnknownRole(self.access.role.clone()));
        }
        for (role, ops) in &self.access.roles {
            for op in ops {
                if op != WILDCARD && op.parse::<Operation>().is_err() {
                    issues.push(ValidationIssue::UnknownOperation {
                        role: role.clone(),
                        operation: op.clone(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.connection.max_connect_attempts, 3);
        assert_eq!(c.connection.retry_initial_delay_ms, 1000);
        assert_eq!(c.connection.baud_rate, 115_200);
        assert!(c.proxy.caching && c.proxy.logging && c.proxy.access_control);
        assert_eq!(c.cache_ttl(), Duration::from_secs(5));
        assert_eq!(c.scan_timeout(), Duration::from_secs(10));
        assert_eq!(c.access.role, "user");
        assert_eq!(c.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn empty_file_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let c: Config = toml::from_str("[connection]\nmax_connect_attempts = 5\n").unwrap();
        assert_eq!(c.connection.max_connect_attempts, 5);
        assert_eq!(c.connection.retry_max_delay_ms, 30_000);
        assert_eq!(c.proxy, ProxyConfig::default());
    }

    #[test]
    fn validate_collects_multiple_issues() {
        let mut c = Config::default();
        c.connection.max_connect_attempts = 0;
        c.connection.retry_multiplier = 0.5;
        c.proxy.cache_ttl_ms = 0;
        c.access.role = "root".into();
        c.access
            .roles
            .insert("kiosk".into(), vec!["toggle_power".into(), "reboot".into()]);

        let issues = c.validate().unwrap_err();
        assert_eq!(
            issues,
            vec![
                ValidationIssue::NoConnectAttempts,
                ValidationIssue::InvalidMultiplier(0.5),
                ValidationIssue::ZeroCacheTtl,
                ValidationIssue::UnknownRole("root".into()),
                ValidationIssue::UnknownOperation {
                    role: "kiosk".into(),
                    operation: "reboot".into(),
                },
            ]
        );
    }

    #[test]
    fn nan_multiplier_rejected() {
        let mut c = Config::default();
        c.connection.retry_multiplier = f64::NAN;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validation_issue_display() {
        assert_eq!(
            ValidationIssue::UnknownRole("root".into()).to_string(),
            "Unknown access role: root"
        );
        assert_eq!(
            ValidationIssue::MaxDelayBelowInitial {
                initial_ms: 1000,
                max_ms: 10
            }
            .to_string(),
            "retry_max_delay_ms (10) is below retry_initial_delay_ms (1000)"
        );
    }

    #[test]
    fn access_policy_from_roles() {
        let policy = Config::default().access_policy().unwrap();
        assert_eq!(policy, AccessPolicy::default());

        let mut c = Config::default();
        c.access.roles.insert("bad".into(), vec!["fly".into()]);
        assert!(matches!(c.access_policy(), Err(LedError::Config(_))));
    }

    #[test]
    fn wildcard_wins_over_listed_operations() {
        let mut c = Config::default();
        c.access
            .roles
            .insert("ops".into(), vec!["set_color".into(), "*".into()]);
        let policy = c.access_policy().unwrap();
        assert_eq!(policy.permissions("ops"), Some(&PermissionSet::All));
    }

    #[test]
    fn load_ignores_header_comment() {
        let toml_str = r##"# ledlink configuration. Changes made outside ledlink may be overwritten.

[connection]
max_connect_attempts = 4
scan_timeout_ms = 2500

[access]
role = "guest"
"##;
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.connection.max_connect_attempts, 4);
        assert_eq!(c.scan_timeout(), Duration::from_millis(2500));
        assert_eq!(c.access.role, "guest");
        assert_eq!(c.access.roles, default_roles());
    }

    // ── Persistence ──

    #[test]
    fn save_to_load_from_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.connection.retry_multiplier = 1.5;
        config.proxy.caching = false;
        config.access.role = "admin".into();
        config.save_to(&path).unwrap();

        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded, config);
    }

    #[test]
    fn save_to_includes_header_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::default().save_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# ledlink configuration"));
        assert!(contents.contains("[access.roles]"));
    }

    #[test]
    fn save_to_cleans_up_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::default().save_to(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = Config::load_from(&dir.path().join("nonexistent.toml"));
        assert!(warnings.is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_from_invalid_toml_returns_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is { not valid toml").unwrap();

        let (config, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
        assert_eq!(config, Config::default());
    }
}
