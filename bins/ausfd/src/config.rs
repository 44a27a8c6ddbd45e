//! Configuration factory
//!
//! Loads and validates the YAML configuration file. Validation failures are
//! fatal: the daemon refuses to start on an unreadable file, a version
//! mismatch, an unsupported SBI scheme, missing TLS material for https, or a
//! malformed webconsole URI.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use ausf_sbi::models::PlmnId;

/// The only configuration schema version this build accepts.
pub const EXPECTED_CONFIG_VERSION: &str = "1.0.0";

/// Address registered at the NRF when the config omits one.
pub const DEFAULT_REGISTER_IPV4: &str = "127.0.0.9";
/// SBI port when the config omits one.
pub const DEFAULT_SBI_PORT: u16 = 8000;
/// Cache eviction interval in seconds when caching is on and unset.
pub const DEFAULT_NRF_CACHE_EVICTION_INTERVAL: u64 = 900;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AusfConfig {
    pub info: Info,
    pub configuration: Configuration,
    #[serde(default)]
    pub logger: Option<LoggerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub sbi: Option<Sbi>,
    #[serde(default)]
    pub service_name_list: Vec<String>,
    #[serde(default)]
    pub nrf_uri: String,
    #[serde(default)]
    pub webui_uri: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub plmn_support_list: Vec<PlmnId>,
    #[serde(default)]
    pub enable_nrf_caching: bool,
    #[serde(default)]
    pub nrf_cache_eviction_interval: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sbi {
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub tls: Option<Tls>,
    /// Address advertised to the NRF.
    #[serde(default)]
    pub register_ipv4: String,
    /// Local listen address; may name an environment variable.
    #[serde(default)]
    pub binding_ipv4: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tls {
    #[serde(default)]
    pub pem: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(rename = "AUSF", default)]
    pub ausf: Option<LogSetting>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSetting {
    #[serde(default)]
    pub debug_level: String,
}

impl AusfConfig {
    /// Read and validate the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AusfConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML string, used by tests.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AusfConfig = serde_yaml::from_str(yaml).context("failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.info.version != EXPECTED_CONFIG_VERSION {
            bail!(
                "config version [{}] is not supported, expected [{}]",
                self.info.version,
                EXPECTED_CONFIG_VERSION
            );
        }

        if let Some(sbi) = &self.configuration.sbi {
            match sbi.scheme.as_str() {
                "http" => {}
                "https" => {
                    let tls_ok = sbi
                        .tls
                        .as_ref()
                        .is_some_and(|tls| !tls.pem.is_empty() && !tls.key.is_empty());
                    if !tls_ok {
                        bail!("sbi scheme is https but tls pem/key are not configured");
                    }
                }
                other => bail!("unsupported sbi scheme [{other}]"),
            }
        }

        validate_webui_uri(&self.configuration.webui_uri)?;
        Ok(())
    }

    /// SBI scheme, defaulting to http.
    pub fn sbi_scheme(&self) -> &str {
        self.configuration
            .sbi
            .as_ref()
            .map(|sbi| sbi.scheme.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("http")
    }

    /// Address advertised to the NRF.
    pub fn register_ipv4(&self) -> &str {
        self.configuration
            .sbi
            .as_ref()
            .map(|sbi| sbi.register_ipv4.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_REGISTER_IPV4)
    }

    /// SBI port.
    pub fn sbi_port(&self) -> u16 {
        self.configuration
            .sbi
            .as_ref()
            .map(|sbi| sbi.port)
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_SBI_PORT)
    }

    /// Local listen address. The configured value may name an environment
    /// variable; a set variable wins over the literal, and an empty result
    /// falls back to 0.0.0.0.
    pub fn binding_ipv4(&self) -> String {
        let configured = self
            .configuration
            .sbi
            .as_ref()
            .map(|sbi| sbi.binding_ipv4.as_str())
            .unwrap_or("");

        if !configured.is_empty() {
            if let Ok(from_env) = std::env::var(configured) {
                if !from_env.is_empty() {
                    log::info!("using binding address from environment variable {configured}");
                    return from_env;
                }
            }
        }

        if configured.is_empty() {
            log::warn!("no binding address configured, using 0.0.0.0");
            "0.0.0.0".to_string()
        } else {
            configured.to_string()
        }
    }

    /// Cache eviction interval in seconds.
    pub fn nrf_cache_eviction_interval(&self) -> u64 {
        if self.configuration.nrf_cache_eviction_interval == 0 {
            DEFAULT_NRF_CACHE_EVICTION_INTERVAL
        } else {
            self.configuration.nrf_cache_eviction_interval
        }
    }

    /// Log level filter from `logger.AUSF.debugLevel`.
    pub fn log_level(&self) -> log::LevelFilter {
        let level = self
            .logger
            .as_ref()
            .and_then(|l| l.ausf.as_ref())
            .map(|s| s.debug_level.as_str())
            .unwrap_or("");

        match level {
            // panic and fatal have no log counterpart; error is the closest.
            "panic" | "fatal" | "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "debug" => log::LevelFilter::Debug,
            "info" | "" => log::LevelFilter::Info,
            other => {
                log::warn!("log level [{other}] is invalid, using [info]");
                log::LevelFilter::Info
            }
        }
    }
}

fn validate_webui_uri(uri: &str) -> Result<()> {
    let rest = uri
        .strip_prefix("http://")
        .or_else(|| uri.strip_prefix("https://"))
        .with_context(|| format!("webuiUri [{uri}] scheme must be http or https"))?;
    let host = rest.split('/').next().unwrap_or("");
    if host.is_empty() || host.starts_with(':') {
        bail!("webuiUri [{uri}] has no host");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_YAML: &str = r#"
info:
  version: 1.0.0
  description: AUSF initial configuration
configuration:
  sbi:
    scheme: http
    registerIPv4: 192.168.1.5
    bindingIPv4: 0.0.0.0
    port: 8000
  serviceNameList:
    - nausf-auth
  nrfUri: http://nrf:29510
  webuiUri: http://webui:5001
  groupId: ausfGroup001
  enableNrfCaching: true
  nrfCacheEvictionInterval: 900
logger:
  AUSF:
    debugLevel: info
"#;

    #[test]
    fn test_valid_config() {
        let config = AusfConfig::from_yaml(VALID_YAML).unwrap();
        assert_eq!(config.info.version, "1.0.0");
        assert_eq!(config.register_ipv4(), "192.168.1.5");
        assert_eq!(config.sbi_port(), 8000);
        assert_eq!(config.sbi_scheme(), "http");
        assert_eq!(config.configuration.nrf_uri, "http://nrf:29510");
        assert_eq!(config.configuration.group_id, "ausfGroup001");
        assert!(config.configuration.enable_nrf_caching);
        assert_eq!(config.nrf_cache_eviction_interval(), 900);
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let yaml = VALID_YAML.replace("version: 1.0.0", "version: 2.0.0");
        let err = AusfConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_unsupported_scheme_is_fatal() {
        let yaml = VALID_YAML.replace("scheme: http", "scheme: ftp");
        let err = AusfConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported sbi scheme"));
    }

    #[test]
    fn test_https_requires_tls_material() {
        let yaml = VALID_YAML.replace("scheme: http", "scheme: https");
        let err = AusfConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("tls"));

        let yaml = VALID_YAML.replace(
            "scheme: http",
            "scheme: https\n    tls:\n      pem: /etc/ausf/tls/ausf.pem\n      key: /etc/ausf/tls/ausf.key",
        );
        let config = AusfConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.sbi_scheme(), "https");
    }

    #[test]
    fn test_webui_uri_validation() {
        let yaml = VALID_YAML.replace("webuiUri: http://webui:5001", "webuiUri: webui:5001");
        assert!(AusfConfig::from_yaml(&yaml).is_err());

        let yaml = VALID_YAML.replace("webuiUri: http://webui:5001", "webuiUri: http://");
        assert!(AusfConfig::from_yaml(&yaml).is_err());

        let yaml = VALID_YAML.replace("webuiUri: http://webui:5001", "webuiUri: https://webui:5001");
        assert!(AusfConfig::from_yaml(&yaml).is_ok());
    }

    #[test]
    fn test_defaults_when_sbi_sparse() {
        let yaml = r#"
info:
  version: 1.0.0
configuration:
  nrfUri: http://nrf:29510
  webuiUri: http://webui:5001
"#;
        let config = AusfConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.register_ipv4(), DEFAULT_REGISTER_IPV4);
        assert_eq!(config.sbi_port(), DEFAULT_SBI_PORT);
        assert_eq!(config.sbi_scheme(), "http");
        assert_eq!(config.binding_ipv4(), "0.0.0.0");
        assert_eq!(
            config.nrf_cache_eviction_interval(),
            DEFAULT_NRF_CACHE_EVICTION_INTERVAL
        );
    }

    #[test]
    fn test_binding_ipv4_env_indirection() {
        let yaml = VALID_YAML.replace("bindingIPv4: 0.0.0.0", "bindingIPv4: POD_IP_TEST_AUSF");
        let config = AusfConfig::from_yaml(&yaml).unwrap();

        std::env::set_var("POD_IP_TEST_AUSF", "10.1.2.3");
        assert_eq!(config.binding_ipv4(), "10.1.2.3");
        std::env::remove_var("POD_IP_TEST_AUSF");

        // Without the variable the literal value is used.
        assert_eq!(config.binding_ipv4(), "POD_IP_TEST_AUSF");
    }

    #[test]
    fn test_log_levels() {
        for (level, expected) in [
            ("panic", log::LevelFilter::Error),
            ("fatal", log::LevelFilter::Error),
            ("error", log::LevelFilter::Error),
            ("warn", log::LevelFilter::Warn),
            ("info", log::LevelFilter::Info),
            ("debug", log::LevelFilter::Debug),
            ("bogus", log::LevelFilter::Info),
        ] {
            let yaml = VALID_YAML.replace("debugLevel: info", &format!("debugLevel: {level}"));
            let config = AusfConfig::from_yaml(&yaml).unwrap();
            assert_eq!(config.log_level(), expected, "level {level}");
        }
    }
}
