use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime settings for generating and running the proxy
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Where the generated config is written (default: /etc/nginx/sites-enabled/proxy.conf)
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Directory SSL certificate names are resolved against (default: /etc/nginx/ssl)
    #[serde(default = "default_ssl_dir")]
    pub ssl_dir: String,

    /// Template file overriding the built-in nginx template
    pub template: Option<String>,

    /// Proxy process to launch after the config is written
    #[serde(default)]
    pub proxy: ProxySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
            ssl_dir: default_ssl_dir(),
            template: None,
            proxy: ProxySettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    /// Command to run; may carry its own arguments (default: nginx)
    #[serde(default = "default_proxy_command")]
    pub command: String,

    /// Extra arguments appended after the command's own
    #[serde(default = "default_proxy_args")]
    pub args: Vec<String>,

    /// Grace period in seconds between SIGTERM and SIGKILL
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            command: default_proxy_command(),
            args: default_proxy_args(),
            shutdown_grace_period_secs: default_shutdown_grace_period(),
        }
    }
}

impl ProxySettings {
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }

    /// Split the command into program and arguments, then append `args`
    pub fn argv(&self) -> Result<Vec<String>, String> {
        let mut argv = shell_words::split(&self.command)
            .map_err(|e| format!("proxy 'command' could not be parsed: {}", e))?;
        if argv.is_empty() {
            return Err("proxy 'command' must not be empty".to_string());
        }
        argv.extend(self.args.iter().cloned());
        Ok(argv)
    }
}

// Default value functions
fn default_output_file() -> String {
    "/etc/nginx/sites-enabled/proxy.conf".to_string()
}

fn default_ssl_dir() -> String {
    "/etc/nginx/ssl".to_string()
}

fn default_proxy_command() -> String {
    "nginx".to_string()
}

fn default_proxy_args() -> Vec<String> {
    // nginx must stay in the foreground to be supervised
    vec!["-g".to_string(), "daemon off;".to_string()]
}

fn default_shutdown_grace_period() -> u64 {
    10
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate all settings
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.output_file.trim().is_empty() {
            errors.push("'output_file' must not be empty".to_string());
        }

        if self.ssl_dir.trim().is_empty() {
            errors.push("'ssl_dir' must not be empty".to_string());
        }

        if let Err(e) = self.proxy.argv() {
            errors.push(e);
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_file)
    }

    pub fn ssl_path(&self) -> PathBuf {
        PathBuf::from(&self.ssl_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        let toml = r#"
output_file = "/tmp/proxy.conf"
ssl_dir = "/tmp/ssl"
template = "/etc/linkgate/proxy.conf.j2"

[proxy]
command = "openresty"
args = ["-p", "/srv"]
shutdown_grace_period_secs = 3
"#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.output_file, "/tmp/proxy.conf");
        assert_eq!(settings.ssl_dir, "/tmp/ssl");
        assert_eq!(
            settings.template,
            Some("/etc/linkgate/proxy.conf.j2".to_string())
        );
        assert_eq!(settings.proxy.command, "openresty");
        assert_eq!(
            settings.proxy.shutdown_grace_period(),
            Duration::from_secs(3)
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_settings() {
        let settings: Settings = toml::from_str("").unwrap();

        assert_eq!(settings.output_file, "/etc/nginx/sites-enabled/proxy.conf");
        assert_eq!(settings.ssl_dir, "/etc/nginx/ssl");
        assert!(settings.template.is_none());
        assert_eq!(settings.proxy.command, "nginx");
        assert_eq!(settings.proxy.args, vec!["-g", "daemon off;"]);
        assert_eq!(settings.proxy.shutdown_grace_period_secs, 10);
    }

    #[test]
    fn test_default_matches_empty_file() {
        let parsed: Settings = toml::from_str("").unwrap();
        let default = Settings::default();
        assert_eq!(parsed.output_file, default.output_file);
        assert_eq!(parsed.ssl_dir, default.ssl_dir);
        assert_eq!(parsed.proxy.args, default.proxy.args);
    }

    #[test]
    fn test_argv_splits_command() {
        let proxy = ProxySettings {
            command: "nginx -c '/etc/nginx/my nginx.conf'".to_string(),
            args: vec!["-g".to_string(), "daemon off;".to_string()],
            shutdown_grace_period_secs: 1,
        };
        assert_eq!(
            proxy.argv().unwrap(),
            vec!["nginx", "-c", "/etc/nginx/my nginx.conf", "-g", "daemon off;"]
        );
    }

    #[test]
    fn test_validate_rejects_bad_command() {
        let toml = r#"
[proxy]
command = "   "
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("'command' must not be empty"));

        let toml = r#"
[proxy]
command = "nginx 'unterminated"
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("could not be parsed"));
    }

    #[test]
    fn test_validate_multiple_errors() {
        let toml = r#"
output_file = ""
ssl_dir = ""
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("'output_file' must not be empty"));
        assert!(err.contains("'ssl_dir' must not be empty"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkgate.toml");
        std::fs::write(&path, "output_file = \"/tmp/out.conf\"\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.output_path(), PathBuf::from("/tmp/out.conf"));

        let settings = Settings::load_or_default(None).unwrap();
        assert_eq!(settings.ssl_path(), PathBuf::from("/etc/nginx/ssl"));

        assert!(Settings::load(dir.path().join("missing.toml")).is_err());
    }
}
