use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use crate::{
    cmd_arg::CmdArgs,
    result::{ErrCvt, ZmConfigErr, ZmIoErr, ZmResult, ZmSerialErr},
};

/// Where each node's admin server serves the metrics command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsEndpointConfig {
    pub scheme: String,
    pub port: u16,
    pub command: String,
    pub timeout_ms: u64,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_owned(),
            port: 8080,
            command: "monitor".to_owned(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub addr: String,
    pub prefix: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:8089".to_owned(),
            prefix: "/zk-metrics".to_owned(),
        }
    }
}

fn default_refresh_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZmConfig {
    /// Comma separated `host[:port]` list, optionally followed by a chroot path.
    #[serde(default)]
    pub ensemble: String,
    /// Delay between rounds, 0 polls only when asked to.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
    #[serde(default)]
    pub metrics: MetricsEndpointConfig,
    /// Replaces the built-in schema catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for ZmConfig {
    fn default() -> Self {
        Self {
            ensemble: String::new(),
            refresh_ms: default_refresh_ms(),
            metrics: MetricsEndpointConfig::default(),
            schema_file: None,
            http: HttpConfig::default(),
        }
    }
}

impl ZmConfig {
    fn validate(&self) -> ZmResult<()> {
        if self.http.enabled && self.http.addr.parse::<SocketAddr>().is_err() {
            return Err(ZmConfigErr::InvalidHttpAddr(self.http.addr.clone()).into());
        }
        Ok(())
    }
}

fn read_yaml_config(file_path: impl AsRef<Path>) -> ZmResult<ZmConfig> {
    let path = file_path.as_ref();
    let file = File::open(path).map_err(|err| ZmIoErr::OpenFile {
        path: path.to_path_buf(),
        err,
    })?;
    serde_yaml::from_reader(file).map_err(|err| {
        ZmSerialErr::YamlDecode {
            err,
            context: path.display().to_string(),
        }
        .into()
    })
}

/// Config file first, then command line values on top.
pub fn read_config(args: &CmdArgs) -> ZmResult<ZmConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => read_yaml_config(path)?,
        None => ZmConfig::default(),
    };
    if let Some(ensemble) = args.ensemble.as_ref() {
        config.ensemble = ensemble.clone();
    }
    if let Some(refresh_ms) = args.refresh_ms {
        config.refresh_ms = refresh_ms;
    }
    if let Some(schema_file) = args.schema_file.as_ref() {
        config.schema_file = Some(schema_file.clone());
    }
    config.validate()?;
    Ok(config)
}

pub fn dump_default_config() -> ZmResult<String> {
    serde_yaml::to_string(&ZmConfig::default()).map_err(|err| ErrCvt(err).to_zm_serial_err())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args() -> CmdArgs {
        CmdArgs {
            config: None,
            ensemble: None,
            refresh_ms: None,
            schema_file: None,
            dump_default_config: false,
        }
    }

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config = read_config(&args()).unwrap();
        assert_eq!(config, ZmConfig::default());
        assert_eq!(config.refresh_ms, 2000);
        assert_eq!(config.metrics.port, 8080);
        assert_eq!(config.http.prefix, "/zk-metrics");
    }

    #[test]
    fn test_file_with_partial_sections() {
        let file = write_config(
            "ensemble: \"zk1:2181,zk2:2181\"\nmetrics:\n  port: 9090\nhttp:\n  enabled: false\n",
        );
        let mut a = args();
        a.config = Some(file.path().to_path_buf());
        let config = read_config(&a).unwrap();
        assert_eq!(config.ensemble, "zk1:2181,zk2:2181");
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.metrics.command, "monitor");
        assert!(!config.http.enabled);
        assert_eq!(config.refresh_ms, 2000);
    }

    #[test]
    fn test_command_line_overrides_file() {
        let file = write_config("ensemble: a\nrefresh_ms: 10\n");
        let mut a = args();
        a.config = Some(file.path().to_path_buf());
        a.ensemble = Some("b,c".to_owned());
        a.refresh_ms = Some(0);
        let config = read_config(&a).unwrap();
        assert_eq!(config.ensemble, "b,c");
        assert_eq!(config.refresh_ms, 0);
    }

    #[test]
    fn test_bad_inputs() {
        let mut a = args();
        a.config = Some(PathBuf::from("/definitely/not/here.yaml"));
        assert!(matches!(
            read_config(&a),
            Err(crate::result::ZmError::ZmIoErr(ZmIoErr::OpenFile { .. }))
        ));

        let file = write_config("refresh_ms: [1, 2]\n");
        a.config = Some(file.path().to_path_buf());
        assert!(matches!(
            read_config(&a),
            Err(crate::result::ZmError::ZmSerialErr(ZmSerialErr::YamlDecode { .. }))
        ));

        let file = write_config("http:\n  addr: nowhere\n");
        a.config = Some(file.path().to_path_buf());
        assert!(matches!(
            read_config(&a),
            Err(crate::result::ZmError::ZmConfigErr(ZmConfigErr::InvalidHttpAddr(_)))
        ));
    }

    #[test]
    fn test_dump_default_config_reads_back() {
        let text = dump_default_config().unwrap();
        let config: ZmConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(config, ZmConfig::default());
    }
}
