//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use serde::Deserialize;

/// Top-level daemon configuration, loaded from TOML with CLI `option=value`
/// override applied after file load (see [`Config::load`] and
/// [`Config::apply_override`]).
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub user: String,
    pub group: String,
    pub database_path: String,
    pub logging: Logging,
    pub tokio_console: TokioConsole,
    pub clicon: Clicon,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokioConsole {
    pub enabled: bool,
}

/// The `CLICON_*` option surface, kept under one flat field per option name
/// so `Config::apply_override`'s `option=value` parsing can address each one
/// directly by its documented name.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Clicon {
    pub clicon_configfile: Option<String>,
    pub clicon_xmldb_dir: String,
    pub clicon_xmldb_format: XmldbFormat,
    pub clicon_xmldb_pretty: bool,
    pub clicon_sock: String,
    pub clicon_sock_family: SockFamily,
    pub clicon_netconf_hello_optional: bool,
    pub clicon_netconf_base_capability: bool,
    pub clicon_restconf_startup_dontupdate: bool,
    pub clicon_yang_dir: Vec<String>,
    // Not a clixon option name: this system exposes NETCONF directly over a
    // TCP listener rather than through an SSH subsystem, so it needs its own
    // bind address. Kept alongside the CLICON_* surface since it plays the
    // same "where do frontends listen" role `CLICON_SOCK` plays for IPC.
    pub netconf_listen: String,
    // Optional whole-process timeout for test/debug use: the process exits
    // cleanly once this many seconds have elapsed since startup.
    pub session_timeout_secs: Option<u64>,
    // Seconds a `<commit confirmed="true">` stays pending before an
    // automatic rollback to the prior `running` content, absent a
    // confirming follow-up `<commit>`. RFC 6241's `:confirmed-commit`
    // default is 600.
    pub confirmed_commit_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum XmldbFormat {
    Xml,
    Json,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SockFamily {
    Unix,
    #[serde(rename = "IPv4")]
    Ipv4,
    #[serde(rename = "IPv6")]
    Ipv6,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub journald: LoggingJournald,
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingJournald {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/ncd.toml";

    pub fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        let mut config = match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str)
                .expect("Failed to parse configuration file"),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Config::default()
            }
        };
        config.clicon.clicon_configfile =
            config.clicon.clicon_configfile.or_else(|| Some(config_file.to_owned()));
        config
    }

    /// Applies `option=value` overrides (e.g. from extra CLI positional
    /// arguments), matching clixon's documented "file, then command line"
    /// override order. Unknown option names are logged and skipped rather
    /// than treated as fatal, since a typo in an ad hoc override shouldn't
    /// keep the daemon from starting with its file-provided configuration.
    pub fn apply_override(&mut self, option: &str, value: &str) {
        match option {
            "CLICON_CONFIGFILE" => self.clicon.clicon_configfile = Some(value.to_owned()),
            "CLICON_XMLDB_DIR" => self.clicon.clicon_xmldb_dir = value.to_owned(),
            "CLICON_XMLDB_FORMAT" => match value {
                "xml" => self.clicon.clicon_xmldb_format = XmldbFormat::Xml,
                "json" => self.clicon.clicon_xmldb_format = XmldbFormat::Json,
                _ => tracing::warn!(value, "invalid CLICON_XMLDB_FORMAT override"),
            },
            "CLICON_XMLDB_PRETTY" => {
                self.clicon.clicon_xmldb_pretty = value == "1" || value == "true"
            }
            "CLICON_SOCK" => self.clicon.clicon_sock = value.to_owned(),
            "CLICON_SOCK_FAMILY" => match value {
                "UNIX" => self.clicon.clicon_sock_family = SockFamily::Unix,
                "IPv4" => self.clicon.clicon_sock_family = SockFamily::Ipv4,
                "IPv6" => self.clicon.clicon_sock_family = SockFamily::Ipv6,
                _ => tracing::warn!(value, "invalid CLICON_SOCK_FAMILY override"),
            },
            "CLICON_NETCONF_HELLO_OPTIONAL" => {
                self.clicon.clicon_netconf_hello_optional = value == "1" || value == "true"
            }
            "CLICON_NETCONF_BASE_CAPABILITY" => {
                self.clicon.clicon_netconf_base_capability = value != "0"
            }
            "CLICON_RESTCONF_STARTUP_DONTUPDATE" => {
                self.clicon.clicon_restconf_startup_dontupdate =
                    value == "1" || value == "true"
            }
            "CLICON_YANG_DIR" => {
                self.clicon.clicon_yang_dir =
                    value.split(':').map(|s| s.to_owned()).collect()
            }
            _ => tracing::warn!(option, "unknown configuration option override"),
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            user: "ncd".to_owned(),
            group: "ncd".to_owned(),
            database_path: "/var/opt/ncd/ncd.db".to_owned(),
            logging: Default::default(),
            tokio_console: Default::default(),
            clicon: Default::default(),
        }
    }
}

impl Default for Clicon {
    fn default() -> Clicon {
        Clicon {
            clicon_configfile: None,
            clicon_xmldb_dir: "/var/opt/ncd/db".to_owned(),
            clicon_xmldb_format: XmldbFormat::Xml,
            clicon_xmldb_pretty: true,
            clicon_sock: "/var/run/ncd/ncd.sock".to_owned(),
            clicon_sock_family: SockFamily::Unix,
            clicon_netconf_hello_optional: false,
            clicon_netconf_base_capability: true,
            clicon_restconf_startup_dontupdate: false,
            clicon_yang_dir: vec!["/usr/share/ncd/yang".to_owned()],
            netconf_listen: "[::]:830".to_owned(),
            session_timeout_secs: None,
            confirmed_commit_timeout_secs: 600,
        }
    }
}

// ===== impl LoggingJournald =====

impl Default for LoggingJournald {
    fn default() -> LoggingJournald {
        LoggingJournald { enabled: false }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: true,
            dir: "/var/log".to_owned(),
            name: "ncd.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: false,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_clixon_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.clicon.clicon_xmldb_format, XmldbFormat::Xml);
        assert_eq!(config.clicon.clicon_sock_family, SockFamily::Unix);
        assert!(!config.clicon.clicon_netconf_hello_optional);
        assert!(config.clicon.clicon_netconf_base_capability);
    }

    #[test]
    fn override_applies_known_option() {
        let mut config = Config::default();
        config.apply_override("CLICON_XMLDB_FORMAT", "json");
        assert_eq!(config.clicon.clicon_xmldb_format, XmldbFormat::Json);
    }

    #[test]
    fn override_ignores_unknown_option() {
        let mut config = Config::default();
        config.apply_override("CLICON_NOT_A_REAL_OPTION", "x");
        assert_eq!(config.user, "ncd");
    }
}
