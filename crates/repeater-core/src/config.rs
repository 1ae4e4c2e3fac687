//! YAML system configuration (§6 "Configuration").

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::site::SiteModel;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_timeout() -> u64 {
    180
}

fn default_rf_mode_hang() -> u64 {
    5
}

fn default_net_mode_hang() -> u64 {
    3
}

fn default_rf_talkgroup_hang() -> u64 {
    10
}

fn default_cw_id_time() -> u64 {
    600
}

fn default_modem_port_type() -> String {
    "null".to_string()
}

fn default_iden_table_time() -> u64 {
    0
}

fn default_call_hang() -> u64 {
    5
}

fn default_queue_size_tdma() -> usize {
    5120
}

fn default_queue_size_fdma() -> usize {
    8192
}

fn default_tdu_preamble_count() -> u8 {
    8
}

fn default_network_port() -> u16 {
    62031
}

fn default_network_jitter() -> u64 {
    360
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CwIdConfig {
    #[serde(default = "default_false")]
    pub enable: bool,
    #[serde(default = "default_cw_id_time")]
    pub time: u64,
    #[serde(default)]
    pub callsign: String,
}

impl Default for CwIdConfig {
    fn default() -> Self {
        Self {
            enable: false,
            time: default_cw_id_time(),
            callsign: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    #[serde(default = "default_modem_port_type")]
    pub port_type: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub rx_offset: i32,
    #[serde(default)]
    pub tx_offset: i32,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port_type: default_modem_port_type(),
            port: String::new(),
            rx_offset: 0,
            tx_offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdenTableConfig {
    #[serde(default)]
    pub file: String,
    #[serde(default = "default_iden_table_time")]
    pub time: u64,
}

impl Default for IdenTableConfig {
    fn default() -> Self {
        Self {
            file: String::new(),
            time: default_iden_table_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub channel_id: u8,
    #[serde(default)]
    pub channel_no: u32,
    #[serde(default = "one")]
    pub site_id: u16,
    #[serde(default)]
    pub color_code: u8,
    #[serde(default = "one")]
    pub net_id: u16,
    #[serde(default = "three")]
    pub par_id: u8,
    #[serde(default)]
    pub site_model: SiteModel,
}

fn one() -> u16 {
    1
}

fn three() -> u8 {
    3
}

impl Default for SiteModel {
    fn default() -> Self {
        SiteModel::Small
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            channel_id: 0,
            channel_no: 1,
            site_id: one(),
            color_code: 0,
            net_id: one(),
            par_id: three(),
            site_model: SiteModel::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_false")]
    pub daemon: bool,
    #[serde(default = "default_false")]
    pub duplex: bool,
    #[serde(default = "default_false")]
    pub fixed_mode: bool,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_rf_mode_hang")]
    pub rf_mode_hang: u64,
    #[serde(default = "default_net_mode_hang")]
    pub net_mode_hang: u64,
    #[serde(default = "default_rf_talkgroup_hang")]
    pub rf_talkgroup_hang: u64,
    #[serde(default)]
    pub cw_id: CwIdConfig,
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub iden_table: IdenTableConfig,
    #[serde(default)]
    pub config: SiteConfig,
    #[serde(default)]
    pub lock_file: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            daemon: false,
            duplex: false,
            fixed_mode: false,
            timeout: default_timeout(),
            rf_mode_hang: default_rf_mode_hang(),
            net_mode_hang: default_net_mode_hang(),
            rf_talkgroup_hang: default_rf_talkgroup_hang(),
            cw_id: CwIdConfig::default(),
            modem: ModemConfig::default(),
            iden_table: IdenTableConfig::default(),
            config: SiteConfig::default(),
            lock_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TdmaConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_false")]
    pub beacons: bool,
    #[serde(default = "default_false")]
    pub control: bool,
    #[serde(default = "default_call_hang")]
    pub call_hang: u64,
    #[serde(default = "default_queue_size_tdma")]
    pub queue_size: usize,
}

impl Default for TdmaConfig {
    fn default() -> Self {
        Self {
            enable: true,
            beacons: false,
            control: false,
            call_hang: default_call_hang(),
            queue_size: default_queue_size_tdma(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FdmaConfig {
    #[serde(default = "default_false")]
    pub enable: bool,
    #[serde(default = "default_false")]
    pub control: bool,
    #[serde(default = "default_tdu_preamble_count")]
    pub tdu_preamble_count: u8,
    #[serde(default = "default_call_hang")]
    pub call_hang: u64,
    #[serde(default = "default_queue_size_fdma")]
    pub queue_size: usize,
}

impl Default for FdmaConfig {
    fn default() -> Self {
        Self {
            enable: false,
            control: false,
            tdu_preamble_count: default_tdu_preamble_count(),
            call_hang: default_call_hang(),
            queue_size: default_queue_size_fdma(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProtocolsConfig {
    #[serde(default)]
    pub dmr: TdmaConfig,
    #[serde(default)]
    pub p25: FdmaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_false")]
    pub enable: bool,
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_network_port")]
    pub port: u16,
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_network_jitter")]
    pub jitter: u64,
    #[serde(default = "default_true")]
    pub slot1: bool,
    #[serde(default = "default_true")]
    pub slot2: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enable: false,
            address: String::new(),
            port: default_network_port(),
            id: 0,
            password: String::new(),
            jitter: default_network_jitter(),
            slot1: true,
            slot2: true,
        }
    }
}

/// Root configuration document (§6's table of recognised top-level
/// options).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub protocols: ProtocolsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl HostConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: HostConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject combinations §7 classifies as fatal startup errors (e.g.
    /// a dedicated control channel enabled alongside the other
    /// protocol: §9 "do not attempt a multiplexed CC").
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.protocols.dmr.enable && !self.protocols.p25.enable {
            return Err(ConfigError::Invalid(
                "at least one of protocols.dmr.enable / protocols.p25.enable must be true".into(),
            ));
        }

        if self.system.fixed_mode && self.protocols.dmr.enable && self.protocols.p25.enable {
            return Err(ConfigError::Invalid(
                "system.fixedMode requires exactly one protocol enabled".into(),
            ));
        }

        if self.protocols.dmr.control && self.protocols.p25.control {
            return Err(ConfigError::Invalid(
                "simultaneous dual-protocol dual control-channel is not supported".into(),
            ));
        }

        if (self.protocols.dmr.control && self.protocols.p25.enable)
            || (self.protocols.p25.control && self.protocols.dmr.enable)
        {
            return Err(ConfigError::Invalid(
                "a protocol's control channel cannot coexist with the other protocol enabled".into(),
            ));
        }

        if (self.protocols.dmr.control || self.protocols.p25.control || self.protocols.dmr.beacons)
            && !self.system.duplex
        {
            return Err(ConfigError::Invalid(
                "a dedicated control channel or beacons require system.duplex".into(),
            ));
        }

        if self.network.enable && self.network.address.is_empty() {
            return Err(ConfigError::Invalid(
                "network.enable requires network.address".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_with_dmr_enabled() {
        let config = HostConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_no_protocol_enabled() {
        let mut config = HostConfig::default();
        config.protocols.dmr.enable = false;
        config.protocols.p25.enable = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_fixed_mode_with_both_protocols() {
        let mut config = HostConfig::default();
        config.system.fixed_mode = true;
        config.protocols.dmr.enable = true;
        config.protocols.p25.enable = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_dual_control_channel() {
        let mut config = HostConfig::default();
        config.protocols.dmr.control = true;
        config.protocols.p25.control = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn control_channel_requires_duplex() {
        let mut config = HostConfig::default();
        config.protocols.dmr.control = true;
        config.system.duplex = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_control_channel_coexisting_with_other_protocol_enabled() {
        let mut config = HostConfig::default();
        config.protocols.dmr.control = true;
        config.protocols.p25.enable = true;
        config.system.duplex = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_beacons_without_duplex() {
        let mut config = HostConfig::default();
        config.protocols.dmr.beacons = true;
        config.system.duplex = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_yaml() {
        let config = HostConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed: HostConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.system.timeout, config.system.timeout);
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.yaml");
        std::fs::write(&path, "protocols:\n  dmr:\n    enable: true\n").unwrap();
        let config = HostConfig::from_file(&path).unwrap();
        assert!(config.protocols.dmr.enable);
    }
}
