//! Field-level settings persistence contract.
//!
//! Each configuration field is one fixed-size record under its own key. The
//! store itself (flash layout, wear leveling) is a collaborator; this module
//! owns the keys, the encodings and the boundary validation. Persistence
//! failures are logged and fall back to the compiled-in defaults, they never
//! reach the control loop.

#[cfg(feature = "defmt")]
use defmt::{info, warn};
#[cfg(not(feature = "defmt"))]
use log::{info, warn};

use crate::config::{ActivationMode, Config, DataRate, DeviceClass};
use crate::error::Error;

/// Largest encoded setting (the app key).
pub const MAX_SETTING_LEN: usize = 16;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SettingsKey {
    DevEui = 0,
    JoinEui = 1,
    AppKey = 2,
    Mode = 3,
    DataRate = 4,
    Class = 5,
    ConfirmedMsgs = 6,
    AppPort = 7,
    AutoJoin = 8,
    SendInterval = 9,
    SendMinDelay = 10,
    MaxSensorOnTime = 11,
    JoinTryCount = 12,
    MaxJoinSessions = 13,
    JoinRetryInterval = 14,
    JoinAttemptDelay = 15,
    MaxInactiveWindow = 16,
    MaxFailedMsgs = 17,
}

impl SettingsKey {
    pub const ALL: [SettingsKey; 18] = [
        SettingsKey::DevEui,
        SettingsKey::JoinEui,
        SettingsKey::AppKey,
        SettingsKey::Mode,
        SettingsKey::DataRate,
        SettingsKey::Class,
        SettingsKey::ConfirmedMsgs,
        SettingsKey::AppPort,
        SettingsKey::AutoJoin,
        SettingsKey::SendInterval,
        SettingsKey::SendMinDelay,
        SettingsKey::MaxSensorOnTime,
        SettingsKey::JoinTryCount,
        SettingsKey::MaxJoinSessions,
        SettingsKey::JoinRetryInterval,
        SettingsKey::JoinAttemptDelay,
        SettingsKey::MaxInactiveWindow,
        SettingsKey::MaxFailedMsgs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SettingsKey::DevEui => "dev_eui",
            SettingsKey::JoinEui => "join_eui",
            SettingsKey::AppKey => "app_key",
            SettingsKey::Mode => "mode",
            SettingsKey::DataRate => "data_rate",
            SettingsKey::Class => "class",
            SettingsKey::ConfirmedMsgs => "confirmed_msgs",
            SettingsKey::AppPort => "app_port",
            SettingsKey::AutoJoin => "auto_join",
            SettingsKey::SendInterval => "send_interval",
            SettingsKey::SendMinDelay => "send_min_delay",
            SettingsKey::MaxSensorOnTime => "max_sensor_on_time",
            SettingsKey::JoinTryCount => "join_try_count",
            SettingsKey::MaxJoinSessions => "max_join_sessions",
            SettingsKey::JoinRetryInterval => "join_retry_interval",
            SettingsKey::JoinAttemptDelay => "join_attempt_delay",
            SettingsKey::MaxInactiveWindow => "max_inactive_window",
            SettingsKey::MaxFailedMsgs => "max_failed_msgs",
        }
    }

    /// Exact encoded size of the record; anything else is rejected.
    pub fn size(&self) -> usize {
        match self {
            SettingsKey::DevEui | SettingsKey::JoinEui => 8,
            SettingsKey::AppKey => 16,
            SettingsKey::Mode
            | SettingsKey::DataRate
            | SettingsKey::Class
            | SettingsKey::ConfirmedMsgs
            | SettingsKey::AppPort
            | SettingsKey::AutoJoin
            | SettingsKey::JoinTryCount => 1,
            SettingsKey::MaxJoinSessions => 2,
            SettingsKey::SendInterval
            | SettingsKey::SendMinDelay
            | SettingsKey::MaxSensorOnTime
            | SettingsKey::JoinRetryInterval
            | SettingsKey::JoinAttemptDelay
            | SettingsKey::MaxInactiveWindow
            | SettingsKey::MaxFailedMsgs => 4,
        }
    }
}

/// The persistence collaborator contract.
pub trait SettingsStore {
    /// Reads the record for `key` into `buf`. `None` means not persisted.
    async fn load<'a>(
        &mut self,
        key: SettingsKey,
        buf: &'a mut [u8],
    ) -> crate::Result<Option<&'a [u8]>>;

    async fn save(&mut self, key: SettingsKey, value: &[u8]) -> crate::Result<()>;
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decodes one persisted record into its configuration field. Wrong sizes
/// and out-of-range discriminants are rejected here, at the boundary.
pub fn apply_setting(config: &mut Config, key: SettingsKey, bytes: &[u8]) -> crate::Result<()> {
    if bytes.len() != key.size() {
        return Err(Error::SizeMismatchError);
    }
    match key {
        SettingsKey::DevEui => config.credentials.dev_eui.copy_from_slice(bytes),
        SettingsKey::JoinEui => config.credentials.join_eui.copy_from_slice(bytes),
        SettingsKey::AppKey => config.credentials.app_key.copy_from_slice(bytes),
        SettingsKey::Mode => {
            config.mode = match bytes[0] {
                0 => ActivationMode::Otaa,
                1 => ActivationMode::Abp,
                _ => return Err(Error::ParseError),
            }
        }
        SettingsKey::DataRate => config.data_rate = DataRate(bytes[0]),
        SettingsKey::Class => {
            config.class = match bytes[0] {
                0 => DeviceClass::ClassA,
                1 => DeviceClass::ClassB,
                2 => DeviceClass::ClassC,
                _ => return Err(Error::ParseError),
            }
        }
        SettingsKey::ConfirmedMsgs => config.confirmed_msgs = bytes[0] != 0,
        SettingsKey::AppPort => config.app_port = bytes[0],
        SettingsKey::AutoJoin => config.auto_join = bytes[0] != 0,
        SettingsKey::SendInterval => config.send_interval = le_u32(bytes),
        SettingsKey::SendMinDelay => config.send_min_delay = le_u32(bytes),
        SettingsKey::MaxSensorOnTime => config.max_sensor_on_time = le_u32(bytes),
        SettingsKey::JoinTryCount => config.join_try_count = bytes[0],
        SettingsKey::MaxJoinSessions => config.max_join_sessions = le_u16(bytes),
        SettingsKey::JoinRetryInterval => config.join_retry_interval = le_u32(bytes),
        SettingsKey::JoinAttemptDelay => config.join_attempt_delay = le_u32(bytes),
        SettingsKey::MaxInactiveWindow => config.max_inactive_window = le_u32(bytes),
        SettingsKey::MaxFailedMsgs => config.max_failed_msgs = le_u32(bytes),
    }
    Ok(())
}

/// Encodes one configuration field into `buf`, returning the record length.
pub fn encode_setting(config: &Config, key: SettingsKey, buf: &mut [u8]) -> usize {
    let size = key.size();
    let out = &mut buf[..size];
    match key {
        SettingsKey::DevEui => out.copy_from_slice(&config.credentials.dev_eui),
        SettingsKey::JoinEui => out.copy_from_slice(&config.credentials.join_eui),
        SettingsKey::AppKey => out.copy_from_slice(&config.credentials.app_key),
        SettingsKey::Mode => out[0] = config.mode as u8,
        SettingsKey::DataRate => out[0] = config.data_rate.0,
        SettingsKey::Class => out[0] = config.class as u8,
        SettingsKey::ConfirmedMsgs => out[0] = config.confirmed_msgs as u8,
        SettingsKey::AppPort => out[0] = config.app_port,
        SettingsKey::AutoJoin => out[0] = config.auto_join as u8,
        SettingsKey::SendInterval => out.copy_from_slice(&config.send_interval.to_le_bytes()),
        SettingsKey::SendMinDelay => out.copy_from_slice(&config.send_min_delay.to_le_bytes()),
        SettingsKey::MaxSensorOnTime => {
            out.copy_from_slice(&config.max_sensor_on_time.to_le_bytes())
        }
        SettingsKey::JoinTryCount => out[0] = config.join_try_count,
        SettingsKey::MaxJoinSessions => {
            out.copy_from_slice(&config.max_join_sessions.to_le_bytes())
        }
        SettingsKey::JoinRetryInterval => {
            out.copy_from_slice(&config.join_retry_interval.to_le_bytes())
        }
        SettingsKey::JoinAttemptDelay => {
            out.copy_from_slice(&config.join_attempt_delay.to_le_bytes())
        }
        SettingsKey::MaxInactiveWindow => {
            out.copy_from_slice(&config.max_inactive_window.to_le_bytes())
        }
        SettingsKey::MaxFailedMsgs => out.copy_from_slice(&config.max_failed_msgs.to_le_bytes()),
    }
    size
}

/// Loads the configuration, starting from the compiled-in defaults. Missing,
/// unreadable or malformed records leave their field at the default.
pub async fn load_config<S: SettingsStore>(store: &mut S) -> Config {
    let mut config = Config::default();
    let mut buf = [0u8; MAX_SETTING_LEN];
    for key in SettingsKey::ALL {
        match store.load(key, &mut buf).await {
            Ok(Some(bytes)) => {
                if let Err(err) = apply_setting(&mut config, key, bytes) {
                    warn!("Ignoring persisted '{}': {}", key.name(), err);
                }
            }
            Ok(None) => {}
            Err(err) => warn!("Cannot load '{}': {}", key.name(), err),
        }
    }
    info!("Configuration loaded");
    config
}

/// Persists one configuration field.
pub async fn save_setting<S: SettingsStore>(
    store: &mut S,
    config: &Config,
    key: SettingsKey,
) -> crate::Result<()> {
    let mut buf = [0u8; MAX_SETTING_LEN];
    let len = encode_setting(config, key, &mut buf);
    store.save(key, &buf[..len]).await
}
