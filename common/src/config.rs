use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// How many sends apart the forced confirmed-delivery connectivity probe is.
pub const CONFIRMED_PROBE_PERIOD: u32 = 10;

/// LoRaWAN activation mode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActivationMode {
    /// Over-the-air activation, requires a join handshake.
    #[default]
    Otaa,
    /// Activation by personalization, session keys are pre-provisioned.
    Abp,
}

/// LoRaWAN device class.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceClass {
    #[default]
    ClassA,
    ClassB,
    ClassC,
}

/// Region-dependent data rate index, DR0 to DR15.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataRate(pub u8);

impl Default for DataRate {
    fn default() -> Self {
        Self(3)
    }
}

/// OTAA credentials, byte order MSB-first as printed on the device label.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Credentials {
    pub dev_eui: [u8; 8],
    pub join_eui: [u8; 8],
    pub app_key: [u8; 16],
}

/// Operator-set configuration, persisted field by field through
/// [`crate::persist::SettingsStore`].
///
/// All durations are whole seconds, matching what the debug shell accepts. A
/// zero `send_interval` disables periodic sending entirely.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub credentials: Credentials,
    pub mode: ActivationMode,
    pub data_rate: DataRate,
    pub class: DeviceClass,
    /// Send confirmed messages by default.
    pub confirmed_msgs: bool,
    /// Application port telemetry is sent to.
    pub app_port: u8,
    /// Join automatically after boot and keep retrying.
    pub auto_join: bool,
    /// Periodic send interval in seconds, 0 disables periodic sending.
    pub send_interval: u32,
    /// Minimum spacing between two transmissions in seconds.
    pub send_min_delay: u32,
    /// Upper bound for one position acquisition in seconds.
    pub max_sensor_on_time: u32,
    /// Join attempts within one join session.
    pub join_try_count: u8,
    /// Failed join sessions tolerated before the device reboots.
    pub max_join_sessions: u16,
    /// Spacing between two join sessions in seconds.
    pub join_retry_interval: u32,
    /// Wait between two join attempts within a session in seconds.
    pub join_attempt_delay: u32,
    /// Maximum time without a successful send before a forced re-join,
    /// in seconds.
    pub max_inactive_window: u32,
    /// Maximum consecutive failed sends before a forced re-join.
    pub max_failed_msgs: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            mode: ActivationMode::Otaa,
            data_rate: DataRate::default(),
            class: DeviceClass::ClassA,
            confirmed_msgs: false,
            app_port: 2,
            auto_join: false,
            send_interval: 0,
            send_min_delay: 30,
            max_sensor_on_time: 300,
            join_try_count: 5,
            // 20 sessions of 5 attempts, 100 join attempts before reboot
            max_join_sessions: 20,
            join_retry_interval: 300,
            join_attempt_delay: 15,
            max_inactive_window: 3 * 3600,
            max_failed_msgs: 120,
        }
    }
}

impl Config {
    pub fn send_interval_duration(&self) -> Option<Duration> {
        match self.send_interval {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }

    pub fn send_min_delay_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.send_min_delay))
    }

    pub fn max_sensor_on_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_sensor_on_time))
    }

    pub fn join_retry_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.join_retry_interval))
    }

    pub fn max_inactive_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_inactive_window))
    }
}
