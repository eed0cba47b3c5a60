use embassy_sync::{channel::Channel, mutex::Mutex};
use heapless::Vec;

use crate::RawMutex;
use crate::config::{ActivationMode, Config, Credentials, DataRate};

pub const MAX_DOWNLINK_LEN: usize = 64;

/// Confirmed messages require a network-side acknowledgement and double as
/// connectivity probes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageKind {
    Unconfirmed,
    Confirmed,
}

/// Snapshot of everything one join session needs, taken from [`Config`] when
/// the session is requested. The worker never reads `Config` directly.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JoinRequest {
    pub mode: ActivationMode,
    pub credentials: Credentials,
    pub data_rate: DataRate,
    /// Join attempts within this session.
    pub attempts: u8,
    /// Wait between two attempts in seconds.
    pub attempt_delay: u32,
    /// Failed sessions tolerated before the device reboots.
    pub max_sessions: u16,
}

impl JoinRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.mode,
            credentials: config.credentials,
            data_rate: config.data_rate,
            attempts: config.join_try_count,
            attempt_delay: config.join_attempt_delay,
            max_sessions: config.max_join_sessions,
        }
    }
}

/// A received downlink, pushed by the radio driver. What consumes it (the
/// debug shell in the full device) is outside the control loop.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Downlink {
    pub port: u8,
    pub data: Vec<u8, MAX_DOWNLINK_LEN>,
}

/// Downlinks received from the network.
pub static DOWNLINKS: Channel<RawMutex, Downlink, 2> = Channel::new();

/// Contract of the LoRaWAN radio stack.
///
/// Implementations block for as long as the network takes; only the join
/// worker and the dispatcher's transmit path may call into them, never an
/// event producer.
pub trait LoraRadio {
    /// Brings the radio up after power-on.
    async fn start(&mut self) -> crate::Result<()>;

    async fn set_data_rate(&mut self, data_rate: DataRate) -> crate::Result<()>;

    /// Performs one join handshake. Blocks until the network accepts or
    /// rejects the join, or the attempt times out.
    async fn join(&mut self, request: &JoinRequest) -> crate::Result<()>;

    /// Transmits one payload. For [`MessageKind::Confirmed`] the result
    /// reflects whether the network acknowledged the message.
    async fn send(&mut self, port: u8, payload: &[u8], kind: MessageKind) -> crate::Result<()>;
}

/// The radio is shared between the join worker and the dispatcher. The mutex
/// hand-off is what keeps a join session and a transmission from
/// interleaving on the driver.
pub type RadioMutex<R> = Mutex<RawMutex, Option<R>>;
