//! Telemetry payload builders and the sensor collaborator contracts.
//!
//! Payloads are fixed-size packed little-endian records transmitted verbatim
//! as the radio payload. Sensor reads are synchronous "latest sample" calls;
//! a failed read degrades to zeroed fields and never aborts a transmission.

#[cfg(feature = "defmt")]
use defmt::warn;
use heapless::Vec;
#[cfg(not(feature = "defmt"))]
use log::warn;

pub const MAX_PAYLOAD_LEN: usize = 16;

pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

/// Battery voltage collaborator.
pub trait Battery {
    fn read_millivolts(&mut self) -> crate::Result<u16>;
}

/// Latest known position.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fix {
    /// Latitude in 1e-7 degrees.
    pub latitude_e7: i32,
    /// Longitude in 1e-7 degrees.
    pub longitude_e7: i32,
    /// Altitude in meters.
    pub altitude_m: i16,
    /// Horizontal accuracy in meters.
    pub accuracy_m: u8,
    pub satellites: u8,
}

/// Position collaborator. Returns the latest fix, fresh or stale; freshness
/// is tracked by the dispatcher, not here.
pub trait LocationSource {
    fn last_fix(&mut self) -> Option<Fix>;
}

#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EnvSample {
    pub temperature_mk: u32,
    pub pressure_pa: u32,
    pub humidity_pct: u8,
}

/// Environmental sensor collaborator.
pub trait EnvSensor {
    fn read(&mut self) -> crate::Result<EnvSample>;
}

/// Control over a power-gated trigger source (the GNSS receiver on the
/// mapper variant).
pub trait AcquisitionGate {
    fn set_enabled(&mut self, enabled: bool);
}

/// Gate for variants without a pre-transmission acquisition phase.
pub struct NoAcquisition;

impl AcquisitionGate for NoAcquisition {
    fn set_enabled(&mut self, _enabled: bool) {}
}

/// Builds the telemetry record for one transmission.
pub trait PayloadBuilder {
    /// Whether transmissions wait for fresh positional data first.
    const GATED: bool;

    /// `fix` tells the builder whether a fix arrived since the last
    /// transmission.
    fn build(&mut self, fix: bool) -> Payload;
}

/// Coverage-mapper record: fix flag, battery, position. 15 bytes.
pub struct MapperPayload<B, L> {
    battery: B,
    location: L,
}

impl<B: Battery, L: LocationSource> MapperPayload<B, L> {
    pub fn new(battery: B, location: L) -> Self {
        Self { battery, location }
    }
}

impl<B: Battery, L: LocationSource> PayloadBuilder for MapperPayload<B, L> {
    const GATED: bool = true;

    fn build(&mut self, fix: bool) -> Payload {
        let battery_mv = self.battery.read_millivolts().unwrap_or_else(|err| {
            warn!("Battery read failed: {}", err);
            0
        });
        let position = self.location.last_fix().unwrap_or_default();

        let mut payload = Payload::new();
        let _ = payload.push(fix as u8);
        let _ = payload.extend_from_slice(&battery_mv.to_le_bytes());
        let _ = payload.extend_from_slice(&position.latitude_e7.to_le_bytes());
        let _ = payload.extend_from_slice(&position.longitude_e7.to_le_bytes());
        let _ = payload.extend_from_slice(&position.altitude_m.to_le_bytes());
        let _ = payload.push(position.accuracy_m);
        let _ = payload.push(position.satellites);
        payload
    }
}

/// Environmental record: temperature, pressure, humidity, battery. 11 bytes.
pub struct MeteoPayload<B, E> {
    battery: B,
    env: E,
}

impl<B: Battery, E: EnvSensor> MeteoPayload<B, E> {
    pub fn new(battery: B, env: E) -> Self {
        Self { battery, env }
    }
}

impl<B: Battery, E: EnvSensor> PayloadBuilder for MeteoPayload<B, E> {
    const GATED: bool = false;

    fn build(&mut self, _fix: bool) -> Payload {
        let battery_mv = self.battery.read_millivolts().unwrap_or_else(|err| {
            warn!("Battery read failed: {}", err);
            0
        });
        let sample = self.env.read().unwrap_or_else(|err| {
            warn!("Environmental read failed: {}", err);
            EnvSample::default()
        });

        let mut payload = Payload::new();
        let _ = payload.extend_from_slice(&sample.temperature_mk.to_le_bytes());
        let _ = payload.extend_from_slice(&sample.pressure_pa.to_le_bytes());
        let _ = payload.push(sample.humidity_pct);
        let _ = payload.extend_from_slice(&battery_mv.to_le_bytes());
        payload
    }
}
