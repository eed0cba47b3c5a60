use thiserror::Error;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    #[error("Buffer too small")]
    BufferTooSmallError,
    #[error("Cannot parse value")]
    ParseError,
    #[error("Radio module error")]
    RadioError,
    #[error("Join attempt failed")]
    JoinError,
    #[error("Transmission failed")]
    SendError,
    #[error("Operation timed out")]
    TimeoutError,
    #[error("Sensor read failed")]
    SensorError,
    #[error("Settings storage error")]
    StorageError,
    #[error("Persisted value has wrong size")]
    SizeMismatchError,
}
