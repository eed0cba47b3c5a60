#![no_std]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod join;
pub mod payload;
pub mod persist;
pub mod radio;
pub mod scheduler;
pub mod status;

pub type Result<T> = core::result::Result<T, error::Error>;

#[cfg(all(target_abi = "eabihf", target_os = "none"))]
pub type RawMutex = embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
#[cfg(not(all(target_abi = "eabihf", target_os = "none")))]
pub type RawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
