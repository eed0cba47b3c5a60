//! Battery and environmental sampling.
//!
//! The payload builder reads synchronously, so a sampler task keeps the
//! latest values cached and the [`Battery`]/[`EnvSensor`] impls only read
//! the cache.

use core::cell::Cell;
use core::sync::atomic::{AtomicU16, Ordering};

use defmt::warn;
use embassy_nrf::saadc::Saadc;
use embassy_nrf::twim::Twim;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_time::Timer;
use loratrail_common::RawMutex;
use loratrail_common::error::Error;
use loratrail_common::payload::{Battery, EnvSample, EnvSensor};

use crate::Result;

const SHT31_ADDR: u8 = 0x44;
/// Single-shot measurement, high repeatability, no clock stretching.
const SHT31_MEASURE: [u8; 2] = [0x24, 0x00];

static SAMPLE_PERIOD_SECS: u64 = 10;

static BATTERY_MV: AtomicU16 = AtomicU16::new(0);
static ENV: BlockingMutex<RawMutex, Cell<Option<EnvSample>>> =
    BlockingMutex::new(Cell::new(None));

#[embassy_executor::task]
pub async fn sensor_sampler(mut saadc: Saadc<'static, 1>, mut twim: Twim<'static>) {
    loop {
        let mut buf = [0i16; 1];
        saadc.sample(&mut buf).await;
        // 12-bit result, gain 1/6, 0.6 V reference: 3.6 V full scale
        let millivolts = (i32::from(buf[0]).max(0) * 3600 / 4096) as u16;
        BATTERY_MV.store(millivolts, Ordering::Relaxed);

        match read_sht31(&mut twim).await {
            Ok(sample) => ENV.lock(|cell| cell.set(Some(sample))),
            Err(err) => warn!("SHT31 read failed: {}", err),
        }
        Timer::after_secs(SAMPLE_PERIOD_SECS).await;
    }
}

async fn read_sht31(twim: &mut Twim<'static>) -> Result<EnvSample> {
    twim.write(SHT31_ADDR, &SHT31_MEASURE).await.map_err(|_| Error::SensorError)?;
    // high-repeatability conversion time
    Timer::after_millis(16).await;
    let mut buf = [0u8; 6];
    twim.read(SHT31_ADDR, &mut buf).await.map_err(|_| Error::SensorError)?;

    let raw_temperature = u64::from(u16::from_be_bytes([buf[0], buf[1]]));
    let raw_humidity = u32::from(u16::from_be_bytes([buf[3], buf[4]]));
    // -45 degC + 175 degC * raw / 65535, expressed in millikelvin
    let temperature_mk = 228_150 + (raw_temperature * 175_000 / 65_535) as u32;
    Ok(EnvSample {
        temperature_mk,
        // no barometer on this board
        pressure_pa: 0,
        humidity_pct: (raw_humidity * 100 / 65_535) as u8,
    })
}

/// Latest battery voltage from the sampler task.
pub struct CachedBattery;

impl Battery for CachedBattery {
    fn read_millivolts(&mut self) -> Result<u16> {
        match BATTERY_MV.load(Ordering::Relaxed) {
            0 => Err(Error::SensorError),
            millivolts => Ok(millivolts),
        }
    }
}

/// Latest environmental sample from the sampler task.
pub struct CachedEnv;

impl EnvSensor for CachedEnv {
    fn read(&mut self) -> Result<EnvSample> {
        ENV.lock(|cell| cell.get()).ok_or(Error::SensorError)
    }
}
