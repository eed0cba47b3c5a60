//! Settings storage in the internal flash.
//!
//! A `sequential-storage` key-value map over the NVMC, one record per
//! [`SettingsKey`]. The map gets the last two 4 KiB pages of the 1 MiB
//! flash, which stays clear of the application image.

use core::ops::Range;

use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_nrf::nvmc::Nvmc;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{fetch_item, store_item};
use loratrail_common::error::Error;
use loratrail_common::persist::{SettingsKey, SettingsStore};

use crate::Result;

const SETTINGS_RANGE: Range<u32> = 0x000F_E000..0x0010_0000;

pub struct Flash {
    inner: BlockingAsync<Nvmc<'static>>,
    buffer: [u8; 128],
}

impl Flash {
    pub fn new(nvmc: Nvmc<'static>) -> Self {
        Self {
            inner: BlockingAsync::new(nvmc),
            buffer: [0; 128],
        }
    }
}

impl SettingsStore for Flash {
    async fn load<'a>(
        &mut self,
        key: SettingsKey,
        buf: &'a mut [u8],
    ) -> Result<Option<&'a [u8]>> {
        let item = fetch_item::<u8, &[u8], _>(
            &mut self.inner,
            SETTINGS_RANGE,
            &mut NoCache::new(),
            &mut self.buffer,
            &(key as u8),
        )
        .await
        .map_err(|_| Error::StorageError)?;
        match item {
            Some(bytes) => {
                if bytes.len() > buf.len() {
                    return Err(Error::BufferTooSmallError);
                }
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(Some(&buf[..bytes.len()]))
            }
            None => Ok(None),
        }
    }

    async fn save(&mut self, key: SettingsKey, value: &[u8]) -> Result<()> {
        store_item(
            &mut self.inner,
            SETTINGS_RANGE,
            &mut NoCache::new(),
            &mut self.buffer,
            &(key as u8),
            &value,
        )
        .await
        .map_err(|_| Error::StorageError)
    }
}
