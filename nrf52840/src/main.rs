#![no_std]
#![no_main]

use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Input, Output};
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use loratrail_common::dispatcher::{COMMANDS, Command, Dispatcher, STATUS_SNAPSHOTS};
use loratrail_common::event::{Event, EventQueue};
use loratrail_common::join::{JoinWorker, Reboot};
use loratrail_common::payload::{MeteoPayload, NoAcquisition};
use loratrail_common::persist::load_config;
use loratrail_common::radio::{DOWNLINKS, RadioMutex};
use loratrail_nrf52840::{
    self as _,
    device::Device,
    flash::Flash,
    lora_e5::LoraE5,
    sensors::{CachedBattery, CachedEnv, sensor_sampler},
};

type MeteoDispatcher =
    Dispatcher<LoraE5<'static>, MeteoPayload<CachedBattery, CachedEnv>, NoAcquisition>;
type Worker = JoinWorker<LoraE5<'static>, WarmReboot>;

static RADIO: RadioMutex<LoraE5<'static>> = Mutex::new(None);
static QUEUE: EventQueue = EventQueue::new();

struct WarmReboot;

impl Reboot for WarmReboot {
    fn reboot(&mut self) {
        cortex_m::peripheral::SCB::sys_reset();
    }
}

#[embassy_executor::task]
async fn dispatcher_loop(mut dispatcher: MeteoDispatcher) {
    dispatcher.run().await;
}

#[embassy_executor::task]
async fn join_worker(mut worker: Worker) {
    worker.run().await;
}

#[embassy_executor::task]
async fn button_events(mut button: Input<'static>) {
    loop {
        button.wait_for_falling_edge().await;
        QUEUE.push(Event::ButtonPressed);
        // contact bounce
        Timer::after_millis(200).await;
    }
}

/// Green LED is lit while the device is not joined.
#[embassy_executor::task]
async fn joined_indicator(mut green_led: Output<'static>) {
    loop {
        COMMANDS.send(Command::ReportStatus).await;
        let status = STATUS_SNAPSHOTS.wait().await;
        if status.joined {
            green_led.set_low();
        } else {
            green_led.set_high();
        }
        Timer::after_secs(1).await;
    }
}

#[embassy_executor::task]
async fn downlink_logger() {
    loop {
        let downlink = DOWNLINKS.receive().await;
        info!(
            "Downlink on port {}: {=[u8]:x}",
            downlink.port,
            downlink.data.as_slice()
        );
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let device = Device::new();
    let mut flash = Flash::new(device.nvmc);
    let config = load_config(&mut flash).await;
    info!("Device initialized");

    {
        *(RADIO.lock().await) = Some(device.radio);
    }
    spawner.spawn(sensor_sampler(device.saadc, device.twim).unwrap());

    let builder = MeteoPayload::new(CachedBattery, CachedEnv);
    let mut dispatcher = MeteoDispatcher::new(&RADIO, &QUEUE, builder, NoAcquisition, config);
    if let Err(err) = dispatcher.start().await {
        error!("Radio init failed: {}, resetting in 30 s", err);
        Timer::after_secs(30).await;
        cortex_m::peripheral::SCB::sys_reset();
    }
    spawner.spawn(dispatcher_loop(dispatcher).unwrap());
    spawner.spawn(
        join_worker(JoinWorker::new(
            &RADIO,
            WarmReboot,
            Duration::from_secs(30),
        ))
        .unwrap(),
    );
    spawner.spawn(button_events(device.button).unwrap());
    spawner.spawn(joined_indicator(device.green_led).unwrap());
    spawner.spawn(downlink_logger().unwrap());
}
