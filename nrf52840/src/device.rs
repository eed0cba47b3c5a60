use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::saadc::{self, ChannelConfig, Saadc};
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::uarte::{self, Baudrate};
use embassy_nrf::{bind_interrupts, peripherals};

use crate::lora_e5::LoraE5;

bind_interrupts!(struct Irqs {
    UARTE1 => uarte::InterruptHandler<peripherals::UARTE1>;
    SAADC => saadc::InterruptHandler;
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

/// The board periphery, split the way the tasks consume it.
pub struct Device {
    pub radio: LoraE5<'static>,
    pub green_led: Output<'static>,
    pub button: Input<'static>,
    pub saadc: Saadc<'static, 1>,
    pub twim: Twim<'static>,
    pub nvmc: Nvmc<'static>,
}

impl Device {
    pub fn new() -> Self {
        let p = embassy_nrf::init(Default::default());

        // LoRa-E5 module on UARTE1, 9600 baud AT interface
        let mut uart_config = uarte::Config::default();
        uart_config.baudrate = Baudrate::BAUD9600;
        let uart1 = uarte::Uarte::new(p.UARTE1, Irqs, p.P0_15, p.P0_16, uart_config);
        let (tx1, rx1) = uart1.split_with_idle(p.TIMER0, p.PPI_CH0, p.PPI_CH1);
        let blue_led = Output::new(p.P1_04, Level::Low, OutputDrive::Standard);
        let radio = LoraE5::new(tx1, rx1, blue_led);

        let green_led = Output::new(p.P1_03, Level::Low, OutputDrive::Standard);
        let button = Input::new(p.P1_06, Pull::Up);

        // battery divider on AIN0
        let channel_config = ChannelConfig::single_ended(p.P0_02);
        let saadc = Saadc::new(p.SAADC, Irqs, saadc::Config::default(), [channel_config]);

        let twim = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());

        Self {
            radio,
            green_led,
            button,
            saadc,
            twim,
            nvmc: Nvmc::new(p.NVMC),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}
