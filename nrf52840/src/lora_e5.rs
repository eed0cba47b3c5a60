//! AT-command driver for the Seeed LoRa-E5 module.
//!
//! The module terminates the LoRaWAN stack; this driver only issues AT
//! commands over UARTE1 and classifies the responses. Long operations (join,
//! confirmed sends) stream progress lines, so those reads accumulate until a
//! final marker arrives.

use defmt::{info, warn};
use embassy_nrf::gpio::Output;
use embassy_nrf::uarte::{UarteRxWithIdle, UarteTx};
use embassy_time::{Duration, Instant, Timer, with_timeout};
use heapless::{String, Vec, format};
use loratrail_common::config::{ActivationMode, DataRate};
use loratrail_common::error::Error;
use loratrail_common::radio::{DOWNLINKS, Downlink, JoinRequest, LoraRadio, MessageKind};

use crate::Result;

const AT_BUF_SIZE: usize = 300;
const AT_COMMAND_SIZE: usize = 100;
const AT_RESPONSE_SIZE: usize = 600;

static SHORT_TIMEOUT: Duration = Duration::from_millis(300);
static CONFIG_TIMEOUT: Duration = Duration::from_secs(1);
/// Join covers the whole OTAA handshake including both receive windows.
static JOIN_TIMEOUT: Duration = Duration::from_secs(30);
static SEND_TIMEOUT: Duration = Duration::from_secs(15);

type Response = String<AT_RESPONSE_SIZE>;

pub struct LoraE5<'a> {
    tx: UarteTx<'a>,
    rx: UarteRxWithIdle<'a>,
    blue_led: Output<'a>,
}

impl<'a> LoraE5<'a> {
    pub fn new(tx: UarteTx<'a>, rx: UarteRxWithIdle<'a>, blue_led: Output<'a>) -> Self {
        Self { tx, rx, blue_led }
    }

    async fn write_command(&mut self, command: &str) -> Result<()> {
        let mut line: String<AT_COMMAND_SIZE> =
            String::try_from(command).map_err(|_| Error::BufferTooSmallError)?;
        line.push_str("\r\n").map_err(|_| Error::BufferTooSmallError)?;
        self.tx.write(line.as_bytes()).await.map_err(|_| Error::RadioError)
    }

    /// One command, one idle-delimited response burst.
    async fn call(&mut self, command: &str, timeout: Duration) -> Result<Response> {
        self.write_command(command).await?;
        let mut buf = [0; AT_BUF_SIZE];
        self.blue_led.set_high();
        let read = with_timeout(timeout, self.rx.read_until_idle(&mut buf)).await;
        self.blue_led.set_low();
        let len = read.map_err(|_| Error::TimeoutError)?.map_err(|_| Error::RadioError)?;
        let text = core::str::from_utf8(&buf[..len]).map_err(|_| Error::ParseError)?;
        for line in text.lines().filter(|l| !l.is_empty()) {
            info!("Read {}", line);
        }
        let mut response = Response::new();
        response.push_str(text).map_err(|_| Error::BufferTooSmallError)?;
        Ok(response)
    }

    /// One command, accumulating progress lines until a line containing one
    /// of `finals` arrives or `timeout` expires.
    async fn call_until(
        &mut self,
        command: &str,
        finals: &[&str],
        timeout: Duration,
    ) -> Result<Response> {
        self.write_command(command).await?;
        let deadline = Instant::now() + timeout;
        let mut response = Response::new();
        self.blue_led.set_high();
        let result = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.as_ticks() == 0 {
                break Err(Error::TimeoutError);
            }
            let mut buf = [0; AT_BUF_SIZE];
            let read = with_timeout(remaining, self.rx.read_until_idle(&mut buf)).await;
            let len = match read {
                Err(_) => break Err(Error::TimeoutError),
                Ok(Err(_)) => break Err(Error::RadioError),
                Ok(Ok(len)) => len,
            };
            let Ok(text) = core::str::from_utf8(&buf[..len]) else {
                break Err(Error::ParseError);
            };
            for line in text.lines().filter(|l| !l.is_empty()) {
                info!("Read {}", line);
            }
            if response.push_str(text).is_err() {
                break Err(Error::BufferTooSmallError);
            }
            if finals.iter().any(|marker| response.contains(marker)) {
                break Ok(response);
            }
        };
        self.blue_led.set_low();
        result
    }
}

fn push_hex<const N: usize>(out: &mut String<N>, bytes: &[u8]) -> Result<()> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    for byte in bytes {
        out.push(DIGITS[usize::from(byte >> 4)] as char)
            .and_then(|_| out.push(DIGITS[usize::from(byte & 0xf)] as char))
            .map_err(|_| Error::BufferTooSmallError)?;
    }
    Ok(())
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Extracts a received downlink from a send response, e.g.
/// `+MSGHEX: PORT: 2; RX: "1A2B"`.
fn parse_downlink(response: &str) -> Option<Downlink> {
    let rx = response.find("RX: \"")?;
    let hex = &response[rx + 5..];
    let hex = &hex[..hex.find('"')?];

    let port = response.find("PORT: ")?;
    let port = &response[port + 6..];
    let end = port.find(|c: char| !c.is_ascii_digit()).unwrap_or(port.len());
    let port: u8 = port[..end].parse().ok()?;

    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut data = Vec::new();
    for pair in bytes.chunks(2) {
        let byte = (hex_value(pair[0])? << 4) | hex_value(pair[1])?;
        data.push(byte).ok()?;
    }
    Some(Downlink { port, data })
}

impl LoraRadio for LoraE5<'static> {
    async fn start(&mut self) -> Result<()> {
        // The module needs a moment after power-on before it answers.
        for _ in 0..5 {
            match self.call("AT", SHORT_TIMEOUT).await {
                Ok(response) if response.contains("OK") => return Ok(()),
                _ => Timer::after_millis(500).await,
            }
        }
        Err(Error::RadioError)
    }

    async fn set_data_rate(&mut self, data_rate: DataRate) -> Result<()> {
        let command = format!(AT_COMMAND_SIZE; "AT+DR={}", data_rate.0)
            .map_err(|_| Error::BufferTooSmallError)?;
        let response = self.call(&command, CONFIG_TIMEOUT).await?;
        if response.contains("+DR:") {
            Ok(())
        } else {
            Err(Error::RadioError)
        }
    }

    async fn join(&mut self, request: &JoinRequest) -> Result<()> {
        let mode = match request.mode {
            ActivationMode::Otaa => "AT+MODE=LWOTAA",
            ActivationMode::Abp => "AT+MODE=LWABP",
        };
        self.call(mode, CONFIG_TIMEOUT).await?;

        let mut hex: String<32> = String::new();
        push_hex(&mut hex, &request.credentials.dev_eui)?;
        let command = format!(AT_COMMAND_SIZE; "AT+ID=DevEui,\"{}\"", hex.as_str())
            .map_err(|_| Error::BufferTooSmallError)?;
        self.call(&command, CONFIG_TIMEOUT).await?;

        hex.clear();
        push_hex(&mut hex, &request.credentials.join_eui)?;
        let command = format!(AT_COMMAND_SIZE; "AT+ID=AppEui,\"{}\"", hex.as_str())
            .map_err(|_| Error::BufferTooSmallError)?;
        self.call(&command, CONFIG_TIMEOUT).await?;

        hex.clear();
        push_hex(&mut hex, &request.credentials.app_key)?;
        let command = format!(AT_COMMAND_SIZE; "AT+KEY=APPKEY,\"{}\"", hex.as_str())
            .map_err(|_| Error::BufferTooSmallError)?;
        self.call(&command, CONFIG_TIMEOUT).await?;

        let response = self
            .call_until(
                "AT+JOIN",
                &["Network joined", "Join failed", "ERROR"],
                JOIN_TIMEOUT,
            )
            .await?;
        if response.contains("Network joined") {
            Ok(())
        } else {
            Err(Error::JoinError)
        }
    }

    async fn send(&mut self, port: u8, payload: &[u8], kind: MessageKind) -> Result<()> {
        let command =
            format!(AT_COMMAND_SIZE; "AT+PORT={port}").map_err(|_| Error::BufferTooSmallError)?;
        self.call(&command, CONFIG_TIMEOUT).await?;

        let mut hex: String<64> = String::new();
        push_hex(&mut hex, payload)?;
        let prefix = match kind {
            MessageKind::Unconfirmed => "MSGHEX",
            MessageKind::Confirmed => "CMSGHEX",
        };
        let command = format!(AT_COMMAND_SIZE; "AT+{prefix}=\"{}\"", hex.as_str())
            .map_err(|_| Error::BufferTooSmallError)?;
        let response = self.call_until(&command, &["Done", "ERROR"], SEND_TIMEOUT).await?;

        if let Some(downlink) = parse_downlink(&response) {
            if DOWNLINKS.try_send(downlink).is_err() {
                warn!("Downlink channel full, dropping message");
            }
        }

        let acked = kind != MessageKind::Confirmed || response.contains("ACK Received");
        if response.contains("Done") && acked {
            Ok(())
        } else {
            Err(Error::SendError)
        }
    }
}
