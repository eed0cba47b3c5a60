#[cfg(feature = "defmt")]
use defmt::warn;
use embassy_sync::channel::Channel;
#[cfg(not(feature = "defmt"))]
use log::warn;

use crate::RawMutex;

/// Capacity of the event queue. Sized for a short burst of timer and trigger
/// events; running it full in normal operation is a sizing defect.
pub const EVENT_QUEUE_SIZE: usize = 10;

/// The closed set of application events.
///
/// Events carry no payload. Everything an event handler needs is read from
/// `Config`/`Status` at handling time, not captured at production time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The periodic send interval elapsed.
    PeriodicTimer,
    /// The motion sensor fired.
    SensorTrigger,
    /// A location fix was acquired.
    LocationFix,
    /// Start position acquisition before the next transmission.
    AcquisitionEnable,
    /// Stop position acquisition, with or without a fix.
    AcquisitionDisable,
    /// The user button was pressed.
    ButtonPressed,
    /// Telemetry is ready, transmit now.
    DataReady,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PeriodicTimer => "TIMER",
            Event::SensorTrigger => "TRIGGER",
            Event::LocationFix => "LOCATION_FIX",
            Event::AcquisitionEnable => "ACQ_ENABLE",
            Event::AcquisitionDisable => "ACQ_DISABLE",
            Event::ButtonPressed => "BUTTON",
            Event::DataReady => "DATA_READY",
        }
    }
}

/// Bounded FIFO of pending events.
///
/// The underlying channel is the bounded pool, the FIFO and the counting
/// wake signal in one: `next().await` wakes once per queued event, so the
/// dispatcher cannot sleep with a non-empty queue.
pub struct EventQueue {
    channel: Channel<RawMutex, Event, EVENT_QUEUE_SIZE>,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueues an event. Never blocks, safe to call from producer contexts
    /// (timer expiries, GPIO and sensor callbacks).
    ///
    /// A full queue means the dispatcher stopped draining: all pending
    /// events are flushed and the push is retried once. If even that fails
    /// the queue is corrupted and the only recovery is a reset.
    pub fn push(&self, event: Event) {
        if self.channel.try_send(event).is_ok() {
            return;
        }
        warn!("Event queue full, flushing {} events", self.channel.len());
        self.flush();
        if self.channel.try_send(event).is_err() {
            panic!("event queue corrupted");
        }
    }

    /// Waits for the oldest pending event.
    pub async fn next(&self) -> Event {
        self.channel.receive().await
    }

    /// Pops the oldest pending event without waiting.
    pub fn try_next(&self) -> Option<Event> {
        self.channel.try_receive().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    fn flush(&self) {
        while self.channel.try_receive().is_ok() {}
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
