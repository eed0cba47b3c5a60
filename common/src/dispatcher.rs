//! The single consumer context of the control loop.
//!
//! The dispatcher owns `Config`, `Status` and all timers; event producers
//! only touch the queue, the join worker only the request signal and the
//! outcome channel. One loop multiplexes the queue, the outcome channel, the
//! command channel and the earliest armed deadline, and drains the queue to
//! empty on every wake.

#[cfg(feature = "defmt")]
use defmt::{debug, error, info, warn};
use embassy_futures::select::{Either4, select4};
use embassy_sync::{channel::Channel, signal::Signal};
use embassy_time::{Duration, Instant, Timer};
#[cfg(not(feature = "defmt"))]
use log::{debug, error, info, warn};

use crate::RawMutex;
use crate::config::Config;
use crate::error::Error;
use crate::event::{Event, EventQueue};
use crate::join::{JOIN_RESULTS, JoinManager, JoinState};
use crate::payload::{AcquisitionGate, PayloadBuilder};
use crate::radio::{LoraRadio, RadioMutex};
use crate::scheduler::{SendDecision, evaluate_send, message_kind, record_attempt};
use crate::status::Status;

/// Wake period while no deadline is armed.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// Scheduler-facing requests from outside the control loop (the debug shell,
/// downlink handlers). The shell is a pure client: it mutates configuration
/// and reads state only through these.
pub enum Command {
    /// Replace the configuration and re-arm the periodic timer.
    ApplyConfig(Config),
    /// Re-arm the periodic timer from the current configuration.
    UpdatePeriodic,
    /// Report the remaining time of the periodic timer on
    /// [`PERIODIC_REMAINING`].
    PeriodicRemaining,
    /// Report a status snapshot on [`STATUS_SNAPSHOTS`].
    ReportStatus,
}

pub static COMMANDS: Channel<RawMutex, Command, 4> = Channel::new();
pub static STATUS_SNAPSHOTS: Signal<RawMutex, Status> = Signal::new();
pub static PERIODIC_REMAINING: Signal<RawMutex, Option<Duration>> = Signal::new();

#[derive(Default)]
struct Deadlines {
    periodic: Option<Instant>,
    delayed: Option<Instant>,
    acquisition_off: Option<Instant>,
}

fn due(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|at| at <= now)
}

pub struct Dispatcher<R: LoraRadio + 'static, P: PayloadBuilder, G: AcquisitionGate> {
    radio: &'static RadioMutex<R>,
    queue: &'static EventQueue,
    builder: P,
    gate: G,
    config: Config,
    status: Status,
    join: JoinManager,
    deadlines: Deadlines,
}

impl<R: LoraRadio, P: PayloadBuilder, G: AcquisitionGate> Dispatcher<R, P, G> {
    pub fn new(
        radio: &'static RadioMutex<R>,
        queue: &'static EventQueue,
        builder: P,
        gate: G,
        config: Config,
    ) -> Self {
        Self {
            radio,
            queue,
            builder,
            gate,
            config,
            status: Status::default(),
            join: JoinManager::new(),
            deadlines: Deadlines::default(),
        }
    }

    /// Brings the radio up, arms the periodic timer and makes the initial
    /// join request.
    pub async fn start(&mut self) -> crate::Result<()> {
        {
            let mut radio = self.radio.lock().await;
            let radio = radio.as_mut().ok_or(Error::RadioError)?;
            radio.start().await?;
            radio.set_data_rate(self.config.data_rate).await?;
        }
        let now = Instant::now();
        self.arm_periodic(now);
        self.join.enter(JoinState::NotJoined, &self.config, &mut self.status, now);
        Ok(())
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let timer = match self.next_deadline() {
                Some(at) => Timer::at(at),
                None => Timer::after(IDLE_WAKE),
            };
            match select4(
                self.queue.next(),
                JOIN_RESULTS.receive(),
                COMMANDS.receive(),
                timer,
            )
            .await
            {
                Either4::First(event) => {
                    // Bursts are drained completely before re-waiting.
                    self.handle_event(event).await;
                    while let Some(event) = self.queue.try_next() {
                        self.handle_event(event).await;
                    }
                }
                Either4::Second(outcome) => {
                    self.join
                        .on_outcome(outcome, &self.config, &mut self.status, Instant::now());
                }
                Either4::Third(command) => self.execute_command(command),
                Either4::Fourth(()) => self.fire_due_deadlines(Instant::now()),
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.deadlines.periodic,
            self.deadlines.delayed,
            self.deadlines.acquisition_off,
            self.join.retry_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Expired deadlines turn into events; timer contexts are producers, the
    /// handling happens on the queue like everything else.
    fn fire_due_deadlines(&mut self, now: Instant) {
        if due(self.deadlines.periodic, now) {
            // The periodic timer's own expiry re-arms it.
            self.arm_periodic(now);
            self.queue.push(Event::PeriodicTimer);
        }
        if due(self.deadlines.delayed, now) {
            self.deadlines.delayed = None;
            self.status.delayed_pending = false;
            self.queue.push(if P::GATED {
                Event::AcquisitionEnable
            } else {
                Event::DataReady
            });
        }
        if due(self.deadlines.acquisition_off, now) {
            self.deadlines.acquisition_off = None;
            self.queue.push(Event::AcquisitionDisable);
        }
        if due(self.join.retry_deadline(), now) {
            self.join.on_retry_expired(&self.config, &mut self.status, now);
        }
    }

    async fn handle_event(&mut self, event: Event) {
        debug!("Event {}", event.as_str());
        let now = Instant::now();
        match event {
            Event::PeriodicTimer | Event::ButtonPressed => self.schedule_send(now),
            Event::SensorTrigger => {
                if self.status.register_trigger(now) {
                    self.schedule_send(now);
                }
            }
            Event::AcquisitionEnable => {
                self.gate.set_enabled(true);
                self.status.sensor_enabled(now);
                info!(
                    "Acquisition window open for {} s",
                    self.config.max_sensor_on_time
                );
                self.deadlines.acquisition_off = Some(now + self.config.max_sensor_on_duration());
            }
            Event::AcquisitionDisable => {
                self.gate.set_enabled(false);
                self.status.sensor_disabled(now);
                self.deadlines.acquisition_off = None;
                // No fix within the whole acquisition window: send the other
                // telemetry with old position data if available.
                if !self.status.fix_acquired {
                    self.transmit().await;
                }
            }
            Event::LocationFix => {
                self.status.fix_acquired = true;
                self.gate.set_enabled(false);
                self.status.sensor_disabled(now);
                self.deadlines.acquisition_off = None;
                self.transmit().await;
            }
            Event::DataReady => self.transmit().await,
        }
    }

    fn schedule_send(&mut self, now: Instant) {
        match evaluate_send(&self.config, &self.status, P::GATED, now) {
            SendDecision::Blocked(reason) => warn!("Send blocked: {}", reason.as_str()),
            SendDecision::Acquire => self.queue.push(Event::AcquisitionEnable),
            SendDecision::SendNow => self.queue.push(Event::DataReady),
            SendDecision::Delay(wait) => {
                info!("Delayed send in {} ms", wait.as_millis());
                self.deadlines.delayed = Some(now + wait);
                self.status.delayed_pending = true;
            }
        }
    }

    async fn transmit(&mut self) {
        if !self.status.joined {
            warn!("Not joined");
            return;
        }
        let payload = self.builder.build(self.status.fix_acquired);
        let kind = message_kind(&self.config, &self.status);
        let result = {
            let mut radio = self.radio.lock().await;
            match radio.as_mut() {
                Some(radio) => radio.send(self.config.app_port, &payload, kind).await,
                None => Err(Error::RadioError),
            }
        };
        let now = Instant::now();
        self.status.fix_acquired = false;
        let sent_ok = match result {
            Ok(()) => {
                info!("Data sent!");
                true
            }
            Err(err) => {
                error!("Send failed: {}", err);
                false
            }
        };
        if record_attempt(&self.config, &mut self.status, sent_ok, now) {
            error!("Too many failed msgs: Try to re-join.");
            self.join.enter(JoinState::NotJoined, &self.config, &mut self.status, now);
        }
    }

    fn arm_periodic(&mut self, now: Instant) {
        self.deadlines.periodic = match self.config.send_interval_duration() {
            Some(interval) => {
                info!("Send interval timer armed for {} s", self.config.send_interval);
                Some(now + interval)
            }
            None => None,
        };
    }

    fn execute_command(&mut self, command: Command) {
        match command {
            Command::ApplyConfig(config) => {
                self.config = config;
                self.arm_periodic(Instant::now());
            }
            Command::UpdatePeriodic => self.arm_periodic(Instant::now()),
            Command::PeriodicRemaining => {
                let remaining = self
                    .deadlines
                    .periodic
                    .map(|at| at.saturating_duration_since(Instant::now()));
                PERIODIC_REMAINING.signal(remaining);
            }
            Command::ReportStatus => STATUS_SNAPSHOTS.signal(self.status),
        }
    }
}
