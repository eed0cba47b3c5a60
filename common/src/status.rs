use embassy_time::{Duration, Instant};

/// Spacing under which repeated sensor triggers are ignored. The motion
/// sensor is touchy and fires in bursts on a single movement.
pub const TRIGGER_DEBOUNCE: Duration = Duration::from_secs(5);

/// Volatile device status. Mutated only by the event dispatcher; other
/// contexts receive snapshots through the command channel.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    pub joined: bool,
    /// A delayed send is armed and further triggers must not re-arm it.
    pub delayed_pending: bool,
    /// A location fix arrived since the last transmission.
    pub fix_acquired: bool,
    pub msgs_sent: u32,
    /// Consecutive failed sends, reset to 0 by every successful send.
    pub msgs_failed: u32,
    pub msgs_failed_total: u32,
    /// Failed join sessions since the last successful join, reported by the
    /// join worker. Reset to 0 by every successful join.
    pub join_sessions: u16,
    pub last_send: Option<Instant>,
    pub last_send_ok: Option<Instant>,
    pub trigger_events: u32,
    pub last_trigger: Option<Instant>,
    /// Cumulative time the power-gated sensor has been kept on.
    pub sensor_on_total: Duration,
    pub sensor_on_since: Option<Instant>,
}

impl Status {
    /// Registers a sensor trigger. Returns false if the trigger falls into
    /// the debounce window and must be dropped.
    pub fn register_trigger(&mut self, now: Instant) -> bool {
        if self.last_trigger.is_some_and(|t| now - t < TRIGGER_DEBOUNCE) {
            return false;
        }
        self.last_trigger = Some(now);
        self.trigger_events += 1;
        true
    }

    pub fn sensor_enabled(&mut self, now: Instant) {
        if self.sensor_on_since.is_none() {
            self.sensor_on_since = Some(now);
        }
    }

    pub fn sensor_disabled(&mut self, now: Instant) {
        if let Some(since) = self.sensor_on_since.take() {
            self.sensor_on_total += now - since;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trigger_debounce() {
        let mut status = Status::default();
        let t0 = Instant::from_secs(100);
        assert!(status.register_trigger(t0));
        assert!(!status.register_trigger(t0 + Duration::from_secs(4)));
        assert!(status.register_trigger(t0 + Duration::from_secs(6)));
        assert_eq!(status.trigger_events, 2);
    }

    #[test]
    fn sensor_on_time_accumulates() {
        let mut status = Status::default();
        let t0 = Instant::from_secs(10);
        status.sensor_enabled(t0);
        status.sensor_enabled(t0 + Duration::from_secs(1));
        status.sensor_disabled(t0 + Duration::from_secs(30));
        assert_eq!(status.sensor_on_total, Duration::from_secs(30));
        // disable without a matching enable is a no-op
        status.sensor_disabled(t0 + Duration::from_secs(60));
        assert_eq!(status.sensor_on_total, Duration::from_secs(30));
    }
}
