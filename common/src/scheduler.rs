//! Send-scheduling policy: when a telemetry transmission is allowed, which
//! delivery kind it uses and what its outcome means for the join state.
//!
//! Pure functions over [`Config`]/[`Status`] and an explicit `now`; the
//! dispatcher owns all the state and the timers.

use embassy_time::{Duration, Instant};

use crate::config::{CONFIRMED_PROBE_PERIOD, Config};
use crate::radio::MessageKind;
use crate::status::Status;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockReason {
    NotJoined,
    PeriodicDisabled,
    DelayPending,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::NotJoined => "not joined",
            BlockReason::PeriodicDisabled => "periodic send is disabled",
            BlockReason::DelayPending => "delayed send already pending",
        }
    }
}

/// What to do with a send request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendDecision {
    /// Start position acquisition, the transmission follows a fix or the
    /// acquisition bound.
    Acquire,
    /// Transmit immediately.
    SendNow,
    /// Minimum spacing not yet elapsed, wait this long first.
    Delay(Duration),
    Blocked(BlockReason),
}

/// The eligibility gate, checked before any transmission attempt.
///
/// `gated` selects the sensor-gated path: eligible sends become acquisition
/// requests instead of immediate transmissions.
pub fn evaluate_send(config: &Config, status: &Status, gated: bool, now: Instant) -> SendDecision {
    if !status.joined {
        return SendDecision::Blocked(BlockReason::NotJoined);
    }
    if config.send_interval == 0 {
        return SendDecision::Blocked(BlockReason::PeriodicDisabled);
    }
    if status.delayed_pending {
        return SendDecision::Blocked(BlockReason::DelayPending);
    }

    let min_delay = config.send_min_delay_duration();
    let elapsed = status.last_send.map(|at| now - at);
    match elapsed {
        Some(elapsed) if elapsed <= min_delay => {
            // Remaining wait is min_delay - elapsed, by construction within
            // [0, min_delay].
            SendDecision::Delay(min_delay - elapsed)
        }
        _ if gated => SendDecision::Acquire,
        _ => SendDecision::SendNow,
    }
}

/// Delivery kind for the next transmission. With an unconfirmed default,
/// every [`CONFIRMED_PROBE_PERIOD`]th send escalates to confirmed as an
/// active connectivity probe.
pub fn message_kind(config: &Config, status: &Status) -> MessageKind {
    if config.confirmed_msgs || status.msgs_sent % CONFIRMED_PROBE_PERIOD == 0 {
        MessageKind::Confirmed
    } else {
        MessageKind::Unconfirmed
    }
}

/// Records the outcome of a transmission attempt and evaluates the forced
/// re-join thresholds.
///
/// Returns true if the device must fall back to `NOT_JOINED`: consecutive
/// failures above `max_failed_msgs`, or longer than `max_inactive_window`
/// since the last successful send (since boot if nothing ever succeeded).
pub fn record_attempt(config: &Config, status: &mut Status, sent_ok: bool, now: Instant) -> bool {
    if sent_ok {
        status.msgs_sent += 1;
        status.msgs_failed = 0;
        status.last_send_ok = Some(now);
    } else {
        status.msgs_failed += 1;
        status.msgs_failed_total += 1;
    }
    status.last_send = Some(now);

    let since_ok = now - status.last_send_ok.unwrap_or(Instant::from_ticks(0));
    status.msgs_failed > config.max_failed_msgs || since_ok > config.max_inactive_duration()
}

#[cfg(test)]
mod test {
    use super::*;

    fn joined_config() -> (Config, Status) {
        let config = Config {
            send_interval: 60,
            ..Default::default()
        };
        let status = Status {
            joined: true,
            ..Default::default()
        };
        (config, status)
    }

    #[test]
    fn blocked_when_not_joined() {
        let (config, mut status) = joined_config();
        status.joined = false;
        let decision = evaluate_send(&config, &status, false, Instant::from_secs(100));
        assert_eq!(decision, SendDecision::Blocked(BlockReason::NotJoined));
    }

    #[test]
    fn zero_interval_disables_periodic_sending() {
        let (mut config, status) = joined_config();
        config.send_interval = 0;
        let decision = evaluate_send(&config, &status, false, Instant::from_secs(100));
        assert_eq!(decision, SendDecision::Blocked(BlockReason::PeriodicDisabled));
    }

    #[test]
    fn pending_delayed_send_blocks_rearming() {
        let (config, mut status) = joined_config();
        status.delayed_pending = true;
        let decision = evaluate_send(&config, &status, true, Instant::from_secs(100));
        assert_eq!(decision, SendDecision::Blocked(BlockReason::DelayPending));
    }

    #[test]
    fn first_send_goes_out_immediately() {
        let (config, status) = joined_config();
        let now = Instant::from_secs(100);
        assert_eq!(evaluate_send(&config, &status, false, now), SendDecision::SendNow);
        assert_eq!(evaluate_send(&config, &status, true, now), SendDecision::Acquire);
    }

    #[test]
    fn send_inside_min_spacing_is_delayed_by_the_remaining_wait() {
        let (config, mut status) = joined_config();
        let last = Instant::from_secs(100);
        status.last_send = Some(last);
        // 12 s of the 30 s spacing elapsed, 18 s remain
        let decision = evaluate_send(&config, &status, true, last + Duration::from_secs(12));
        assert_eq!(decision, SendDecision::Delay(Duration::from_secs(18)));

        let decision = evaluate_send(&config, &status, true, last + Duration::from_secs(31));
        assert_eq!(decision, SendDecision::Acquire);
    }

    #[test]
    fn confirmed_probe_every_tenth_send() {
        let (config, mut status) = joined_config();
        let mut confirmed_at = heapless::Vec::<u32, 4>::new();
        let mut now = Instant::from_secs(1000);
        for nth in 1..=21u32 {
            if message_kind(&config, &status) == MessageKind::Confirmed {
                let _ = confirmed_at.push(nth);
            }
            record_attempt(&config, &mut status, true, now);
            now += Duration::from_secs(60);
        }
        assert_eq!(confirmed_at.as_slice(), &[1, 11, 21]);
    }

    #[test]
    fn confirmed_default_is_always_confirmed() {
        let (mut config, mut status) = joined_config();
        config.confirmed_msgs = true;
        status.msgs_sent = 7;
        assert_eq!(message_kind(&config, &status), MessageKind::Confirmed);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let (config, mut status) = joined_config();
        let mut now = Instant::from_secs(100);
        for _ in 0..3 {
            record_attempt(&config, &mut status, false, now);
            now += Duration::from_secs(60);
        }
        assert_eq!(status.msgs_failed, 3);
        assert_eq!(status.msgs_failed_total, 3);

        record_attempt(&config, &mut status, true, now);
        assert_eq!(status.msgs_failed, 0);
        assert_eq!(status.msgs_failed_total, 3);
        assert_eq!(status.msgs_sent, 1);
        assert_eq!(status.last_send_ok, Some(now));
    }

    #[test]
    fn rejoin_forced_above_max_consecutive_failures() {
        let (config, mut status) = joined_config();
        let now = Instant::from_secs(100);
        status.last_send_ok = Some(now);
        status.msgs_failed = config.max_failed_msgs - 1;

        // 120th consecutive failure reaches the maximum, still tolerated
        assert!(!record_attempt(&config, &mut status, false, now));
        assert_eq!(status.msgs_failed, config.max_failed_msgs);
        // the 121st exceeds it
        assert!(record_attempt(&config, &mut status, false, now));
    }

    #[test]
    fn rejoin_forced_after_inactivity_window() {
        let (config, mut status) = joined_config();
        let t0 = Instant::from_secs(100);
        status.last_send_ok = Some(t0);

        let window = config.max_inactive_duration();
        assert!(!record_attempt(&config, &mut status, false, t0 + window));
        assert!(record_attempt(
            &config,
            &mut status,
            false,
            t0 + window + Duration::from_secs(1)
        ));
    }

    #[test]
    fn inactivity_counts_from_boot_before_any_success() {
        let (config, mut status) = joined_config();
        let late = Instant::from_secs(u64::from(config.max_inactive_window) + 1);
        assert!(record_attempt(&config, &mut status, false, late));
    }
}
