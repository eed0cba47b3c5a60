#[cfg(feature = "defmt")]
use defmt::{error, info, warn};
use embassy_sync::{channel::Channel, signal::Signal};
use embassy_time::{Duration, Instant, Timer};
#[cfg(not(feature = "defmt"))]
use log::{error, info, warn};

use crate::RawMutex;
use crate::config::Config;
use crate::radio::{JoinRequest, LoraRadio, RadioMutex};
use crate::status::Status;

/// Join session requests for the worker. Latest-wins: the worker runs one
/// session at a time and a re-signal while busy just replaces the snapshot.
pub static JOIN_REQUESTS: Signal<RawMutex, JoinRequest> = Signal::new();

/// Session outcomes reported back to the dispatcher.
pub static JOIN_RESULTS: Channel<RawMutex, JoinOutcome, 2> = Channel::new();

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JoinOutcome {
    pub joined: bool,
    /// Failed sessions since the last successful join, after this session.
    pub sessions: u16,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinState {
    #[default]
    NotJoined,
    Joined,
}

impl JoinState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinState::NotJoined => "NOT_JOINED",
            JoinState::Joined => "JOINED",
        }
    }
}

/// Warm-reset collaborator. On hardware [`Reboot::reboot`] does not return.
pub trait Reboot {
    fn reboot(&mut self);
}

/// The join life-cycle state machine, owned by the dispatcher.
///
/// Every transition goes through [`JoinManager::enter`]; `Joined` is only
/// ever entered from a successful session outcome.
#[derive(Default)]
pub struct JoinManager {
    state: JoinState,
    retry_at: Option<Instant>,
}

impl JoinManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    pub fn joined(&self) -> bool {
        self.state == JoinState::Joined
    }

    /// Deadline of the armed join retry timer, if any.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// The single transition function.
    pub fn enter(&mut self, state: JoinState, config: &Config, status: &mut Status, now: Instant) {
        info!("LoRaWAN state set to: {}", state.as_str());
        match state {
            JoinState::NotJoined => {
                status.joined = false;
                self.state = JoinState::NotJoined;
                if !config.auto_join {
                    warn!("Auto-join is disabled, staying unjoined");
                    self.retry_at = None;
                    return;
                }
                info!("Join retry timer armed for {} s", config.join_retry_interval);
                self.retry_at = Some(now + config.join_retry_duration());
                JOIN_REQUESTS.signal(JoinRequest::from_config(config));
            }
            JoinState::Joined => {
                status.joined = true;
                status.join_sessions = 0;
                self.state = JoinState::Joined;
                self.retry_at = None;
            }
        }
    }

    /// Handles the expiry of the join retry timer: if the worker has not
    /// joined in the meantime, re-enter `NotJoined` to re-arm and re-signal.
    pub fn on_retry_expired(&mut self, config: &Config, status: &mut Status, now: Instant) {
        self.retry_at = None;
        if !self.joined() {
            self.enter(JoinState::NotJoined, config, status, now);
        }
    }

    /// Folds a session outcome from the worker into the state machine.
    pub fn on_outcome(
        &mut self,
        outcome: JoinOutcome,
        config: &Config,
        status: &mut Status,
        now: Instant,
    ) {
        status.join_sessions = outcome.sessions;
        if outcome.joined {
            self.enter(JoinState::Joined, config, status, now);
        } else {
            info!("Join session failed, {} sessions since last join", outcome.sessions);
        }
    }
}

/// The dedicated execution context for the blocking join handshake.
///
/// Owns the session counter: it is the only writer, the dispatcher learns
/// its value from [`JoinOutcome`]s. Escalates to a delayed warm reboot once
/// the counter exceeds the configured maximum.
pub struct JoinWorker<R: LoraRadio + 'static, B: Reboot> {
    radio: &'static RadioMutex<R>,
    reboot: B,
    grace: Duration,
    sessions: u16,
}

impl<R: LoraRadio, B: Reboot> JoinWorker<R, B> {
    /// `grace` is how long in-flight operations get to settle before the
    /// reboot escalation; the firmware passes 30 seconds.
    pub fn new(radio: &'static RadioMutex<R>, reboot: B, grace: Duration) -> Self {
        Self {
            radio,
            reboot,
            grace,
            sessions: 0,
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let request = JOIN_REQUESTS.wait().await;
            let joined = self.session(&request).await;
            if joined {
                self.sessions = 0;
            } else {
                self.sessions += 1;
            }
            JOIN_RESULTS
                .send(JoinOutcome {
                    joined,
                    sessions: self.sessions,
                })
                .await;

            if self.sessions > request.max_sessions {
                error!(
                    "{} failed join sessions, rebooting in {} s",
                    self.sessions,
                    self.grace.as_secs()
                );
                Timer::after(self.grace).await;
                self.reboot.reboot();
            }
        }
    }

    /// One join session: up to `request.attempts` handshakes with the
    /// configured delay between failed attempts.
    async fn session(&mut self, request: &JoinRequest) -> bool {
        for attempt in 1..=request.attempts {
            info!("Joining network over OTAA. Attempt: {}", attempt);
            let result = {
                let mut radio = self.radio.lock().await;
                match radio.as_mut() {
                    Some(radio) => radio.join(request).await,
                    None => Err(crate::error::Error::RadioError),
                }
            };
            match result {
                Ok(()) => return true,
                Err(err) => error!("Join attempt failed: {}", err),
            }
            if attempt < request.attempts {
                Timer::after_secs(u64::from(request.attempt_delay)).await;
            }
        }
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn auto_join_config() -> Config {
        Config {
            auto_join: true,
            ..Default::default()
        }
    }

    // One test to keep the global JOIN_REQUESTS signal single-threaded.
    #[test]
    fn state_machine_transitions() {
        let mut manager = JoinManager::new();
        let mut status = Status::default();
        let now = Instant::from_secs(5);

        // Auto-join disabled: passively unjoined, nothing armed.
        manager.enter(JoinState::NotJoined, &Config::default(), &mut status, now);
        assert_eq!(manager.state(), JoinState::NotJoined);
        assert!(manager.retry_deadline().is_none());
        assert!(!JOIN_REQUESTS.signaled());

        // Auto-join enabled: retry timer armed, worker signaled.
        let config = auto_join_config();
        manager.enter(JoinState::NotJoined, &config, &mut status, now);
        assert_eq!(
            manager.retry_deadline(),
            Some(now + config.join_retry_duration())
        );
        assert!(JOIN_REQUESTS.try_take().is_some());

        // Failed session outcome: still not joined, counter visible.
        let failed = JoinOutcome {
            joined: false,
            sessions: 3,
        };
        manager.on_outcome(failed, &config, &mut status, now + Duration::from_secs(7));
        assert_eq!(manager.state(), JoinState::NotJoined);
        assert!(!status.joined);
        assert_eq!(status.join_sessions, 3);

        // Retry expiry while not joined re-arms and re-signals.
        let later = now + config.join_retry_duration();
        manager.on_retry_expired(&config, &mut status, later);
        assert_eq!(
            manager.retry_deadline(),
            Some(later + config.join_retry_duration())
        );
        assert!(JOIN_REQUESTS.try_take().is_some());

        // Successful outcome enters Joined, resets the session counter and
        // cancels the retry timer.
        let ok = JoinOutcome {
            joined: true,
            sessions: 0,
        };
        manager.on_outcome(ok, &config, &mut status, later + Duration::from_secs(2));
        assert_eq!(manager.state(), JoinState::Joined);
        assert!(status.joined);
        assert_eq!(status.join_sessions, 0);
        assert!(manager.retry_deadline().is_none());

        // Retry expiry after a successful join is a no-op.
        manager.on_retry_expired(&config, &mut status, later + Duration::from_secs(3));
        assert_eq!(manager.state(), JoinState::Joined);
        assert!(!JOIN_REQUESTS.signaled());
    }
}
