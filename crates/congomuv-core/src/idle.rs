//! Idle timeout: warn, count down, then force a logout.
//!
//! [`IdleTimer`] is the state machine, driven by explicit instants so it can
//! be tested without waiting. [`IdleMonitor`] runs it on a tokio task with
//! real timers and an activity channel.
//!
//! ```text
//!            warn_after elapsed           seconds_left == 0
//!  Active ─────────────────────▶ Warning ─────────────────────▶ Expired
//!    ▲                             │                              ▲
//!    └─────── any activity ────────┘                              │
//!                       failsafe_after elapsed (from any state) ──┘
//! ```
//!
//! The fail-safe deadline is independent of countdown bookkeeping. It
//! recovers from ticks that never arrive, e.g. while a tab is backgrounded.

use std::future::pending;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace};
use utoipa::ToSchema;

use crate::session::MarkerStore;

/// Default inactivity window before a session is ended.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Default length of the on-screen countdown.
pub const DEFAULT_WARN_DURATION: Duration = Duration::from_secs(15);

/// Default delay of the fail-safe past the idle timeout.
pub const DEFAULT_FAILSAFE_GRACE: Duration = Duration::from_secs(1);

const TICK: Duration = Duration::from_secs(1);

/// User activity that resets the idle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Pointer movement.
    Pointer,
    /// Key press.
    Key,
    /// Mouse click.
    Click,
    /// Touch start.
    Touch,
    /// Page scroll.
    Scroll,
    /// Tab became visible again.
    VisibilityChange,
}

/// Idle timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSettings {
    /// Total inactivity before the session ends.
    pub idle_timeout: Duration,
    /// Length of the warning countdown, ending at `idle_timeout`.
    pub warn_duration: Duration,
    /// How long after `idle_timeout` the fail-safe fires.
    pub failsafe_grace: Duration,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            warn_duration: DEFAULT_WARN_DURATION,
            failsafe_grace: DEFAULT_FAILSAFE_GRACE,
        }
    }
}

impl IdleSettings {
    /// Inactivity before the warning is shown.
    #[must_use]
    pub fn warn_after(&self) -> Duration {
        self.idle_timeout.saturating_sub(self.warn_duration)
    }

    /// Inactivity before the fail-safe forces expiry.
    #[must_use]
    pub fn failsafe_after(&self) -> Duration {
        self.idle_timeout + self.failsafe_grace
    }

    /// Countdown start value in whole seconds, at least 1.
    #[must_use]
    pub fn warn_seconds(&self) -> u32 {
        u32::try_from(self.warn_duration.as_secs())
            .unwrap_or(u32::MAX)
            .max(1)
    }
}

/// Current phase of the idle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum IdlePhase {
    /// User is active, or the timer is disarmed.
    Active,
    /// Warning shown, counting down.
    Warning {
        /// Seconds until expiry.
        seconds_left: u32,
    },
    /// Session ended for inactivity.
    Expired,
}

/// Why the timer expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryCause {
    /// The countdown reached zero.
    Countdown,
    /// The fail-safe deadline passed.
    Failsafe,
}

/// A state change reported by the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdleTransition {
    /// Active → Warning.
    WarningShown {
        /// Countdown start value.
        seconds_left: u32,
    },
    /// One countdown tick.
    Countdown {
        /// Seconds remaining after the tick.
        seconds_left: u32,
    },
    /// Warning → Active after activity.
    Resumed,
    /// → Expired.
    Expired(ExpiryCause),
}

impl IdleTransition {
    /// Returns `true` for [`IdleTransition::Expired`].
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

/// Snapshot of the timer for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IdleStatus {
    /// Current phase.
    pub phase: IdlePhase,
    /// Whether the warning dialog is visible.
    pub warn_visible: bool,
    /// Seconds left on the countdown, 0 outside Warning.
    pub seconds_left: u32,
    /// Whether the timer is running at all.
    pub armed: bool,
}

/// The idle state machine.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    settings: IdleSettings,
    phase: IdlePhase,
    last_activity: Instant,
    armed: bool,
}

impl IdleTimer {
    /// Creates a disarmed timer.
    #[must_use]
    pub const fn new(settings: IdleSettings, now: Instant) -> Self {
        Self {
            settings,
            phase: IdlePhase::Active,
            last_activity: now,
            armed: false,
        }
    }

    /// Starts timing from `now`. Has no effect once expired.
    pub fn arm(&mut self, now: Instant) {
        if self.phase == IdlePhase::Expired {
            return;
        }
        self.armed = true;
        self.phase = IdlePhase::Active;
        self.last_activity = now;
    }

    /// Stops timing and hides any warning.
    pub fn disarm(&mut self) {
        self.armed = false;
        if self.phase != IdlePhase::Expired {
            self.phase = IdlePhase::Active;
        }
    }

    /// Records user activity.
    ///
    /// Resets the inactivity window and cancels a running countdown.
    pub fn record_activity(&mut self, now: Instant) -> Option<IdleTransition> {
        match self.phase {
            IdlePhase::Expired => None,
            IdlePhase::Active => {
                self.last_activity = now;
                None
            }
            IdlePhase::Warning { .. } => {
                self.last_activity = now;
                self.phase = IdlePhase::Active;
                Some(IdleTransition::Resumed)
            }
        }
    }

    /// When the warning timer should fire, if it is pending.
    #[must_use]
    pub fn warn_deadline(&self) -> Option<Instant> {
        (self.armed && self.phase == IdlePhase::Active)
            .then(|| self.last_activity + self.settings.warn_after())
    }

    /// When the fail-safe should fire, if it is pending.
    #[must_use]
    pub fn failsafe_deadline(&self) -> Option<Instant> {
        (self.armed && self.phase != IdlePhase::Expired)
            .then(|| self.last_activity + self.settings.failsafe_after())
    }

    /// Handles the warning timer firing.
    ///
    /// Without an auth token the user has already signed out elsewhere: the
    /// timer disarms itself and nothing is shown.
    pub fn on_warn_timer(&mut self, now: Instant, token_present: bool) -> Option<IdleTransition> {
        if !token_present {
            self.disarm();
            return None;
        }
        let deadline = self.warn_deadline()?;
        if now < deadline {
            return None;
        }
        let seconds_left = self.settings.warn_seconds();
        self.phase = IdlePhase::Warning { seconds_left };
        Some(IdleTransition::WarningShown { seconds_left })
    }

    /// Handles one countdown tick.
    pub fn on_tick(&mut self) -> Option<IdleTransition> {
        let IdlePhase::Warning { seconds_left } = self.phase else {
            return None;
        };
        let seconds_left = seconds_left.saturating_sub(1);
        if seconds_left == 0 {
            self.phase = IdlePhase::Expired;
            self.armed = false;
            Some(IdleTransition::Expired(ExpiryCause::Countdown))
        } else {
            self.phase = IdlePhase::Warning { seconds_left };
            Some(IdleTransition::Countdown { seconds_left })
        }
    }

    /// Handles the fail-safe firing.
    pub fn on_failsafe(&mut self, now: Instant, token_present: bool) -> Option<IdleTransition> {
        if !token_present {
            self.disarm();
            return None;
        }
        let deadline = self.failsafe_deadline()?;
        if now < deadline {
            return None;
        }
        self.phase = IdlePhase::Expired;
        self.armed = false;
        Some(IdleTransition::Expired(ExpiryCause::Failsafe))
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> IdlePhase {
        self.phase
    }

    /// Returns `true` once expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.phase == IdlePhase::Expired
    }

    /// Display snapshot.
    #[must_use]
    pub const fn status(&self) -> IdleStatus {
        let (warn_visible, seconds_left) = match self.phase {
            IdlePhase::Warning { seconds_left } => (true, seconds_left),
            _ => (false, 0),
        };
        IdleStatus {
            phase: self.phase,
            warn_visible,
            seconds_left,
            armed: self.armed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum IdleCommand {
    Activity(ActivityKind),
    Reset,
    Arm,
    Disarm,
}

/// Runs an [`IdleTimer`] on a tokio task.
///
/// Dropping the monitor aborts the task, which releases every timer it
/// holds. On expiry the monitor clears the auth markers itself before
/// reporting [`IdleTransition::Expired`]; the host is expected to finish the
/// logout (hash to `/`, reload).
#[derive(Debug)]
pub struct IdleMonitor {
    commands: mpsc::UnboundedSender<IdleCommand>,
    status: watch::Receiver<IdleStatus>,
    task: JoinHandle<()>,
}

impl IdleMonitor {
    /// Spawns the monitor task. Must be called inside a tokio runtime.
    ///
    /// The timer arms immediately if `markers` holds an auth token.
    #[must_use]
    pub fn spawn(
        settings: IdleSettings,
        markers: MarkerStore,
    ) -> (Self, mpsc::UnboundedReceiver<IdleTransition>) {
        let mut timer = IdleTimer::new(settings, Instant::now());
        if markers.has_token() {
            timer.arm(Instant::now());
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (transition_tx, transition_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(timer.status());

        let task = tokio::spawn(run_monitor(
            timer,
            markers,
            command_rx,
            transition_tx,
            status_tx,
        ));

        (
            Self {
                commands: command_tx,
                status: status_rx,
                task,
            },
            transition_rx,
        )
    }

    /// Forwards user activity. Returns `false` if the task has stopped.
    pub fn record_activity(&self, kind: ActivityKind) -> bool {
        self.commands.send(IdleCommand::Activity(kind)).is_ok()
    }

    /// Resets the timer without a user event, e.g. from the control channel.
    pub fn reset(&self) -> bool {
        self.commands.send(IdleCommand::Reset).is_ok()
    }

    /// Starts timing from now.
    pub fn arm(&self) -> bool {
        self.commands.send(IdleCommand::Arm).is_ok()
    }

    /// Stops timing.
    pub fn disarm(&self) -> bool {
        self.commands.send(IdleCommand::Disarm).is_ok()
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> IdleStatus {
        *self.status.borrow()
    }

    /// Returns `true` once the task has exited (expired or aborted).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn next_tick(countdown: &mut Option<Interval>) {
    match countdown {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn run_monitor(
    mut timer: IdleTimer,
    markers: MarkerStore,
    mut commands: mpsc::UnboundedReceiver<IdleCommand>,
    transitions: mpsc::UnboundedSender<IdleTransition>,
    status: watch::Sender<IdleStatus>,
) {
    let mut countdown: Option<Interval> = None;

    loop {
        let warn_at = timer.warn_deadline();
        let failsafe_at = timer.failsafe_deadline();

        let transition = tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("Idle monitor handle dropped, stopping");
                    break;
                };
                let now = Instant::now();
                match command {
                    IdleCommand::Activity(kind) => {
                        trace!(?kind, "Activity");
                        timer.record_activity(now)
                    }
                    IdleCommand::Reset => {
                        debug!("Idle reset requested");
                        timer.record_activity(now)
                    }
                    IdleCommand::Arm => {
                        timer.arm(now);
                        None
                    }
                    IdleCommand::Disarm => {
                        timer.disarm();
                        None
                    }
                }
            }
            () = sleep_until_opt(warn_at) => timer.on_warn_timer(Instant::now(), markers.has_token()),
            () = next_tick(&mut countdown) => timer.on_tick(),
            () = sleep_until_opt(failsafe_at) => timer.on_failsafe(Instant::now(), markers.has_token()),
        };

        match timer.phase() {
            IdlePhase::Warning { .. } => {
                if countdown.is_none() {
                    let mut interval = interval_at(Instant::now() + TICK, TICK);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    countdown = Some(interval);
                }
            }
            IdlePhase::Active | IdlePhase::Expired => countdown = None,
        }

        status.send_replace(timer.status());

        if let Some(transition) = transition {
            if let IdleTransition::Expired(cause) = transition {
                info!(?cause, "Session idle timeout reached, clearing auth markers");
                markers.clear();
            }
            if transitions.send(transition).is_err() {
                debug!("Idle transition receiver dropped");
            }
            if transition.is_expired() {
                break;
            }
        }
    }
}
