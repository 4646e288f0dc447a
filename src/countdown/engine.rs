use std::sync::{Mutex, PoisonError};

use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

use crate::countdown::config::{CountdownConfig, ModeSpec, Thresholds};
use crate::countdown::resolver::TargetResolver;
use crate::time_source::TimeSource;

pub const DEFAULT_DISPLAY_TZ: Tz = chrono_tz::Europe::Oslo;
pub const DEFAULT_JITTER_TOLERANCE_MS: i64 = 250;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub display_tz: Tz,
    pub jitter_tolerance_ms: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            display_tz: DEFAULT_DISPLAY_TZ,
            jitter_tolerance_ms: DEFAULT_JITTER_TOLERANCE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Countdown,
    Overrun,
    Ended,
    Clock,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warn,
    Alert,
    Over,
    Ended,
    Clock,
}

/// Display state for one poll, serialized verbatim for clients.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct TickResult {
    pub now_ms: i64,
    pub target_ms: i64,
    pub target_hhmm: String,
    pub display_ms: i64,
    pub signed_display_ms: i64,
    pub state: Phase,
    pub mode: Severity,
    pub blink: bool,
    pub warn_ms: i64,
    pub alert_ms: i64,
    pub overrun_ms: i64,
}

impl TickResult {
    fn clock(now_ms: i64) -> Self {
        Self {
            now_ms,
            target_ms: 0,
            target_hhmm: String::new(),
            display_ms: 0,
            signed_display_ms: 0,
            state: Phase::Clock,
            mode: Severity::Clock,
            blink: false,
            warn_ms: 0,
            alert_ms: 0,
            overrun_ms: 0,
        }
    }

    fn idle(now_ms: i64, thresholds: &Thresholds) -> Self {
        Self {
            now_ms,
            target_ms: 0,
            target_hhmm: String::new(),
            display_ms: 0,
            signed_display_ms: 0,
            state: Phase::Idle,
            mode: Severity::Ended,
            blink: false,
            warn_ms: thresholds.warn_ms,
            alert_ms: thresholds.alert_ms,
            overrun_ms: thresholds.overrun_ms,
        }
    }
}

/// The last target the engine accepted, with the thresholds it was shown with.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TargetSession {
    pub target_ms: i64,
    pub accepted_at_ms: i64,
    pub thresholds: Thresholds,
}

impl TargetSession {
    fn covers(&self, now_ms: i64) -> bool {
        now_ms <= self.target_ms.saturating_add(self.thresholds.overrun_ms.max(0))
    }
}

/// Turns a configuration into a [`TickResult`] against its own clock.
///
/// The engine remembers the last accepted target so that re-resolving it on
/// every poll cannot jitter, and so that a configuration that briefly loses
/// its target keeps counting until the old target's overrun window closes.
/// That memory is process-local and never a source of truth.
pub struct CountdownEngine {
    resolver: TargetResolver,
    time_source: Box<dyn TimeSource>,
    jitter_tolerance_ms: u64,
    session: Mutex<Option<TargetSession>>,
}

impl CountdownEngine {
    pub fn new(settings: EngineSettings, time_source: Box<dyn TimeSource>) -> Self {
        Self {
            resolver: TargetResolver::new(settings.display_tz),
            time_source,
            jitter_tolerance_ms: settings.jitter_tolerance_ms.unsigned_abs(),
            session: Mutex::new(None),
        }
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    pub fn time_source(&self) -> &dyn TimeSource {
        self.time_source.as_ref()
    }

    #[cfg(test)]
    pub fn session(&self) -> Option<TargetSession> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads the clock once and derives the display state. Never fails.
    pub fn tick(&self, config: &CountdownConfig) -> TickResult {
        let now_ms = self.time_source.now_ms();
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);

        if config.mode == ModeSpec::Clock {
            *session = None;
            return TickResult::clock(now_ms);
        }

        let resolved_ms = match self.resolver.try_resolve(config, now_ms) {
            Ok(target_ms) => target_ms,
            Err(err) => {
                warn!(%err, "ignoring malformed countdown target");
                0
            }
        };
        let served = self.smooth_target(&mut session, resolved_ms, now_ms, config.thresholds);
        drop(session);

        match served {
            Some(served) => self.derive_state(now_ms, served.target_ms, &served.thresholds),
            None => TickResult::idle(now_ms, &config.thresholds),
        }
    }

    /// Picks the session to display. A held session keeps its own thresholds
    /// so a degenerate config cannot shorten its overrun window.
    fn smooth_target(
        &self,
        session: &mut Option<TargetSession>,
        resolved_ms: i64,
        now_ms: i64,
        thresholds: Thresholds,
    ) -> Option<TargetSession> {
        if resolved_ms > 0 {
            if let Some(current) = session.as_mut()
                && resolved_ms.abs_diff(current.target_ms) < self.jitter_tolerance_ms
            {
                if resolved_ms != current.target_ms {
                    debug!(
                        resolved_ms,
                        kept_ms = current.target_ms,
                        "debounced target jitter"
                    );
                }
                current.thresholds = thresholds;
                return Some(*current);
            }

            debug!(target_ms = resolved_ms, now_ms, "accepted new target session");
            *session = Some(TargetSession {
                target_ms: resolved_ms,
                accepted_at_ms: now_ms,
                thresholds,
            });
            return *session;
        }

        match *session {
            Some(current) if current.covers(now_ms) => {
                debug!(
                    target_ms = current.target_ms,
                    accepted_at_ms = current.accepted_at_ms,
                    "target lost; holding last accepted target"
                );
                Some(current)
            }
            Some(current) => {
                debug!(target_ms = current.target_ms, "target session expired");
                *session = None;
                None
            }
            None => None,
        }
    }

    fn derive_state(&self, now_ms: i64, target_ms: i64, thresholds: &Thresholds) -> TickResult {
        let mut result = TickResult::idle(now_ms, thresholds);
        if target_ms <= 0 {
            return result;
        }

        let signed_ms = target_ms.saturating_sub(now_ms);
        result.target_ms = target_ms;
        result.target_hhmm = self.resolver.format_hhmm(target_ms);
        result.signed_display_ms = signed_ms;

        if signed_ms > 0 {
            result.state = Phase::Countdown;
            result.mode = severity_for_remaining(signed_ms, thresholds);
            result.blink = signed_ms <= thresholds.blink_ms;
            result.display_ms = signed_ms;
            return result;
        }

        let elapsed_ms = signed_ms.saturating_neg();
        if thresholds.overrun_ms > 0 && elapsed_ms <= thresholds.overrun_ms {
            result.state = Phase::Overrun;
            result.mode = Severity::Over;
            result.display_ms = elapsed_ms;
        } else {
            result.state = Phase::Ended;
            result.mode = Severity::Ended;
        }
        result
    }
}

fn severity_for_remaining(remaining_ms: i64, thresholds: &Thresholds) -> Severity {
    if remaining_ms <= thresholds.alert_ms {
        Severity::Alert
    } else if remaining_ms <= thresholds.warn_ms {
        Severity::Warn
    } else {
        Severity::Normal
    }
}
