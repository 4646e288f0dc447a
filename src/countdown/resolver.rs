use chrono::{DateTime, Days, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::debug;

use crate::countdown::config::{
    CountdownConfig, DailyTimeError, IsoDateTime, ModeSpec, parse_daily_time, parse_iso_datetime,
};

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid daily_time: {0}")]
    DailyTime(#[from] DailyTimeError),
}

/// Picks the single authoritative target instant for a configuration.
///
/// Priority: explicit `target_ms`, then explicit ISO datetimes, then the
/// mode's own schedule (`daily_time` or `once_at`). Duration and clock modes
/// bypass the chain entirely. A result of `0` means "no target".
#[derive(Debug, Clone, Copy)]
pub struct TargetResolver {
    timezone: Tz,
}

impl TargetResolver {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Total variant of [`try_resolve`](Self::try_resolve): errors resolve to no target.
    pub fn resolve(&self, config: &CountdownConfig, now_ms: i64) -> i64 {
        self.try_resolve(config, now_ms).unwrap_or_else(|err| {
            debug!(%err, "target resolution fell back to no target");
            0
        })
    }

    pub fn try_resolve(&self, config: &CountdownConfig, now_ms: i64) -> Result<i64, ResolveError> {
        let overrun_ms = config.thresholds.overrun_ms;
        match &config.mode {
            ModeSpec::Clock | ModeSpec::Unrecognized(_) => return Ok(0),
            ModeSpec::Duration {
                minutes,
                started_ms,
            } => return Ok(duration_target_ms(*started_ms, *minutes)),
            ModeSpec::Daily { .. } | ModeSpec::Once { .. } => {}
        }

        if let Some(target_ms) = config.overrides.target_ms
            && is_current(target_ms, now_ms, overrun_ms)
        {
            return Ok(target_ms);
        }

        for text in config.overrides.iso_candidates() {
            if let Some(target_ms) = self.iso_to_ms(text)
                && is_current(target_ms, now_ms, overrun_ms)
            {
                return Ok(target_ms);
            }
        }

        match &config.mode {
            ModeSpec::Daily {
                daily_time: Some(hhmm),
            } => self.next_daily_target_ms(hhmm, now_ms, overrun_ms),
            // A one-shot target stays authoritative after it passes so the
            // display can report `ended` instead of going idle.
            ModeSpec::Once {
                once_at: Some(text),
            } => Ok(self.iso_to_ms(text).unwrap_or(0)),
            _ => Ok(0),
        }
    }

    /// Next occurrence of `hhmm` in the display time zone.
    ///
    /// The most recent occurrence is kept while `now` is inside its overrun
    /// window and still closer to it than to the next occurrence.
    pub fn next_daily_target_ms(
        &self,
        hhmm: &str,
        now_ms: i64,
        overrun_ms: i64,
    ) -> Result<i64, ResolveError> {
        let time_local = parse_daily_time(hhmm)?;
        let Some(now) = DateTime::<Utc>::from_timestamp_millis(now_ms) else {
            return Ok(0);
        };
        let Some(yesterday) = now
            .with_timezone(&self.timezone)
            .date_naive()
            .checked_sub_days(Days::new(1))
        else {
            return Ok(0);
        };

        let mut previous_ms = None;
        let mut next_ms = None;
        for day_offset in 0_u64..4 {
            let Some(date) = yesterday.checked_add_days(Days::new(day_offset)) else {
                continue;
            };
            let Some(candidate) = resolve_local_datetime(&self.timezone, date.and_time(time_local))
            else {
                continue;
            };
            let candidate_ms = candidate.timestamp_millis();
            if candidate_ms < now_ms {
                previous_ms = Some(candidate_ms);
            } else {
                next_ms = Some(candidate_ms);
                break;
            }
        }

        if let Some(previous_ms) = previous_ms {
            let elapsed_ms = now_ms.saturating_sub(previous_ms);
            let closer_than_next =
                next_ms.is_none_or(|next_ms| elapsed_ms < next_ms.saturating_sub(now_ms));
            if elapsed_ms <= overrun_ms.max(0) && closer_than_next {
                return Ok(previous_ms);
            }
        }

        Ok(next_ms.unwrap_or(0))
    }

    /// Epoch milliseconds for an ISO string; offset-less values are read in the display zone.
    pub fn iso_to_ms(&self, text: &str) -> Option<i64> {
        match parse_iso_datetime(text)? {
            IsoDateTime::Zoned(dt) => Some(dt.timestamp_millis()),
            IsoDateTime::Naive(naive) => {
                resolve_local_datetime(&self.timezone, naive).map(|dt| dt.timestamp_millis())
            }
        }
    }

    /// Local `HH:MM` for a target, or an empty string when there is none.
    pub fn format_hhmm(&self, target_ms: i64) -> String {
        if target_ms <= 0 {
            return String::new();
        }
        DateTime::<Utc>::from_timestamp_millis(target_ms)
            .map(|dt| dt.with_timezone(&self.timezone).format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

fn is_current(target_ms: i64, now_ms: i64, overrun_ms: i64) -> bool {
    target_ms > 0 && now_ms <= target_ms.saturating_add(overrun_ms.max(0))
}

fn duration_target_ms(started_ms: i64, minutes: i64) -> i64 {
    if started_ms <= 0 || minutes <= 0 {
        return 0;
    }
    started_ms.saturating_add(minutes.saturating_mul(MINUTE_MS))
}

fn resolve_local_datetime<Z: TimeZone>(timezone: &Z, naive: NaiveDateTime) -> Option<DateTime<Z>> {
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => None,
    }
}
