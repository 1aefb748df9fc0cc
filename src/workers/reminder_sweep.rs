//! Inactivity reminder sweep: one pass over the user base, one reminder per
//! inactive user whose local clock is inside the send window.

use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::chat::messages::{self, Locale};
use crate::chat::{OutboundClient, OutboundError};
use crate::config::NotifyConfig;
use crate::constants::NOTIFY_SWEEP_SOFT_DEADLINE_SECS;
use crate::store::Store;

pub async fn run(store: &Store, outbound: &OutboundClient, config: &NotifyConfig, default_tz: &str) {
    let now = Utc::now();
    let deadline = Instant::now() + StdDuration::from_secs(NOTIFY_SWEEP_SOFT_DEADLINE_SECS);

    let users = match store.list_users() {
        Ok(users) => users,
        Err(e) => {
            tracing::error!(error = %e, "Reminder sweep could not list users");
            return;
        }
    };

    let mut sent = 0u32;
    let mut disabled = 0u32;
    for user in users {
        if Instant::now() >= deadline {
            tracing::warn!("Reminder sweep hit its soft deadline, deferring the rest");
            break;
        }

        if !is_candidate(
            user.notifications_on,
            user.last_active_at,
            now,
            config.inactive_hours,
        ) {
            continue;
        }
        if !within_window(&user.tz, default_tz, now, config.window_start, config.window_end) {
            continue;
        }

        let locale = Locale::from_code(&user.interface_lang);
        match outbound.send_text(&user.id, &messages::reminder(locale)).await {
            Ok(()) => sent += 1,
            Err(OutboundError::BlockedByUser) => {
                // 用户已屏蔽机器人：关闭其提醒，不再打扰
                if let Err(e) = store.set_notifications(&user.id, false) {
                    tracing::error!(user_id = %user.id, error = %e, "Failed to disable notifications");
                } else {
                    disabled += 1;
                    tracing::warn!(user_id = %user.id, "User blocked the bot, notifications disabled");
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Reminder send failed");
            }
        }
    }

    tracing::info!(sent, disabled, "Reminder sweep finished");
}

/// Inactivity gate: reminders fire only for users idle longer than the
/// threshold with notifications on.
pub fn is_candidate(
    notifications_on: bool,
    last_active_at: DateTime<Utc>,
    now: DateTime<Utc>,
    inactive_hours: i64,
) -> bool {
    notifications_on && last_active_at < now - Duration::hours(inactive_hours)
}

/// Whether `now` falls inside `[start, end)` in the user's local timezone.
/// Unparseable user timezones fall back to the configured default, then UTC.
pub fn within_window(
    user_tz: &str,
    default_tz: &str,
    now: DateTime<Utc>,
    start: NaiveTime,
    end: NaiveTime,
) -> bool {
    let tz: chrono_tz::Tz = user_tz
        .parse()
        .or_else(|_| default_tz.parse())
        .unwrap_or(chrono_tz::UTC);
    let local = now.with_timezone(&tz).time();
    start <= local && local < end
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn window() -> (NaiveTime, NaiveTime) {
        (
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        )
    }

    #[test]
    fn moscow_morning_is_inside_window() {
        // 05:15 UTC = 08:15 in Europe/Moscow (UTC+3)
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 5, 15, 0).unwrap();
        let (start, end) = window();
        assert!(within_window("Europe/Moscow", "UTC", now, start, end));
    }

    #[test]
    fn moscow_night_is_outside_window() {
        // 23:30 UTC = 02:30 in Europe/Moscow
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).unwrap();
        let (start, end) = window();
        assert!(!within_window("Europe/Moscow", "UTC", now, start, end));
    }

    #[test]
    fn window_end_is_exclusive() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 23, 0, 0).unwrap();
        let (start, end) = window();
        assert!(!within_window("UTC", "UTC", now, start, end));
    }

    #[test]
    fn bad_timezone_falls_back_to_default() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 5, 15, 0).unwrap();
        let (start, end) = window();
        assert!(within_window("Nowhere/Invalid", "Europe/Moscow", now, start, end));
        assert!(!within_window("Nowhere/Invalid", "UTC", now, start, end));
    }

    #[test]
    fn candidate_requires_inactivity_and_opt_in() {
        let now = Utc::now();
        let seven_hours_ago = now - Duration::hours(7);
        let one_hour_ago = now - Duration::hours(1);

        assert!(is_candidate(true, seven_hours_ago, now, 6));
        assert!(!is_candidate(true, one_hour_ago, now, 6));
        assert!(!is_candidate(false, seven_hours_ago, now, 6));
    }
}
