// In crates/engine/src/session.rs

use app_config::SessionSettings;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};

/// Exchange trading hours.
#[derive(Debug, Clone)]
pub struct MarketSession {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
    weekdays_only: bool,
}

impl MarketSession {
    pub fn from_settings(settings: &SessionSettings) -> anyhow::Result<Self> {
        let offset = FixedOffset::east_opt(settings.utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!("invalid UTC offset: {} minutes", settings.utc_offset_minutes)
        })?;
        Ok(Self {
            open: settings.open,
            close: settings.close,
            offset,
            weekdays_only: settings.weekdays_only,
        })
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if self.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = local.time();
        time >= self.open && time < self.close
    }
}

/// True when there is no session configured or the session is open.
pub fn is_trading(session: Option<&MarketSession>, now: DateTime<Utc>) -> bool {
    session.is_none_or(|s| s.is_open(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn krx() -> MarketSession {
        MarketSession::from_settings(&SessionSettings {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            utc_offset_minutes: 540,
            weekdays_only: true,
        })
        .unwrap()
    }

    #[test]
    fn open_during_local_hours_on_weekdays() {
        let session = krx();
        // Thursday 2025-01-02 10:00 KST == 01:00 UTC.
        assert!(session.is_open(Utc.with_ymd_and_hms(2025, 1, 2, 1, 0, 0).unwrap()));
        // 15:30 KST is already closed.
        assert!(!session.is_open(Utc.with_ymd_and_hms(2025, 1, 2, 6, 30, 0).unwrap()));
        // Saturday.
        assert!(!session.is_open(Utc.with_ymd_and_hms(2025, 1, 4, 1, 0, 0).unwrap()));
        assert!(is_trading(None, Utc::now()));
    }
}
