use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarContext {
    pub today: NaiveDate,
    pub zone: Option<Tz>,
}

impl CalendarContext {
    pub fn now(zone: Option<Tz>) -> Self {
        let today = match zone {
            Some(zone) => Utc::now().with_timezone(&zone).date_naive(),
            None => Local::now().date_naive(),
        };
        Self { today, zone }
    }

    pub fn fixed(today: NaiveDate, zone: Option<Tz>) -> Self {
        Self { today, zone }
    }

    pub fn day_of(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(match self.zone {
                Some(zone) => parsed.with_timezone(&zone).date_naive(),
                None => parsed.with_timezone(&Local).date_naive(),
            });
        }
        if let Ok(parsed) = raw.parse::<NaiveDateTime>() {
            return Some(parsed.date());
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(parsed.date());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }

    pub fn is_today(&self, raw: Option<&str>) -> bool {
        raw.and_then(|value| self.day_of(value)) == Some(self.today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CalendarContext {
        CalendarContext::fixed(
            NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date"),
            Some(chrono_tz::Asia::Tokyo),
        )
    }

    #[test]
    fn rfc3339_is_projected_into_zone() {
        // 20:00 UTC on the 9th is already the 10th in Tokyo.
        assert_eq!(
            context().day_of("2026-03-09T20:00:00Z"),
            NaiveDate::from_ymd_opt(2026, 3, 10)
        );
    }

    #[test]
    fn naive_forms_are_taken_as_written() {
        let context = context();
        let expected = NaiveDate::from_ymd_opt(2026, 3, 9);
        assert_eq!(context.day_of("2026-03-09T23:30:00"), expected);
        assert_eq!(context.day_of("2026-03-09T23:30:00.125"), expected);
        assert_eq!(context.day_of("2026-03-09 23:30:00"), expected);
        assert_eq!(context.day_of("2026-03-09"), expected);
    }

    #[test]
    fn garbage_and_blank_are_missing() {
        let context = context();
        assert_eq!(context.day_of(""), None);
        assert_eq!(context.day_of("yesterday"), None);
        assert!(!context.is_today(None));
    }
}
