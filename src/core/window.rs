use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

#[cfg_attr(test, mockall::automock)]
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

const DEFAULT_SEARCH_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchWindow {
    Today,
    ThisWeek,
    NextWeek,
    /// Today through the same weekday two weeks out.
    #[default]
    NextTwoWeeks,
}

pub struct SearchWindowCalculator<C: Clock> {
    clock: C,
}

impl<C: Clock> SearchWindowCalculator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Inclusive range of local dates in `tz` covered by `window`.
    pub fn get_window<TZ: TimeZone>(&self, tz: &TZ, window: SearchWindow) -> (NaiveDate, NaiveDate) {
        let today = self.clock.now().with_timezone(tz).date_naive();

        match window {
            SearchWindow::Today => (today, today),
            SearchWindow::ThisWeek => {
                let monday = today - Duration::days(today.weekday().num_days_from_monday().into());
                (monday, monday + Duration::days(6))
            }
            SearchWindow::NextWeek => {
                let days_until_next_monday = 7 - today.weekday().num_days_from_monday();
                let next_monday = today + Duration::days(days_until_next_monday.into());
                (next_monday, next_monday + Duration::days(6))
            }
            SearchWindow::NextTwoWeeks => (today, today + Duration::days(DEFAULT_SEARCH_DAYS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Utc};

    fn calculator_at(now: DateTime<Utc>) -> SearchWindowCalculator<MockClock> {
        let mut mock_clock = MockClock::new();
        mock_clock.expect_now().returning(move || now);
        SearchWindowCalculator::new(mock_clock)
    }

    fn ymd(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    #[test]
    fn test_today() {
        let calculator = calculator_at(Utc.with_ymd_and_hms(2026, 1, 15, 15, 0, 0).unwrap());
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();

        let (since, until) = calculator.get_window(&jst, SearchWindow::Today);

        assert_eq!(ymd(since), "2026-01-16");
        assert_eq!(ymd(until), "2026-01-16");
    }

    #[test]
    fn test_this_week() {
        let calculator = calculator_at(Utc.with_ymd_and_hms(2026, 1, 15, 15, 0, 0).unwrap());
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();

        let (since, until) = calculator.get_window(&jst, SearchWindow::ThisWeek);

        assert_eq!(ymd(since), "2026-01-12");
        assert_eq!(ymd(until), "2026-01-18");
    }

    #[test]
    fn test_next_week_from_sunday() {
        let calculator = calculator_at(Utc.with_ymd_and_hms(2026, 1, 18, 12, 0, 0).unwrap());

        let (since, until) = calculator.get_window(&Utc, SearchWindow::NextWeek);

        assert_eq!(ymd(since), "2026-01-19");
        assert_eq!(ymd(until), "2026-01-25");
    }

    #[test]
    fn test_next_two_weeks_is_default() {
        let calculator = calculator_at(Utc.with_ymd_and_hms(2026, 1, 16, 9, 0, 0).unwrap());

        let (since, until) = calculator.get_window(&chrono_tz::UTC, SearchWindow::default());

        assert_eq!(ymd(since), "2026-01-16");
        assert_eq!(ymd(until), "2026-01-30");
    }
}
