use chrono::{Days, NaiveDate, Utc};
use chrono_tz::Tz;

/// Calendar date "now" in the given civil timezone.
pub fn today_in(timezone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

/// Dates still to be collected, ascending. Without a watermark only
/// yesterday is pending; with one, every date after it up to yesterday.
pub fn pending_dates(watermark: Option<NaiveDate>, today: NaiveDate) -> Vec<NaiveDate> {
    let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
        return vec![];
    };
    match watermark {
        None => vec![yesterday],
        Some(last) => match last.checked_add_days(Days::new(1)) {
            Some(first) => date_range(first, yesterday),
            None => vec![],
        },
    }
}

/// Inclusive ascending range; empty when `start > end`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}
