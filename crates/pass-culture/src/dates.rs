//! Calendar helpers shared by eligibility, deposit and anonymization rules.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};

pub fn add_years(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_add_months(Months::new(years * 12))
        .unwrap_or(NaiveDate::MAX)
}

pub fn sub_years(datetime: NaiveDateTime, years: u32) -> NaiveDateTime {
    datetime
        .checked_sub_months(Months::new(years * 12))
        .unwrap_or(NaiveDateTime::MIN)
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(23, 59, 59).unwrap_or_else(|| start_of_day(date))
}

/// Whole years elapsed between `birth` and `at`.
pub fn age_at_date(birth: NaiveDate, at: NaiveDate) -> u32 {
    let mut age = at.year() - birth.year();
    if (at.month(), at.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

pub fn truncate_to_year(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

pub fn truncate_datetime_to_year(datetime: NaiveDateTime) -> NaiveDateTime {
    start_of_day(truncate_to_year(datetime.date()))
}

pub fn is_truncated_to_year(datetime: NaiveDateTime) -> bool {
    datetime.month() == 1 && datetime.day() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn age_counts_only_completed_years() {
        assert_eq!(age_at_date(date(2002, 5, 6), date(2020, 5, 5)), 17);
        assert_eq!(age_at_date(date(2002, 5, 5), date(2020, 5, 5)), 18);
        assert_eq!(age_at_date(date(2030, 1, 1), date(2020, 5, 5)), 0);
    }

    #[test]
    fn add_years_clamps_leap_days() {
        assert_eq!(add_years(date(2004, 2, 29), 1), date(2005, 2, 28));
    }

    #[test]
    fn truncation_keeps_the_year() {
        let value = date(2013, 7, 14).and_hms_opt(9, 30, 0).expect("valid time");
        let truncated = truncate_datetime_to_year(value);
        assert_eq!(truncated, start_of_day(date(2013, 1, 1)));
        assert!(is_truncated_to_year(truncated));
        assert!(!is_truncated_to_year(value));
    }
}
