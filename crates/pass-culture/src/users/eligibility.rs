use std::ops::RangeInclusive;

use chrono::{NaiveDate, NaiveDateTime};

use super::domain::{EligibilityType, User};
use crate::dates::{add_years, age_at_date, start_of_day};

pub const ELIGIBILITY_UNDERAGE_RANGE: RangeInclusive<u32> = 15..=17;
pub const ELIGIBILITY_AGE_18: u32 = 18;
pub const ANONYMIZATION_AGE: u32 = 21;

/// Eligibility opens on the 15th birthday.
pub fn eligibility_start(birth: NaiveDate) -> NaiveDateTime {
    start_of_day(add_years(birth, 15))
}

/// Eligibility closes on the 19th birthday at 11:00.
pub fn eligibility_end(birth: NaiveDate) -> NaiveDateTime {
    let nineteenth = add_years(birth, 19);
    nineteenth
        .and_hms_opt(11, 0, 0)
        .unwrap_or_else(|| start_of_day(nineteenth))
}

pub fn eligibility_at_date(
    birth: Option<NaiveDate>,
    at: NaiveDateTime,
) -> Option<EligibilityType> {
    let birth = birth?;
    if at < eligibility_start(birth) || at >= eligibility_end(birth) {
        return None;
    }

    let age = age_at_date(birth, at.date());
    if ELIGIBILITY_UNDERAGE_RANGE.contains(&age) {
        Some(EligibilityType::Underage)
    } else if age >= ELIGIBILITY_AGE_18 {
        Some(EligibilityType::Age18)
    } else {
        None
    }
}

/// Eligibility retained for a user once an identity provider reported a birth date.
///
/// A user registered while underage keeps that eligibility after turning 18 unless the
/// current date already grants the 18 year old credit; a user registered at 18 keeps it
/// after the eligibility window closes.
pub fn decide_eligibility(
    birth_date: Option<NaiveDate>,
    registration_datetime: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Option<EligibilityType> {
    let birth_date = birth_date?;
    let current = eligibility_at_date(Some(birth_date), now);
    if current == Some(EligibilityType::Age18) {
        return current;
    }

    let at_registration =
        registration_datetime.and_then(|registered| eligibility_at_date(Some(birth_date), registered));

    at_registration.or(current)
}

pub fn is_user_age_compatible_with_eligibility(
    age: Option<u32>,
    eligibility: Option<EligibilityType>,
) -> bool {
    match (eligibility, age) {
        (Some(EligibilityType::Underage), Some(age)) => ELIGIBILITY_UNDERAGE_RANGE.contains(&age),
        (Some(EligibilityType::Age18), Some(age)) => age >= ELIGIBILITY_AGE_18,
        _ => false,
    }
}

pub fn is_eligible_for_beneficiary_upgrade(
    user: &User,
    eligibility: Option<EligibilityType>,
) -> bool {
    match eligibility {
        Some(EligibilityType::Underage) => !user.has_underage_beneficiary_role(),
        Some(EligibilityType::Age18) => !user.has_beneficiary_role(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, 0, 0).expect("valid time")
    }

    #[test]
    fn window_spans_fifteenth_to_nineteenth_birthday_morning() {
        let birth = date(2005, 3, 10);
        assert_eq!(eligibility_at_date(Some(birth), at(2020, 3, 9, 23)), None);
        assert_eq!(
            eligibility_at_date(Some(birth), at(2020, 3, 10, 0)),
            Some(EligibilityType::Underage)
        );
        assert_eq!(
            eligibility_at_date(Some(birth), at(2023, 3, 10, 8)),
            Some(EligibilityType::Age18)
        );
        assert_eq!(
            eligibility_at_date(Some(birth), at(2024, 3, 10, 10)),
            Some(EligibilityType::Age18)
        );
        assert_eq!(eligibility_at_date(Some(birth), at(2024, 3, 10, 11)), None);
        assert_eq!(eligibility_at_date(None, at(2024, 3, 10, 11)), None);
    }

    #[test]
    fn underage_registration_is_kept_when_no_longer_eligible_now() {
        let birth = date(2002, 5, 6);
        let registered = at(2019, 5, 1, 9);
        let now = at(2021, 6, 1, 9);
        assert_eq!(
            decide_eligibility(Some(birth), Some(registered), now),
            Some(EligibilityType::Underage)
        );
    }

    #[test]
    fn age_18_today_wins_over_underage_registration() {
        let birth = date(2002, 5, 4);
        let registered = at(2020, 5, 1, 9);
        let now = at(2020, 5, 5, 0);
        assert_eq!(
            decide_eligibility(Some(birth), Some(registered), now),
            Some(EligibilityType::Age18)
        );
    }

    #[test]
    fn too_old_without_registration_is_not_eligible() {
        let birth = date(2001, 5, 4);
        assert_eq!(decide_eligibility(Some(birth), None, at(2020, 5, 5, 0)), None);
    }

    #[test]
    fn upgrade_depends_on_roles() {
        let mut user = User::new(UserId(1), "young@example.com", at(2020, 1, 1, 0));
        assert!(is_eligible_for_beneficiary_upgrade(&user, Some(EligibilityType::Underage)));
        user.add_underage_beneficiary_role();
        assert!(!is_eligible_for_beneficiary_upgrade(&user, Some(EligibilityType::Underage)));
        assert!(is_eligible_for_beneficiary_upgrade(&user, Some(EligibilityType::Age18)));
        user.add_beneficiary_role();
        assert!(!is_eligible_for_beneficiary_upgrade(&user, Some(EligibilityType::Age18)));
        assert!(!is_eligible_for_beneficiary_upgrade(&user, None));
    }

    #[test]
    fn age_compatibility() {
        assert!(is_user_age_compatible_with_eligibility(Some(16), Some(EligibilityType::Underage)));
        assert!(!is_user_age_compatible_with_eligibility(Some(18), Some(EligibilityType::Underage)));
        assert!(is_user_age_compatible_with_eligibility(Some(19), Some(EligibilityType::Age18)));
        assert!(!is_user_age_compatible_with_eligibility(None, Some(EligibilityType::Age18)));
    }
}
