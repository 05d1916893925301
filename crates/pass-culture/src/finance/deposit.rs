use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::dates::{add_years, end_of_day, start_of_day};
use crate::ids::DepositId;
use crate::users::eligibility::ELIGIBILITY_UNDERAGE_RANGE;
use crate::users::{EligibilityType, User};

pub const GRANT_18_AMOUNT_V2: i64 = 300_00;
pub const GRANT_18_VALIDITY_IN_YEARS: u32 = 2;

/// Underage credit in cents, keyed by age at first registration.
pub fn underage_amount_for_age(age: u32) -> Option<i64> {
    match age {
        15 => Some(20_00),
        16 | 17 => Some(30_00),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositType {
    #[serde(rename = "GRANT_15_17")]
    Grant15_17,
    #[serde(rename = "GRANT_18")]
    Grant18,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub deposit_type: DepositType,
    /// Amount in cents.
    pub amount: i64,
    pub source: String,
    pub version: u8,
    pub date_created: NaiveDateTime,
    pub expiration_date: NaiveDateTime,
    #[serde(default)]
    pub recredits: Vec<Recredit>,
}

impl Deposit {
    /// Initial amount plus every recredit, in cents.
    pub fn total_amount(&self) -> i64 {
        self.amount + self.recredits.iter().map(|recredit| recredit.amount).sum::<i64>()
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expiration_date <= now
    }
}

/// Credit added to an existing deposit, e.g. at a birthday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recredit {
    pub amount: i64,
    pub recredit_type: String,
    pub date_created: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedDeposit {
    pub deposit_type: DepositType,
    pub amount: i64,
    pub expiration_date: NaiveDateTime,
    pub version: u8,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DepositError {
    #[error("user is not grantable: {0}")]
    UserNotGrantable(String),
    #[error("deposit type {0:?} already granted")]
    DepositTypeAlreadyGranted(DepositType),
    #[error("user already has an active deposit")]
    UserHasAlreadyActiveDeposit,
}

pub fn get_granted_deposit(
    beneficiary: &User,
    eligibility: EligibilityType,
    age_at_registration: Option<u32>,
    now: NaiveDateTime,
) -> Result<GrantedDeposit, DepositError> {
    match eligibility {
        EligibilityType::Underage => {
            let age = age_at_registration
                .filter(|age| ELIGIBILITY_UNDERAGE_RANGE.contains(age))
                .ok_or_else(|| {
                    DepositError::UserNotGrantable(
                        "User is not eligible for underage deposit".to_string(),
                    )
                })?;
            let amount = underage_amount_for_age(age).ok_or_else(|| {
                DepositError::UserNotGrantable(format!("no underage amount for age {age}"))
            })?;
            let birth_date = beneficiary.validated_birth_date.ok_or_else(|| {
                DepositError::UserNotGrantable("User has no validated birth date".to_string())
            })?;

            Ok(GrantedDeposit {
                deposit_type: DepositType::Grant15_17,
                amount,
                expiration_date: start_of_day(add_years(birth_date, 18)),
                version: 1,
            })
        }
        EligibilityType::Age18 => Ok(GrantedDeposit {
            deposit_type: DepositType::Grant18,
            amount: GRANT_18_AMOUNT_V2,
            expiration_date: end_of_day(add_years(now.date(), GRANT_18_VALIDITY_IN_YEARS)),
            version: 2,
        }),
    }
}

/// Build the deposit a beneficiary is entitled to. The caller attaches it to the user.
pub fn create_deposit(
    beneficiary: &User,
    id: DepositId,
    source: &str,
    eligibility: EligibilityType,
    age_at_registration: Option<u32>,
    now: NaiveDateTime,
) -> Result<Deposit, DepositError> {
    let granted = get_granted_deposit(beneficiary, eligibility, age_at_registration, now)?;

    if beneficiary.had_deposit_of_type(granted.deposit_type) {
        return Err(DepositError::DepositTypeAlreadyGranted(granted.deposit_type));
    }
    if beneficiary.has_active_deposit(now) {
        return Err(DepositError::UserHasAlreadyActiveDeposit);
    }

    Ok(Deposit {
        id,
        deposit_type: granted.deposit_type,
        amount: granted.amount,
        source: source.to_string(),
        version: granted.version,
        date_created: now,
        expiration_date: granted.expiration_date,
        recredits: Vec::new(),
    })
}

pub fn expire_current_deposit_for_user(user: &mut User, now: NaiveDateTime) {
    for deposit in user.deposits.iter_mut() {
        if deposit.expiration_date > now {
            deposit.expiration_date = now - Duration::seconds(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 11, 2)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .expect("valid datetime")
    }

    fn young(birth: NaiveDate) -> User {
        let mut user = User::new(UserId(7), "young@example.com", now());
        user.date_of_birth = Some(birth);
        user.validated_birth_date = Some(birth);
        user
    }

    #[test]
    fn underage_deposit_expires_on_eighteenth_birthday() {
        let birth = NaiveDate::from_ymd_opt(2006, 4, 12).expect("valid date");
        let granted = get_granted_deposit(&young(birth), EligibilityType::Underage, Some(16), now())
            .expect("grantable");
        assert_eq!(granted.amount, 30_00);
        assert_eq!(granted.deposit_type, DepositType::Grant15_17);
        assert_eq!(
            granted.expiration_date,
            start_of_day(NaiveDate::from_ymd_opt(2024, 4, 12).expect("valid date"))
        );
    }

    #[test]
    fn underage_deposit_requires_age_in_range() {
        let birth = NaiveDate::from_ymd_opt(2004, 4, 12).expect("valid date");
        match get_granted_deposit(&young(birth), EligibilityType::Underage, Some(18), now()) {
            Err(DepositError::UserNotGrantable(_)) => {}
            other => panic!("expected not grantable, got {other:?}"),
        }
    }

    #[test]
    fn age_18_deposit_lasts_two_years() {
        let birth = NaiveDate::from_ymd_opt(2004, 4, 12).expect("valid date");
        let granted =
            get_granted_deposit(&young(birth), EligibilityType::Age18, None, now()).expect("grantable");
        assert_eq!(granted.amount, 300_00);
        assert_eq!(granted.version, 2);
        assert_eq!(
            granted.expiration_date,
            end_of_day(NaiveDate::from_ymd_opt(2024, 11, 2).expect("valid date"))
        );
    }

    #[test]
    fn refuses_second_deposit_of_same_type_and_active_deposit() {
        let birth = NaiveDate::from_ymd_opt(2004, 4, 12).expect("valid date");
        let mut user = young(birth);
        let deposit = create_deposit(&user, DepositId(1), "ubble", EligibilityType::Age18, None, now())
            .expect("deposit created");
        user.deposits.push(deposit);

        assert_eq!(
            create_deposit(&user, DepositId(2), "ubble", EligibilityType::Age18, None, now()),
            Err(DepositError::DepositTypeAlreadyGranted(DepositType::Grant18))
        );

        let mut underage = young(NaiveDate::from_ymd_opt(2006, 4, 12).expect("valid date"));
        underage.deposits.push(Deposit {
            id: DepositId(3),
            deposit_type: DepositType::Grant18,
            amount: 1,
            source: "manual".to_string(),
            version: 2,
            date_created: now(),
            expiration_date: now() + Duration::days(1),
            recredits: Vec::new(),
        });
        assert_eq!(
            create_deposit(&underage, DepositId(4), "ubble", EligibilityType::Underage, Some(16), now()),
            Err(DepositError::UserHasAlreadyActiveDeposit)
        );
    }

    #[test]
    fn expiring_moves_active_deposits_to_the_past() {
        let birth = NaiveDate::from_ymd_opt(2004, 4, 12).expect("valid date");
        let mut user = young(birth);
        let deposit = create_deposit(&user, DepositId(1), "ubble", EligibilityType::Age18, None, now())
            .expect("deposit created");
        user.deposits.push(deposit);

        expire_current_deposit_for_user(&mut user, now());
        assert!(!user.has_active_deposit(now()));
    }
}
