use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::eligibility;
use crate::finance::deposit::{Deposit, DepositType};
use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Beneficiary,
    UnderageBeneficiary,
    Pro,
    Admin,
    Anonymized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EligibilityType {
    #[serde(rename = "underage")]
    Underage,
    #[serde(rename = "age-18")]
    Age18,
}

impl EligibilityType {
    pub fn label(&self) -> &'static str {
        match self {
            EligibilityType::Underage => "underage",
            EligibilityType::Age18 => "age-18",
        }
    }

    pub fn deposit_type(&self) -> DepositType {
        match self {
            EligibilityType::Underage => DepositType::Grant15_17,
            EligibilityType::Age18 => DepositType::Grant18,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Civility {
    #[serde(rename = "F")]
    F,
    #[serde(rename = "M")]
    M,
}

impl Civility {
    /// Provider genders come as free text (`F`, `M`, `female`, ...).
    pub fn from_gender(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "F" | "FEMALE" => Some(Civility::F),
            "M" | "MALE" => Some(Civility::M),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspensionReason {
    FraudSuspicion,
    FraudUsurpation,
    FraudHacking,
    UponUserRequest,
    WaitingForAnonymization,
    Deleted,
    Other,
}

impl SuspensionReason {
    pub fn is_fraud(&self) -> bool {
        matches!(
            self,
            SuspensionReason::FraudSuspicion
                | SuspensionReason::FraudUsurpation
                | SuspensionReason::FraudHacking
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    pub reason: SuspensionReason,
    pub date: NaiveDateTime,
    pub actor_id: Option<UserId>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub married_name: Option<String>,
    pub civility: Option<Civility>,
    pub date_of_birth: Option<NaiveDate>,
    pub validated_birth_date: Option<NaiveDate>,
    pub department_code: Option<String>,
    pub postal_code: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone_number: Option<String>,
    pub is_phone_validated: bool,
    pub is_email_validated: bool,
    pub id_piece_number: Option<String>,
    pub ine_hash: Option<String>,
    pub roles: BTreeSet<UserRole>,
    pub is_active: bool,
    pub suspension: Option<Suspension>,
    pub last_connection_date: Option<NaiveDateTime>,
    pub date_created: NaiveDateTime,
    #[serde(default)]
    pub deposits: Vec<Deposit>,
    #[serde(default)]
    pub external_ids: Vec<String>,
    #[serde(default)]
    pub marketing_email_subscription: bool,
}

impl User {
    /// Fresh account as created by the signup form.
    pub fn new(id: UserId, email: impl Into<String>, now: NaiveDateTime) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: None,
            last_name: None,
            married_name: None,
            civility: None,
            date_of_birth: None,
            validated_birth_date: None,
            department_code: None,
            postal_code: None,
            address: None,
            city: None,
            phone_number: None,
            is_phone_validated: false,
            is_email_validated: false,
            id_piece_number: None,
            ine_hash: None,
            roles: BTreeSet::new(),
            is_active: true,
            suspension: None,
            last_connection_date: Some(now),
            date_created: now,
            deposits: Vec::new(),
            external_ids: Vec::new(),
            marketing_email_subscription: false,
        }
    }

    /// Validated birth date when the identity provider gave one, the declared one otherwise.
    pub fn birth_date(&self) -> Option<NaiveDate> {
        self.validated_birth_date.or(self.date_of_birth)
    }

    pub fn age_at(&self, today: NaiveDate) -> Option<u32> {
        self.birth_date()
            .map(|birth| crate::dates::age_at_date(birth, today))
    }

    pub fn eligibility(&self, now: NaiveDateTime) -> Option<EligibilityType> {
        eligibility::eligibility_at_date(self.birth_date(), now)
    }

    pub fn has_beneficiary_role(&self) -> bool {
        self.roles.contains(&UserRole::Beneficiary)
    }

    pub fn has_underage_beneficiary_role(&self) -> bool {
        self.roles.contains(&UserRole::UnderageBeneficiary)
    }

    pub fn has_pro_role(&self) -> bool {
        self.roles.contains(&UserRole::Pro)
    }

    pub fn is_beneficiary(&self) -> bool {
        self.has_beneficiary_role() || self.has_underage_beneficiary_role()
    }

    pub fn add_beneficiary_role(&mut self) {
        self.roles.remove(&UserRole::UnderageBeneficiary);
        self.roles.insert(UserRole::Beneficiary);
    }

    pub fn add_underage_beneficiary_role(&mut self) {
        self.roles.insert(UserRole::UnderageBeneficiary);
    }

    pub fn replace_roles_by_anonymized_role(&mut self) {
        self.roles.clear();
        self.roles.insert(UserRole::Anonymized);
    }

    /// Latest deposit, expired or not.
    pub fn deposit(&self) -> Option<&Deposit> {
        self.deposits
            .iter()
            .max_by_key(|deposit| (deposit.date_created, deposit.id))
    }

    pub fn active_deposit(&self, now: NaiveDateTime) -> Option<&Deposit> {
        self.deposit().filter(|deposit| deposit.expiration_date > now)
    }

    pub fn has_active_deposit(&self, now: NaiveDateTime) -> bool {
        self.active_deposit(now).is_some()
    }

    pub fn had_deposit_of_type(&self, deposit_type: DepositType) -> bool {
        self.deposits
            .iter()
            .any(|deposit| deposit.deposit_type == deposit_type)
    }

    pub fn is_fraud_suspended_since(&self, threshold: NaiveDateTime) -> bool {
        self.suspension
            .as_ref()
            .map(|suspension| suspension.reason.is_fraud() && suspension.date > threshold)
            .unwrap_or(false)
    }

    pub fn email_domain(&self) -> &str {
        self.email.rsplit_once('@').map(|(_, domain)| domain).unwrap_or("")
    }
}
