use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use crate::finance::deposit::{Deposit, DepositType};
use crate::fraud::domain::{
    BeneficiaryFraudCheck, FraudCheckContent, FraudCheckStatus, FraudCheckType,
    IdentityCheckContent, UbbleContent, UbbleIdentificationStatus,
};
use crate::fraud::FraudService;
use crate::ids::{DepositId, FraudCheckId, Sequence, UserId};
use crate::notifications::InMemoryNotifier;
use crate::store::{FraudCheckRepository, IdAllocator, InMemoryStore, UserRepository};
use crate::subscription::api::SubscriptionService;
use crate::users::{EligibilityType, User};

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn now() -> NaiveDateTime {
    date(2022, 11, 2).and_hms_opt(10, 0, 0).expect("valid time")
}

pub(super) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<InMemoryNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
        }
    }

    pub fn fraud(&self) -> FraudService<InMemoryStore, InMemoryNotifier> {
        FraudService::new(self.store.clone(), self.notifier.clone())
    }

    pub fn subscription(&self) -> SubscriptionService<InMemoryStore, InMemoryNotifier> {
        SubscriptionService::new(
            self.store.clone(),
            self.notifier.clone(),
            "support@example.com",
        )
    }

    pub fn user(&self, email: &str, birth: NaiveDate) -> User {
        let id = UserId(self.store.next_id(Sequence::User).expect("user id"));
        let mut user = User::new(id, email, now());
        user.date_of_birth = Some(birth);
        user.is_email_validated = true;
        self.store.insert_user(user).expect("user stored")
    }

    /// Beneficiary already known under the given identity.
    pub fn beneficiary(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        birth: NaiveDate,
        deposit_type: DepositType,
    ) -> User {
        let mut user = self.user(email, birth);
        user.first_name = Some(first_name.to_string());
        user.last_name = Some(last_name.to_string());
        user.validated_birth_date = Some(birth);
        match deposit_type {
            DepositType::Grant15_17 => user.add_underage_beneficiary_role(),
            DepositType::Grant18 => user.add_beneficiary_role(),
        }
        let deposit_id = DepositId(self.store.next_id(Sequence::Deposit).expect("deposit id"));
        user.deposits.push(Deposit {
            id: deposit_id,
            deposit_type,
            amount: 30_00,
            source: "dossier ubble [seed]".to_string(),
            version: 1,
            date_created: now(),
            expiration_date: date(2030, 1, 1).and_hms_opt(0, 0, 0).expect("valid time"),
            recredits: Vec::new(),
        });
        self.store.update_user(user.clone()).expect("user updated");
        user
    }

    pub fn check(
        &self,
        user: &User,
        check_type: FraudCheckType,
        status: FraudCheckStatus,
        eligibility: Option<EligibilityType>,
        content: Option<FraudCheckContent>,
    ) -> BeneficiaryFraudCheck {
        let id = FraudCheckId(self.store.next_id(Sequence::FraudCheck).expect("check id"));
        let mut check = BeneficiaryFraudCheck::new(
            id,
            user.id,
            check_type,
            status,
            format!("third-party-{}", id),
            eligibility,
            now(),
        );
        check.result_content = content;
        self.store.insert_fraud_check(check).expect("check stored")
    }
}

pub(super) fn ubble_content(first_name: &str, last_name: &str, birth: NaiveDate) -> UbbleContent {
    UbbleContent {
        status: Some(UbbleIdentificationStatus::Processed),
        score: Some(1.0),
        birth_date: Some(birth),
        first_name: Some(first_name.to_string()),
        last_name: Some(last_name.to_string()),
        gender: Some("F".to_string()),
        document_type: Some("CI".to_string()),
        id_document_number: Some("123456789012".to_string()),
        expiry_date_score: Some(1.0),
        supported: Some(1.0),
        reference_data_check_score: Some(1.0),
        identification_id: Some("ubble-identification".to_string()),
        ..UbbleContent::default()
    }
}

pub(super) fn dms_content(first_name: &str, last_name: &str, birth: NaiveDate) -> IdentityCheckContent {
    IdentityCheckContent {
        first_name: Some(first_name.to_string()),
        last_name: Some(last_name.to_string()),
        birth_date: Some(birth),
        id_piece_number: Some("22AB12345".to_string()),
        postal_code: Some("75011".to_string()),
        city: Some("Paris".to_string()),
        procedure_number: Some(44623),
        ..IdentityCheckContent::default()
    }
}
