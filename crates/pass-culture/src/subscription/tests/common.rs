use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use crate::fraud::domain::{
    BeneficiaryFraudCheck, FraudCheckContent, FraudCheckStatus, FraudCheckType, UbbleContent,
    UbbleIdentificationStatus,
};
use crate::ids::{FraudCheckId, Sequence, UserId};
use crate::notifications::InMemoryNotifier;
use crate::store::{FraudCheckRepository, IdAllocator, InMemoryStore, UserRepository};
use crate::subscription::api::{ProfileForm, SubscriptionService};
use crate::users::{EligibilityType, User};

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn now() -> NaiveDateTime {
    date(2022, 11, 2).and_hms_opt(10, 0, 0).expect("valid time")
}

pub(super) type Service = SubscriptionService<InMemoryStore, InMemoryNotifier>;

pub(super) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<InMemoryNotifier>,
    pub service: Arc<Service>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let service = Arc::new(SubscriptionService::new(
            store.clone(),
            notifier.clone(),
            "support@example.com",
        ));
        Self {
            store,
            notifier,
            service,
        }
    }

    /// Email-validated account, phone validated as well.
    pub fn user(&self, birth: NaiveDate) -> User {
        let id = UserId(self.store.next_id(Sequence::User).expect("user id"));
        let mut user = User::new(id, format!("young{id}@example.com"), now());
        user.date_of_birth = Some(birth);
        user.is_email_validated = true;
        user.is_phone_validated = true;
        user.phone_number = Some("+33612345678".to_string());
        self.store.insert_user(user).expect("user stored")
    }

    pub fn refreshed(&self, user: &User) -> User {
        self.store
            .fetch_user(user.id)
            .expect("fetch")
            .expect("user exists")
    }

    pub fn complete_profile(&self, user: &User) {
        let mut user = self.refreshed(user);
        self.service
            .complete_profile(&mut user, profile_form(), now())
            .expect("profile completed");
    }

    pub fn identity_check(
        &self,
        user: &User,
        status: FraudCheckStatus,
        eligibility: Option<EligibilityType>,
        content: UbbleContent,
    ) -> BeneficiaryFraudCheck {
        let id = FraudCheckId(self.store.next_id(Sequence::FraudCheck).expect("check id"));
        let mut check = BeneficiaryFraudCheck::new(
            id,
            user.id,
            FraudCheckType::Ubble,
            status,
            format!("identification-{id}"),
            eligibility,
            now(),
        );
        check.result_content = Some(FraudCheckContent::Ubble(content));
        self.store.insert_fraud_check(check).expect("check stored")
    }
}

pub(super) fn profile_form() -> ProfileForm {
    ProfileForm {
        first_name: "Léa".to_string(),
        last_name: "Martin".to_string(),
        address: Some("1 rue de la Paix".to_string()),
        city: "Paris".to_string(),
        postal_code: "75002".to_string(),
        activity: "Lycéen".to_string(),
        school_type: None,
    }
}

pub(super) fn valid_document(birth: NaiveDate) -> UbbleContent {
    UbbleContent {
        status: Some(UbbleIdentificationStatus::Processed),
        score: Some(1.0),
        birth_date: Some(birth),
        first_name: Some("Léa".to_string()),
        last_name: Some("Martin".to_string()),
        gender: Some("F".to_string()),
        id_document_number: Some("123456789012".to_string()),
        expiry_date_score: Some(1.0),
        supported: Some(1.0),
        reference_data_check_score: Some(1.0),
        identification_id: Some("identification".to_string()),
        ..UbbleContent::default()
    }
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
