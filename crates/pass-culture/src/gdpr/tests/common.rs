use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use crate::config::GdprConfig;
use crate::finance::deposit::{Deposit, DepositType};
use crate::gdpr::GdprService;
use crate::ids::{DepositId, Sequence, UserId};
use crate::storage::LocalObjectStorage;
use crate::store::{IdAllocator, InMemoryStore, UserRepository};
use crate::users::User;

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(10, 30, 0).expect("valid time")
}

pub(super) fn now() -> NaiveDateTime {
    at(2024, 6, 15)
}

pub(super) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub storage: Arc<LocalObjectStorage>,
    pub service: GdprService<InMemoryStore, LocalObjectStorage>,
    _root: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GdprConfig::default())
    }

    pub fn with_config(config: GdprConfig) -> Self {
        let root = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(InMemoryStore::new());
        let storage = Arc::new(LocalObjectStorage::new(root.path()));
        let service = GdprService::new(store.clone(), storage.clone(), config);
        Self {
            store,
            storage,
            service,
            _root: root,
        }
    }

    /// Plain account, last seen at `last_connection`.
    pub fn user(&self, email: &str, birth: NaiveDate, last_connection: NaiveDateTime) -> User {
        let id = UserId(self.store.next_id(Sequence::User).expect("user id"));
        let mut user = User::new(id, email, last_connection);
        user.date_of_birth = Some(birth);
        user.first_name = Some("Camille".to_string());
        user.last_name = Some("Durand".to_string());
        user.phone_number = Some("+33612345678".to_string());
        user.address = Some("3 rue de Valois".to_string());
        user.postal_code = Some("75001".to_string());
        user.city = Some("Paris".to_string());
        self.store.insert_user(user).expect("user stored")
    }

    /// Adult beneficiary whose single deposit was granted at `granted` and expires at `expires`.
    pub fn beneficiary(
        &self,
        email: &str,
        birth: NaiveDate,
        granted: NaiveDateTime,
        expires: NaiveDateTime,
    ) -> User {
        let mut user = self.user(email, birth, granted);
        user.validated_birth_date = Some(birth);
        user.add_beneficiary_role();
        user.deposits.push(Deposit {
            id: DepositId(self.store.next_id(Sequence::Deposit).expect("deposit id")),
            deposit_type: DepositType::Grant18,
            amount: 300_00,
            source: "dossier ubble [1]".to_string(),
            version: 1,
            date_created: granted,
            expiration_date: expires,
            recredits: Vec::new(),
        });
        self.store.update_user(user.clone()).expect("user updated");
        user
    }

    pub fn reload(&self, user_id: UserId) -> User {
        self.store
            .fetch_user(user_id)
            .expect("store reachable")
            .expect("user exists")
    }
}
