use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::client::{ExternalApiError, IdentityProvider};
use super::pictures::{download_ubble_document_pictures, DownloadedPicture};
use crate::fraud::api::FraudError;
use crate::fraud::domain::{
    BeneficiaryFraudCheck, FraudCheckContent, FraudCheckStatus, FraudCheckType, IdentityDetails,
    UbbleContent, UbbleIdentificationStatus,
};
use crate::ids::{FraudCheckId, MessageId, Sequence, UserId};
use crate::notifications::Notifier;
use crate::storage::{ObjectStorage, StorageError};
use crate::store::{RepositoryError, Store};
use crate::subscription::api::{SubscriptionError, SubscriptionService};
use crate::subscription::messages::{processing_message, ubble_ko_message};
use crate::subscription::models::{MessageDraft, SubscriptionItemStatus};
use crate::subscription::status::{can_retry_identity_fraud_check, is_eligibility_activable};
use crate::users::{EligibilityType, User};

/// Folder of the object storage receiving archived document pictures.
pub const ID_PICTURES_STORAGE_FOLDER: &str = "identity_documents";

#[derive(Debug, thiserror::Error)]
pub enum UbbleError {
    #[error(transparent)]
    Provider(#[from] ExternalApiError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error(transparent)]
    Fraud(#[from] FraudError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("user {0} is not allowed to start an identity check")]
    NotAllowed(UserId),
    #[error("no identity check found with identification_id {0}")]
    UnknownIdentification(String),
    #[error("identity provider response lacks the {0}")]
    IncompleteProviderResponse(&'static str),
    #[error("No validated Identity fraudCheck found with identification_id {0}")]
    BeneficiaryFraudCheckMissing(String),
    #[error(
        "Fraud check status {status} is incompatible with pictures archives for identification_id {identification_id}"
    )]
    IncompatibleFraudCheckStatus {
        status: &'static str,
        identification_id: String,
    },
}

impl UbbleError {
    /// The provider may answer on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UbbleError::Provider(error) if error.is_retryable)
    }
}

/// Status of the identity step computed from the provider checks of one eligibility.
pub fn get_ubble_subscription_item_status(
    user: &User,
    eligibility: Option<EligibilityType>,
    ubble_checks: &[BeneficiaryFraudCheck],
    now: NaiveDateTime,
) -> SubscriptionItemStatus {
    let has_status = |status: FraudCheckStatus| ubble_checks.iter().any(|check| check.status == status);

    if has_status(FraudCheckStatus::Ok) {
        return SubscriptionItemStatus::Ok;
    }
    if has_status(FraudCheckStatus::Pending) {
        return SubscriptionItemStatus::Pending;
    }

    let rejected = ubble_checks
        .iter()
        .filter(|check| matches!(check.status, FraudCheckStatus::Ko | FraudCheckStatus::Suspicious))
        .max_by_key(|check| (check.date_created, check.id));
    if let Some(check) = rejected {
        if can_retry_identity_fraud_check(check, ubble_checks) {
            return SubscriptionItemStatus::Todo;
        }
        return match check.status {
            FraudCheckStatus::Suspicious => SubscriptionItemStatus::Suspicious,
            _ => SubscriptionItemStatus::Ko,
        };
    }

    if is_eligibility_activable(user, eligibility, now) {
        SubscriptionItemStatus::Todo
    } else {
        SubscriptionItemStatus::Void
    }
}

/// `checks` may hold every check of the user; only provider checks of `eligibility` count.
pub fn is_user_allowed_to_perform_ubble_check(
    user: &User,
    eligibility: Option<EligibilityType>,
    checks: &[BeneficiaryFraudCheck],
    now: NaiveDateTime,
) -> bool {
    let ubble_checks: Vec<BeneficiaryFraudCheck> = checks
        .iter()
        .filter(|check| {
            check.check_type == FraudCheckType::Ubble && check.eligibility_type == eligibility
        })
        .cloned()
        .collect();
    get_ubble_subscription_item_status(user, eligibility, &ubble_checks, now)
        == SubscriptionItemStatus::Todo
}

/// Identity verification through the remote provider, from start to archived pictures.
pub struct UbbleWorkflow<S, N, P> {
    subscription: Arc<SubscriptionService<S, N>>,
    provider: Arc<P>,
    storage: Arc<dyn ObjectStorage>,
    webhook_url: String,
}

impl<S, N, P> UbbleWorkflow<S, N, P>
where
    S: Store + 'static,
    N: Notifier + 'static,
    P: IdentityProvider + 'static,
{
    pub fn new(
        subscription: Arc<SubscriptionService<S, N>>,
        provider: Arc<P>,
        storage: Arc<dyn ObjectStorage>,
        webhook_url: impl Into<String>,
    ) -> Self {
        Self {
            subscription,
            provider,
            storage,
            webhook_url: webhook_url.into(),
        }
    }

    pub fn subscription(&self) -> &SubscriptionService<S, N> {
        &self.subscription
    }

    fn store(&self) -> &Arc<S> {
        self.subscription.store()
    }

    /// Open a provider session and return the URL the user is redirected to.
    pub async fn start_ubble_workflow(
        &self,
        user: &User,
        redirect_url: &str,
        now: NaiveDateTime,
    ) -> Result<String, UbbleError> {
        let eligibility = user.eligibility(now);
        let content = self
            .provider
            .start_identification(
                user.id,
                user.first_name.as_deref(),
                user.last_name.as_deref(),
                &self.webhook_url,
                redirect_url,
            )
            .await?;

        let identification_id = content
            .identification_id
            .clone()
            .ok_or(UbbleError::IncompleteProviderResponse("identification id"))?;
        let identification_url = content
            .identification_url
            .clone()
            .ok_or(UbbleError::IncompleteProviderResponse("identification url"))?;

        let id = FraudCheckId(self.store().next_id(Sequence::FraudCheck)?);
        let mut check = BeneficiaryFraudCheck::new(
            id,
            user.id,
            FraudCheckType::Ubble,
            FraudCheckStatus::Started,
            identification_id,
            eligibility,
            now,
        );
        check.result_content = Some(FraudCheckContent::Ubble(content));
        let check = self.store().insert_fraud_check(check)?;
        info!(
            user_id = %user.id,
            fraud_check_id = %check.id,
            "Identity check started with the provider"
        );
        Ok(identification_url)
    }

    /// Start a session for `user_id` unless the identity step is not open to them.
    pub async fn begin_identification(
        &self,
        user_id: UserId,
        redirect_url: &str,
        now: NaiveDateTime,
    ) -> Result<String, UbbleError> {
        let user = self.subscription.fetch_user(user_id)?;
        let checks = self.store().user_fraud_checks(user.id)?;
        if !is_user_allowed_to_perform_ubble_check(&user, user.eligibility(now), &checks, now) {
            return Err(UbbleError::NotAllowed(user_id));
        }
        self.start_ubble_workflow(&user, redirect_url, now).await
    }

    /// Refresh the check referenced by a provider notification.
    pub async fn handle_application_status(
        &self,
        identification_id: &str,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, UbbleError> {
        let check = self
            .store()
            .find_fraud_check_by_third_party_id(identification_id)?
            .filter(|check| check.check_type == FraudCheckType::Ubble)
            .ok_or_else(|| UbbleError::UnknownIdentification(identification_id.to_string()))?;
        self.update_ubble_workflow(check, now).await
    }

    /// Pull the provider result into `check` and move the subscription forward.
    pub async fn update_ubble_workflow(
        &self,
        mut check: BeneficiaryFraudCheck,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, UbbleError> {
        let content = self.provider.get_content(&check.third_party_id).await?;
        let status = content.status;

        check.result_content = Some(FraudCheckContent::Ubble(content.clone()));
        check.updated_at = now;
        match status {
            Some(UbbleIdentificationStatus::Initiated | UbbleIdentificationStatus::Processing) => {
                check.status = FraudCheckStatus::Pending;
            }
            Some(UbbleIdentificationStatus::Aborted | UbbleIdentificationStatus::Expired) => {
                check.status = FraudCheckStatus::Canceled;
            }
            _ => {}
        }
        self.store().update_fraud_check(check.clone())?;

        match status {
            Some(UbbleIdentificationStatus::Processed) => self.on_processed(check, &content, now),
            Some(UbbleIdentificationStatus::Processing) => {
                self.add_message(check.user_id, processing_message(), now)?;
                Ok(check)
            }
            _ => Ok(check),
        }
    }

    fn on_processed(
        &self,
        check: BeneficiaryFraudCheck,
        content: &UbbleContent,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, UbbleError> {
        let mut user = self.subscription.fetch_user(check.user_id)?;
        self.subscription
            .update_user_birth_date_if_not_beneficiary(&mut user, content.birth_date, now)?;

        let mut check = self
            .subscription
            .handle_eligibility_difference_between_declaration_and_identity_provider(
                &user, check, now,
            )?;
        self.subscription
            .fraud()
            .on_identity_fraud_check_result(&user, &mut check, now)?;

        let mut user = self.subscription.fetch_user(check.user_id)?;
        match check.status {
            FraudCheckStatus::Ok => {
                if let Some(married_name) = content.married_name.clone() {
                    user.married_name = Some(married_name);
                }
                if let Some(civility) = content.civility() {
                    user.civility = Some(civility);
                }
                self.store().update_user(user.clone())?;
                self.subscription
                    .activate_beneficiary_if_no_missing_step(&mut user, now)?;
            }
            FraudCheckStatus::Ko | FraudCheckStatus::Suspicious => {
                info!(
                    user_id = %user.id,
                    fraud_check_id = %check.id,
                    reason_codes = ?check.reason_codes,
                    "Identity check rejected by the fraud rules"
                );
                let message = ubble_ko_message(&check, self.subscription.support_email());
                self.add_message(user.id, message, now)?;
            }
            _ => {}
        }
        Ok(check)
    }

    fn add_message(
        &self,
        user_id: UserId,
        draft: MessageDraft,
        now: NaiveDateTime,
    ) -> Result<(), UbbleError> {
        let id = MessageId(self.store().next_id(Sequence::Message)?);
        self.store()
            .insert_subscription_message(draft.into_message(id, user_id, now))?;
        Ok(())
    }

    fn store_picture(&self, picture: Option<DownloadedPicture>) -> Result<bool, UbbleError> {
        let Some(picture) = picture else {
            return Ok(false);
        };
        self.storage.store(
            ID_PICTURES_STORAGE_FOLDER,
            &picture.file_name,
            &picture.bytes,
            &picture.content_type,
        )?;
        Ok(true)
    }

    /// Copy both sides of a validated document to the object storage.
    pub async fn archive_ubble_user_id_pictures(
        &self,
        identification_id: &str,
        now: NaiveDateTime,
    ) -> Result<bool, UbbleError> {
        let mut check = self
            .store()
            .find_fraud_check_by_third_party_id(identification_id)?
            .filter(|check| check.check_type == FraudCheckType::Ubble)
            .ok_or_else(|| UbbleError::BeneficiaryFraudCheckMissing(identification_id.to_string()))?;

        if check.status != FraudCheckStatus::Ok {
            return Err(UbbleError::IncompatibleFraudCheckStatus {
                status: check.status.label(),
                identification_id: identification_id.to_string(),
            });
        }

        let content = self.provider.get_content(identification_id).await?;
        let pictures = download_ubble_document_pictures(self.provider.as_ref(), &content, &check).await;

        let front_stored = self.store_picture(pictures.front)?;
        let back_stored = self.store_picture(pictures.back)?;
        let stored = front_stored && back_stored;
        if !stored {
            warn!(
                fraud_check_id = %check.id,
                front_stored,
                back_stored,
                "Identity pictures only partially archived"
            );
        }

        check.id_pictures_stored = Some(stored);
        check.updated_at = now;
        self.store().update_fraud_check(check)?;
        Ok(stored)
    }
}
