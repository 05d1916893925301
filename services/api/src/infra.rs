use metrics_exporter_prometheus::PrometheusHandle;
use pass_culture::bookings::BookingService;
use pass_culture::config::AppConfig;
use pass_culture::error::AppError;
use pass_culture::finance::reimbursement::ReimbursementRuleService;
use pass_culture::gdpr::GdprService;
use pass_culture::notifications::InMemoryNotifier;
use pass_culture::offers::OfferService;
use pass_culture::storage::{LocalObjectStorage, ObjectStorage};
use pass_culture::store::InMemoryStore;
use pass_culture::subscription::ubble::{UbbleClient, UbbleError, UbbleWorkflow};
use pass_culture::subscription::SubscriptionService;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Subscription = SubscriptionService<InMemoryStore, InMemoryNotifier>;
pub(crate) type Identity = UbbleWorkflow<InMemoryStore, InMemoryNotifier, UbbleClient>;
pub(crate) type Gdpr = GdprService<InMemoryStore, LocalObjectStorage>;

/// Every service of the platform wired on one store.
pub(crate) struct Platform {
    pub(crate) store: Arc<InMemoryStore>,
    pub(crate) subscription: Arc<Subscription>,
    pub(crate) identity: Arc<Identity>,
    pub(crate) bookings: Arc<BookingService<InMemoryStore, InMemoryNotifier>>,
    pub(crate) offers: Arc<OfferService<InMemoryStore, InMemoryNotifier>>,
    pub(crate) reimbursement: Arc<ReimbursementRuleService<InMemoryStore>>,
    pub(crate) gdpr: Arc<Gdpr>,
}

impl Platform {
    pub(crate) fn build(config: &AppConfig, store: Arc<InMemoryStore>) -> Result<Self, AppError> {
        let notifier = Arc::new(InMemoryNotifier::new());
        let subscription = Arc::new(SubscriptionService::new(
            store.clone(),
            notifier.clone(),
            config.support_email.clone(),
        ));

        let client = UbbleClient::new(&config.ubble).map_err(UbbleError::from)?;
        let pictures: Arc<dyn ObjectStorage> =
            Arc::new(LocalObjectStorage::new(&config.storage.id_pictures_folder));
        let identity = Arc::new(UbbleWorkflow::new(
            subscription.clone(),
            Arc::new(client),
            pictures,
            config.ubble.webhook_url.clone(),
        ));

        let archives = Arc::new(LocalObjectStorage::new(&config.storage.gdpr_extract_folder));
        let gdpr = Arc::new(GdprService::new(store.clone(), archives, config.gdpr));

        Ok(Self {
            bookings: Arc::new(BookingService::new(store.clone(), notifier.clone())),
            offers: Arc::new(OfferService::new(store.clone(), notifier)),
            reimbursement: Arc::new(ReimbursementRuleService::new(store.clone())),
            subscription,
            identity,
            gdpr,
            store,
        })
    }
}
