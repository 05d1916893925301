use crate::infra::Platform;
use chrono::{NaiveDateTime, Utc};
use pass_culture::config::AppConfig;
use pass_culture::error::AppError;
use pass_culture::finance::reimbursement::ImportMode;
use pass_culture::store::InMemoryStore;
use pass_culture::telemetry;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Maintenance commands run once against the persisted store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Job {
    Anonymize,
    GdprExtract,
    CleanGdprExtracts,
    ImportReimbursementRules { csv: PathBuf, dry_run: bool },
    ArchiveIdPictures { identification_id: String },
}

impl Job {
    fn writes(&self) -> bool {
        !matches!(self, Job::ImportReimbursementRules { dry_run: true, .. })
    }
}

pub(crate) async fn run(job: Job) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let data_path = config.storage.data_path.clone();
    let store = Arc::new(InMemoryStore::load(&data_path).await?);
    let platform = Platform::build(&config, store.clone())?;

    let writes = job.writes();
    execute(&platform, job, Utc::now().naive_utc()).await?;
    if writes {
        store.persist(&data_path).await?;
        info!(path = %data_path.display(), "store snapshot saved");
    }
    Ok(())
}

pub(crate) async fn execute(
    platform: &Platform,
    job: Job,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    match job {
        Job::Anonymize => {
            let inactive = platform.gdpr.anonymize_non_pro_non_beneficiary_users(now)?;
            let beneficiaries = platform.gdpr.anonymize_beneficiary_users(now)?;
            let deposits = platform.gdpr.anonymize_user_deposits(now)?;
            info!(inactive, beneficiaries, deposits, "anonymization job finished");
        }
        Job::GdprExtract => {
            let processed = platform.gdpr.extract_beneficiary_data_command(now)?;
            info!(processed, "gdpr extract job finished");
        }
        Job::CleanGdprExtracts => {
            let deleted = platform.gdpr.clean_gdpr_extracts(now)?;
            info!(deleted, "gdpr extract cleanup finished");
        }
        Job::ImportReimbursementRules { csv, dry_run } => {
            let raw = tokio::fs::read(&csv).await?;
            let mode = if dry_run {
                ImportMode::DryRun
            } else {
                ImportMode::Persist
            };
            let report = platform
                .reimbursement
                .import_rules(Cursor::new(raw), mode, now)?;
            for issue in &report.errors {
                warn!(line = issue.line, message = %issue.message, "rule rejected");
            }
            for issue in &report.warnings {
                warn!(line = issue.line, message = %issue.message, "rule imported with a warning");
            }
            info!(
                file = %csv.display(),
                created = report.created.len(),
                rejected = report.errors.len(),
                dry_run,
                "reimbursement rule import finished"
            );
        }
        Job::ArchiveIdPictures { identification_id } => {
            let stored = platform
                .identity
                .archive_ubble_user_id_pictures(&identification_id, now)
                .await?;
            info!(%identification_id, stored, "identity pictures archive finished");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pass_culture::ids::OffererId;
    use pass_culture::offers::Offerer;
    use pass_culture::store::{OffererRepository, ReimbursementRuleRepository};
    use pass_culture::subscription::ubble::UbbleError;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|day| day.and_hms_opt(3, 0, 0))
            .expect("valid datetime")
    }

    fn platform(root: &std::path::Path) -> (Arc<InMemoryStore>, Platform) {
        let mut config = AppConfig::load().expect("default configuration");
        config.storage.gdpr_extract_folder = root.join("gdpr");
        config.storage.id_pictures_folder = root.join("id_pictures");
        let store = Arc::new(InMemoryStore::new());
        let platform = Platform::build(&config, store.clone()).expect("platform builds");
        (store, platform)
    }

    #[tokio::test]
    async fn import_job_honours_dry_run() {
        let root = tempfile::tempdir().expect("temp dir");
        let (store, platform) = platform(root.path());
        store
            .insert_offerer(Offerer {
                id: OffererId(7),
                name: "Cinéma du port".to_string(),
                siren: Some("987654321".to_string()),
                is_active: true,
                is_validated: true,
            })
            .expect("offerer stored");
        let csv = root.path().join("rules.csv");
        tokio::fs::write(
            &csv,
            "offerer_id,venue_id,offer_id,subcategories,rate,amount,start_date,end_date\n\
             7,,,,0.9,,2024-04-01,\n",
        )
        .await
        .expect("csv written");

        let dry_run = Job::ImportReimbursementRules {
            csv: csv.clone(),
            dry_run: true,
        };
        assert!(!dry_run.writes());
        execute(&platform, dry_run, now()).await.expect("dry run");
        assert!(store.list_rules().expect("rules readable").is_empty());

        execute(
            &platform,
            Job::ImportReimbursementRules { csv, dry_run: false },
            now(),
        )
        .await
        .expect("import");
        assert_eq!(store.list_rules().expect("rules readable").len(), 1);
    }

    #[tokio::test]
    async fn missing_csv_is_an_io_error() {
        let root = tempfile::tempdir().expect("temp dir");
        let (_, platform) = platform(root.path());
        let job = Job::ImportReimbursementRules {
            csv: root.path().join("absent.csv"),
            dry_run: false,
        };
        match execute(&platform, job, now()).await {
            Err(AppError::Io(_)) => {}
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gdpr_jobs_run_on_an_empty_store() {
        let root = tempfile::tempdir().expect("temp dir");
        let (_, platform) = platform(root.path());
        for job in [Job::Anonymize, Job::GdprExtract, Job::CleanGdprExtracts] {
            execute(&platform, job, now()).await.expect("job runs");
        }
    }

    #[tokio::test]
    async fn archiving_an_unknown_identification_fails() {
        let root = tempfile::tempdir().expect("temp dir");
        let (_, platform) = platform(root.path());
        let job = Job::ArchiveIdPictures {
            identification_id: "unknown".to_string(),
        };
        match execute(&platform, job, now()).await {
            Err(AppError::Ubble(UbbleError::BeneficiaryFraudCheckMissing(id))) => {
                assert_eq!(id, "unknown")
            }
            other => panic!("expected BeneficiaryFraudCheckMissing, got {other:?}"),
        }
    }
}
