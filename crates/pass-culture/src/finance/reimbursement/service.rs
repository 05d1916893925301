use std::io::Read;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::import::{parse_rule_rows, ImportIssue, ImportReport};
use super::rule::{
    edit_reimbursement_rule, validate_reimbursement_rule, CustomReimbursementRule,
    NewReimbursementRule, ReimbursementRuleError, RuleTarget, RuleValue,
};
use crate::ids::{ReimbursementRuleId, Sequence};
use crate::store::{RepositoryError, Store};

#[derive(Debug, thiserror::Error)]
pub enum ReimbursementServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("unreadable CSV file: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Rule(#[from] ReimbursementRuleError),
    #[error("reimbursement rule {0} not found")]
    RuleNotFound(ReimbursementRuleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Persist,
    DryRun,
}

pub struct ReimbursementRuleService<S> {
    store: Arc<S>,
}

impl<S> ReimbursementRuleService<S>
where
    S: Store + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn list_rules(&self) -> Result<Vec<CustomReimbursementRule>, ReimbursementServiceError> {
        Ok(self.store.list_rules()?)
    }

    /// Rules may only target existing offerers and offers, or venues that are pricing points.
    fn target_error(
        &self,
        target: RuleTarget,
    ) -> Result<Option<ReimbursementRuleError>, ReimbursementServiceError> {
        let error = match target {
            RuleTarget::Offerer(offerer_id) => self
                .store
                .fetch_offerer(offerer_id)?
                .is_none()
                .then_some(ReimbursementRuleError::AmbiguousTarget),
            RuleTarget::Offer(offer_id) => self
                .store
                .fetch_offer(offer_id)?
                .is_none()
                .then_some(ReimbursementRuleError::AmbiguousTarget),
            RuleTarget::Venue(venue_id) => match self.store.fetch_venue(venue_id)? {
                None => Some(ReimbursementRuleError::AmbiguousTarget),
                Some(venue) if venue.siret.is_none() => Some(ReimbursementRuleError::NotAPricingPoint {
                    venue_id,
                    name: venue.name,
                }),
                Some(_) => None,
            },
        };
        Ok(error)
    }

    /// Highest non-deleted stock price of an amount rule's offer, when it is lower than the amount.
    fn amount_warning(
        &self,
        rule: &CustomReimbursementRule,
    ) -> Result<Option<String>, ReimbursementServiceError> {
        let (RuleTarget::Offer(offer_id), RuleValue::Amount(amount)) = (rule.target, rule.value)
        else {
            return Ok(None);
        };
        let highest_price = self
            .store
            .offer_stocks(offer_id)?
            .iter()
            .filter(|stock| !stock.is_soft_deleted)
            .map(|stock| stock.price)
            .max();
        Ok(highest_price.filter(|price| amount > *price).map(|price| {
            format!(
                "Le montant de remboursement ({}) dépasse le prix le plus élevé de l'offre {offer_id} ({})",
                format_euros(amount),
                format_euros(price)
            )
        }))
    }

    /// Create one rule per valid CSV line. Lines fail independently; nothing is written in dry-run.
    pub fn import_rules<R: Read>(
        &self,
        reader: R,
        mode: ImportMode,
        now: NaiveDateTime,
    ) -> Result<ImportReport, ReimbursementServiceError> {
        let rows = parse_rule_rows(reader)?;
        let mut existing = self.store.list_rules()?;
        let mut seen: Vec<(u64, NewReimbursementRule)> = Vec::new();
        let mut highest_id = existing.iter().map(|rule| rule.id.0).max().unwrap_or(0);
        let mut report = ImportReport {
            dry_run: mode == ImportMode::DryRun,
            ..ImportReport::default()
        };

        for row in rows {
            let new_rule = match row.rule {
                Ok(new_rule) => new_rule,
                Err(message) => {
                    report.errors.push(ImportIssue::new(row.line, message));
                    continue;
                }
            };

            if let Some((first_line, _)) = seen.iter().find(|(_, previous)| *previous == new_rule) {
                report.warnings.push(ImportIssue::new(
                    row.line,
                    format!("Ligne identique à la ligne {first_line}"),
                ));
            }
            seen.push((row.line, new_rule.clone()));

            let mut rule = match new_rule.into_rule(ReimbursementRuleId(highest_id + 1)) {
                Ok(rule) => rule,
                Err(error) => {
                    report.errors.push(ImportIssue::new(row.line, error.to_string()));
                    continue;
                }
            };
            if let Some(error) = self.target_error(rule.target)? {
                report.errors.push(ImportIssue::new(row.line, error.to_string()));
                continue;
            }
            if let Err(errors) = validate_reimbursement_rule(&rule, &existing, now, true) {
                report.errors.push(ImportIssue::new(row.line, errors.to_string()));
                continue;
            }
            if let Some(message) = self.amount_warning(&rule)? {
                report.warnings.push(ImportIssue::new(row.line, message));
            }

            if mode == ImportMode::Persist {
                rule.id = ReimbursementRuleId(self.store.next_id(Sequence::ReimbursementRule)?);
                self.store.insert_rule(rule.clone())?;
            }
            highest_id = highest_id.max(rule.id.0);
            existing.push(rule.clone());
            report.created.push(rule);
        }

        info!(
            created = report.created.len(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            dry_run = report.dry_run,
            "Imported custom reimbursement rules"
        );
        Ok(report)
    }

    pub fn edit_rule_end_date(
        &self,
        rule_id: ReimbursementRuleId,
        end_date: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<CustomReimbursementRule, ReimbursementServiceError> {
        let mut rule = self
            .store
            .fetch_rule(rule_id)?
            .ok_or(ReimbursementServiceError::RuleNotFound(rule_id))?;
        let existing = self.store.list_rules()?;
        if let Err(error) = edit_reimbursement_rule(&mut rule, end_date, &existing, now) {
            warn!(rule_id = %rule_id, error = %error, "Reimbursement rule end date refused");
            return Err(error.into());
        }
        self.store.update_rule(rule.clone())?;
        Ok(rule)
    }
}

fn format_euros(cents: i64) -> String {
    format!("{}.{:02} €", cents / 100, (cents % 100).abs())
}
