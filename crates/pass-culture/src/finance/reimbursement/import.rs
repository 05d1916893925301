//! CSV rows describing custom reimbursement rules.
//!
//! Header: `offerer_id,venue_id,offer_id,subcategories,rate,amount,start_date,end_date`.
//! Subcategories are separated by `|`, dates are `YYYY-MM-DD`, the rate is a decimal between 0
//! and 1 and the amount is in euros.

use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use super::rule::{CustomReimbursementRule, NewReimbursementRule, Rate};
use crate::ids::{OfferId, OffererId, VenueId};

const RATE_SCALE: u32 = 4;
const AMOUNT_SCALE: u32 = 2;

/// Problem attached to one line of the imported file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportIssue {
    pub line: u64,
    pub message: String,
}

impl ImportIssue {
    pub fn new(line: u64, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub dry_run: bool,
    pub created: Vec<CustomReimbursementRule>,
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One CSV line: the parsed rule or the reason it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub line: u64,
    pub rule: Result<NewReimbursementRule, String>,
}

#[derive(Debug, Deserialize)]
struct RuleRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    offerer_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    venue_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    offer_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    subcategories: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rate: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    start_date: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    end_date: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_id(field: &str, value: Option<&str>) -> Result<Option<u64>, String> {
    value
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| format!("{field} invalide : {raw}"))
        })
        .transpose()
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDateTime>, String> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .ok_or_else(|| format!("{field} invalide : {raw} (format attendu AAAA-MM-JJ)"))
        })
        .transpose()
}

/// Fixed-point decimal: `parse_decimal("12.5", 2) == Some(1250)`.
pub(crate) fn parse_decimal(raw: &str, scale: u32) -> Option<i64> {
    let raw = raw.trim().replace(',', ".");
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, raw),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.len() > scale as usize
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let padded = format!("{fraction:0<width$}", width = scale as usize);
    let fraction: i64 = if padded.is_empty() { 0 } else { padded.parse().ok()? };
    let value = whole.checked_mul(10_i64.pow(scale))?.checked_add(fraction)?;
    Some(if negative { -value } else { value })
}

impl RuleRow {
    fn into_new_rule(self) -> Result<NewReimbursementRule, String> {
        let rate = self
            .rate
            .as_deref()
            .map(|raw| {
                parse_decimal(raw, RATE_SCALE)
                    .map(Rate)
                    .ok_or_else(|| format!("taux invalide : {raw}"))
            })
            .transpose()?;
        let amount = self
            .amount
            .as_deref()
            .map(|raw| parse_decimal(raw, AMOUNT_SCALE).ok_or_else(|| format!("montant invalide : {raw}")))
            .transpose()?;
        let subcategories = self
            .subcategories
            .as_deref()
            .map(|raw| {
                raw.split('|')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(NewReimbursementRule {
            offerer_id: parse_id("offerer_id", self.offerer_id.as_deref())?.map(OffererId),
            venue_id: parse_id("venue_id", self.venue_id.as_deref())?.map(VenueId),
            offer_id: parse_id("offer_id", self.offer_id.as_deref())?.map(OfferId),
            subcategories,
            rate,
            amount,
            start_date: parse_date("start_date", self.start_date.as_deref())?,
            end_date: parse_date("end_date", self.end_date.as_deref())?,
        })
    }
}

/// Parse every data line. Only a malformed header fails the whole file.
pub fn parse_rule_rows<R: Read>(reader: R) -> Result<Vec<ParsedRow>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(error) => {
                let line = error.position().map(|position| position.line()).unwrap_or(0);
                rows.push(ParsedRow {
                    line,
                    rule: Err(format!("ligne illisible : {error}")),
                });
                continue;
            }
        };
        let line = record.position().map(|position| position.line()).unwrap_or(0);
        let rule = record
            .deserialize::<RuleRow>(Some(&headers))
            .map_err(|error| format!("ligne illisible : {error}"))
            .and_then(RuleRow::into_new_rule);
        rows.push(ParsedRow { line, rule });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "offerer_id,venue_id,offer_id,subcategories,rate,amount,start_date,end_date\n";

    #[test]
    fn decimals_are_read_as_fixed_point() {
        assert_eq!(parse_decimal("0.95", 4), Some(9_500));
        assert_eq!(parse_decimal("1", 4), Some(10_000));
        assert_eq!(parse_decimal("12,5", 2), Some(12_50));
        assert_eq!(parse_decimal(".5", 2), Some(50));
        assert_eq!(parse_decimal("1.234", 2), None);
        assert_eq!(parse_decimal("abc", 2), None);
        assert_eq!(parse_decimal("-3", 2), Some(-3_00));
    }

    #[test]
    fn rows_keep_their_line_and_blank_cells_become_none() {
        let csv = format!(
            "{HEADER} , 12 , , SEANCE_CINE|LIVRE_PAPIER , 0.95 , , 2023-07-01 , \n,,8,,,7.5,2023-07-01,2023-12-31\n"
        );
        let rows = parse_rule_rows(csv.as_bytes()).expect("header readable");
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].line, 2);
        let venue_rule = rows[0].rule.clone().expect("parsed");
        assert_eq!(venue_rule.venue_id, Some(VenueId(12)));
        assert_eq!(venue_rule.offerer_id, None);
        assert_eq!(venue_rule.subcategories, vec!["SEANCE_CINE", "LIVRE_PAPIER"]);
        assert_eq!(venue_rule.rate, Some(Rate(9_500)));
        assert_eq!(venue_rule.end_date, None);

        let offer_rule = rows[1].rule.clone().expect("parsed");
        assert_eq!(offer_rule.offer_id, Some(OfferId(8)));
        assert_eq!(offer_rule.amount, Some(7_50));
        assert!(offer_rule.end_date.is_some());
    }

    #[test]
    fn bad_cells_only_fail_their_line() {
        let csv = format!("{HEADER}x,,,,0.5,,2023-07-01,\n1,,,,0.5,,01/07/2023,\n1,,,,0.5,,2023-07-01,\n");
        let rows = parse_rule_rows(csv.as_bytes()).expect("header readable");

        assert_eq!(rows[0].rule, Err("offerer_id invalide : x".to_string()));
        match &rows[1].rule {
            Err(message) => assert!(message.starts_with("start_date invalide")),
            other => panic!("expected date error, got {other:?}"),
        }
        assert!(rows[2].rule.is_ok());
    }
}
