use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{FraudCheckId, FraudReviewId, UserId};
use crate::users::{Civility, EligibilityType};

pub const FRAUD_RESULT_REASON_SEPARATOR: &str = ";";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudCheckType {
    Ubble,
    Dms,
    Educonnect,
    PhoneValidation,
    HonorStatement,
    ProfileCompletion,
    InternalReview,
}

pub const IDENTITY_CHECK_TYPES: [FraudCheckType; 3] = [
    FraudCheckType::Ubble,
    FraudCheckType::Dms,
    FraudCheckType::Educonnect,
];

impl FraudCheckType {
    pub fn is_identity_check(&self) -> bool {
        IDENTITY_CHECK_TYPES.contains(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudCheckStatus {
    Started,
    Pending,
    Ok,
    Ko,
    Suspicious,
    Canceled,
    Error,
}

impl FraudCheckStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FraudCheckStatus::Started => "STARTED",
            FraudCheckStatus::Pending => "PENDING",
            FraudCheckStatus::Ok => "OK",
            FraudCheckStatus::Ko => "KO",
            FraudCheckStatus::Suspicious => "SUSPICIOUS",
            FraudCheckStatus::Canceled => "CANCELED",
            FraudCheckStatus::Error => "ERROR",
        }
    }
}

/// Verdict of a single fraud item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudStatus {
    Ok,
    Ko,
    Suspicious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudReasonCode {
    AgeNotValid,
    AgeTooOld,
    AgeTooYoung,
    BlacklistedPhoneNumber,
    DuplicateIdPieceNumber,
    DuplicateIne,
    DuplicateUser,
    EligibilityChanged,
    EmailNotValidated,
    EmptyIdPieceNumber,
    IdCheckBlocked,
    IdCheckDataMatch,
    IdCheckExpired,
    IdCheckNotAuthentic,
    IdCheckNotSupported,
    IdCheckUnprocessable,
    InvalidIdPieceNumber,
    InvalidPhoneCountryCode,
    MissingRequiredData,
    NameIncorrect,
    NotEligible,
    PhoneAlreadyExists,
    PhoneValidationAttemptsLimitReached,
    SmsSendingLimitReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudItem {
    pub status: FraudStatus,
    pub detail: String,
    #[serde(default)]
    pub reason_codes: Vec<FraudReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_id: Option<UserId>,
}

impl FraudItem {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            status: FraudStatus::Ok,
            detail: detail.into(),
            reason_codes: Vec::new(),
            duplicate_id: None,
        }
    }

    pub fn ko(detail: impl Into<String>, code: FraudReasonCode) -> Self {
        Self {
            status: FraudStatus::Ko,
            detail: detail.into(),
            reason_codes: vec![code],
            duplicate_id: None,
        }
    }

    pub fn suspicious(detail: impl Into<String>, code: FraudReasonCode) -> Self {
        Self {
            status: FraudStatus::Suspicious,
            detail: detail.into(),
            reason_codes: vec![code],
            duplicate_id: None,
        }
    }

    pub fn with_duplicate(mut self, duplicate_id: UserId) -> Self {
        self.duplicate_id = Some(duplicate_id);
        self
    }
}

/// Read access shared by every identity provider payload.
pub trait IdentityDetails {
    fn first_name(&self) -> Option<&str>;
    fn last_name(&self) -> Option<&str>;
    fn married_name(&self) -> Option<&str>;
    fn birth_date(&self) -> Option<NaiveDate>;
    fn id_piece_number(&self) -> Option<&str>;
    fn ine_hash(&self) -> Option<&str> {
        None
    }
    fn civility(&self) -> Option<Civility>;
    fn registration_datetime(&self) -> Option<NaiveDateTime>;
    fn postal_code(&self) -> Option<&str> {
        None
    }
    fn city(&self) -> Option<&str> {
        None
    }

    fn has_identity(&self) -> bool {
        self.first_name().is_some() && self.last_name().is_some() && self.birth_date().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UbbleIdentificationStatus {
    Uninitiated,
    Initiated,
    Processing,
    Processed,
    Aborted,
    Expired,
}

/// Score scale used by the identity provider: 1 valid, 0 invalid, -1 undecidable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UbbleScore {
    Valid,
    Invalid,
    Undecidable,
}

impl UbbleScore {
    pub fn from_value(value: f64) -> Option<Self> {
        if (value - 1.0).abs() < f64::EPSILON {
            Some(UbbleScore::Valid)
        } else if value.abs() < f64::EPSILON {
            Some(UbbleScore::Invalid)
        } else if (value + 1.0).abs() < f64::EPSILON {
            Some(UbbleScore::Undecidable)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UbbleContent {
    pub status: Option<UbbleIdentificationStatus>,
    pub score: Option<f64>,
    pub comment: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub married_name: Option<String>,
    pub gender: Option<String>,
    pub document_type: Option<String>,
    pub id_document_number: Option<String>,
    pub expiry_date_score: Option<f64>,
    pub supported: Option<f64>,
    pub reference_data_check_score: Option<f64>,
    pub identification_id: Option<String>,
    pub identification_url: Option<String>,
    pub registration_datetime: Option<NaiveDateTime>,
    pub signed_image_front_url: Option<String>,
    pub signed_image_back_url: Option<String>,
}

impl IdentityDetails for UbbleContent {
    fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }
    fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }
    fn married_name(&self) -> Option<&str> {
        self.married_name.as_deref()
    }
    fn birth_date(&self) -> Option<NaiveDate> {
        self.birth_date
    }
    fn id_piece_number(&self) -> Option<&str> {
        self.id_document_number.as_deref()
    }
    fn civility(&self) -> Option<Civility> {
        self.gender.as_deref().and_then(Civility::from_gender)
    }
    fn registration_datetime(&self) -> Option<NaiveDateTime> {
        self.registration_datetime
    }
}

/// Identity payload for file-based procedures (DMS) and the school directory (Educonnect).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCheckContent {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub married_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub id_piece_number: Option<String>,
    pub ine_hash: Option<String>,
    pub civility: Option<Civility>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub registration_datetime: Option<NaiveDateTime>,
    pub procedure_number: Option<u64>,
}

impl IdentityDetails for IdentityCheckContent {
    fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }
    fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }
    fn married_name(&self) -> Option<&str> {
        self.married_name.as_deref()
    }
    fn birth_date(&self) -> Option<NaiveDate> {
        self.birth_date
    }
    fn id_piece_number(&self) -> Option<&str> {
        self.id_piece_number.as_deref()
    }
    fn ine_hash(&self) -> Option<&str> {
        self.ine_hash.as_deref()
    }
    fn civility(&self) -> Option<Civility> {
        self.civility
    }
    fn registration_datetime(&self) -> Option<NaiveDateTime> {
        self.registration_datetime
    }
    fn postal_code(&self) -> Option<&str> {
        self.postal_code.as_deref()
    }
    fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCompletionContent {
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub activity: String,
    pub school_type: Option<String>,
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FraudCheckContent {
    Ubble(UbbleContent),
    Identity(IdentityCheckContent),
    PhoneValidation { phone_number: Option<String> },
    ProfileCompletion(ProfileCompletionContent),
}

impl FraudCheckContent {
    pub fn identity(&self) -> Option<&dyn IdentityDetails> {
        match self {
            FraudCheckContent::Ubble(content) => Some(content),
            FraudCheckContent::Identity(content) => Some(content),
            FraudCheckContent::PhoneValidation { .. } | FraudCheckContent::ProfileCompletion(_) => {
                None
            }
        }
    }

    pub fn as_ubble(&self) -> Option<&UbbleContent> {
        match self {
            FraudCheckContent::Ubble(content) => Some(content),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeneficiaryFraudCheck {
    pub id: FraudCheckId,
    pub user_id: UserId,
    pub check_type: FraudCheckType,
    pub status: FraudCheckStatus,
    pub third_party_id: String,
    pub result_content: Option<FraudCheckContent>,
    pub reason: Option<String>,
    #[serde(default)]
    pub reason_codes: Vec<FraudReasonCode>,
    pub eligibility_type: Option<EligibilityType>,
    pub date_created: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub id_pictures_stored: Option<bool>,
}

impl BeneficiaryFraudCheck {
    pub fn new(
        id: FraudCheckId,
        user_id: UserId,
        check_type: FraudCheckType,
        status: FraudCheckStatus,
        third_party_id: impl Into<String>,
        eligibility_type: Option<EligibilityType>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            user_id,
            check_type,
            status,
            third_party_id: third_party_id.into(),
            result_content: None,
            reason: None,
            reason_codes: Vec::new(),
            eligibility_type,
            date_created: now,
            updated_at: now,
            id_pictures_stored: None,
        }
    }

    pub fn identity(&self) -> Option<&dyn IdentityDetails> {
        self.result_content.as_ref().and_then(FraudCheckContent::identity)
    }

    pub fn has_filled_identity(&self) -> bool {
        self.check_type.is_identity_check()
            && self.identity().map(|identity| identity.has_identity()).unwrap_or(false)
    }

    /// Earliest of the check creation and the registration reported by the provider.
    pub fn min_date_between_creation_and_registration(&self) -> NaiveDateTime {
        match self.identity().and_then(|identity| identity.registration_datetime()) {
            Some(registered) if registered < self.date_created => registered,
            _ => self.date_created,
        }
    }

    /// Source label written on deposits created from this check.
    pub fn detailed_source(&self) -> String {
        let provider = match self.check_type {
            FraudCheckType::Ubble => "ubble",
            FraudCheckType::Dms => "démarches simplifiées",
            FraudCheckType::Educonnect => "éduconnect",
            FraudCheckType::PhoneValidation => "phone validation",
            FraudCheckType::HonorStatement => "honor statement",
            FraudCheckType::ProfileCompletion => "profile completion",
            FraudCheckType::InternalReview => "revue manuelle",
        };
        format!("dossier {provider} [{}]", self.third_party_id)
    }

    pub fn append_reason(&mut self, message: &str) {
        self.reason = Some(match self.reason.take() {
            Some(reason) if !reason.is_empty() => {
                format!("{reason} {FRAUD_RESULT_REASON_SEPARATOR} {message}")
            }
            _ => message.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudReviewStatus {
    Ok,
    Ko,
    RedirectedToDms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryFraudReview {
    pub id: FraudReviewId,
    pub user_id: UserId,
    pub author_id: UserId,
    pub review: FraudReviewStatus,
    pub reason: Option<String>,
    pub eligibility_type: Option<EligibilityType>,
    pub date_reviewed: NaiveDateTime,
}
