//! JSON:API payloads exchanged with the identity provider.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::fraud::domain::{UbbleContent, UbbleIdentificationStatus};
use crate::ids::UserId;

#[derive(Debug, Clone, Deserialize)]
pub struct UbbleIdentificationResponse {
    pub data: UbbleIdentificationData,
    #[serde(default)]
    pub included: Vec<UbbleIncluded>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UbbleIdentificationData {
    pub attributes: UbbleIdentificationAttributes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UbbleIdentificationAttributes {
    pub identification_id: String,
    #[serde(default)]
    pub identification_url: Option<String>,
    pub status: UbbleIdentificationStatus,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Included resources the workflow reads; the others are skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UbbleIncluded {
    Documents { attributes: DocumentAttributes },
    DocumentChecks { attributes: DocumentCheckAttributes },
    ReferenceDataChecks { attributes: ReferenceDataCheckAttributes },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DocumentAttributes {
    pub birth_date: Option<NaiveDate>,
    pub document_number: Option<String>,
    pub document_type: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub married_name: Option<String>,
    pub gender: Option<String>,
    pub signed_image_front_url: Option<String>,
    pub signed_image_back_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DocumentCheckAttributes {
    pub expiry_date_score: Option<f64>,
    pub supported: Option<f64>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceDataCheckAttributes {
    pub score: Option<f64>,
}

impl UbbleIdentificationResponse {
    fn document(&self) -> Option<&DocumentAttributes> {
        self.included.iter().find_map(|resource| match resource {
            UbbleIncluded::Documents { attributes } => Some(attributes),
            _ => None,
        })
    }

    fn document_check(&self) -> Option<&DocumentCheckAttributes> {
        self.included.iter().find_map(|resource| match resource {
            UbbleIncluded::DocumentChecks { attributes } => Some(attributes),
            _ => None,
        })
    }

    fn reference_data_check(&self) -> Option<&ReferenceDataCheckAttributes> {
        self.included.iter().find_map(|resource| match resource {
            UbbleIncluded::ReferenceDataChecks { attributes } => Some(attributes),
            _ => None,
        })
    }

    /// Flatten the response into the content stored on the fraud check.
    pub fn to_content(&self) -> UbbleContent {
        let attributes = &self.data.attributes;
        let document = self.document().cloned().unwrap_or_default();
        let document_check = self.document_check().cloned().unwrap_or_default();

        UbbleContent {
            status: Some(attributes.status),
            score: attributes.score,
            comment: attributes.comment.clone(),
            birth_date: document.birth_date,
            first_name: document.first_name,
            last_name: document.last_name,
            married_name: document.married_name,
            gender: document.gender,
            document_type: document.document_type,
            id_document_number: document.document_number,
            expiry_date_score: document_check.expiry_date_score,
            supported: document_check.supported,
            reference_data_check_score: self.reference_data_check().and_then(|check| check.score),
            identification_id: Some(attributes.identification_id.clone()),
            identification_url: attributes.identification_url.clone(),
            registration_datetime: attributes.created_at.map(|created| created.naive_utc()),
            signed_image_front_url: document.signed_image_front_url,
            signed_image_back_url: document.signed_image_back_url,
        }
    }
}

/// Body of the identification creation request.
#[derive(Debug, Clone, Serialize)]
pub struct StartIdentificationRequest {
    pub user_id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub webhook_url: String,
    pub redirect_url: String,
}

impl StartIdentificationRequest {
    pub fn to_json_api(&self) -> serde_json::Value {
        json!({
            "data": {
                "type": "identifications",
                "attributes": {
                    "identification-form": {
                        "external-user-id": self.user_id.0,
                        "phone-number": null,
                    },
                    "reference-data": {
                        "first-name": self.first_name,
                        "last-name": self.last_name,
                    },
                    "webhook": self.webhook_url,
                    "redirect_url": self.redirect_url,
                }
            }
        })
    }
}
