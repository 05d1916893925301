use std::collections::BTreeMap;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Field-keyed validation messages returned to clients as a 400 payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrors {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ApiErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add_error(field, message);
        errors
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: ApiErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was collected, the accumulated errors otherwise.
    pub fn into_result(self) -> Result<(), ApiErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ApiErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .errors
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ApiErrors {}

impl IntoResponse for ApiErrors {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_messages_per_field() {
        let mut errors = ApiErrors::single("price", "Le prix doit être positif");
        errors.merge(ApiErrors::single("price", "autre"));
        errors.add_error("quantity", "La quantité doit être positive");

        assert_eq!(errors.messages("price").len(), 2);
        assert_eq!(
            errors.to_string(),
            "price: Le prix doit être positif, autre; quantity: La quantité doit être positive"
        );
    }

    #[test]
    fn serializes_under_errors_key() {
        let errors = ApiErrors::single("stock", "Ce stock n'est pas réservable");
        let value = serde_json::to_value(&errors).expect("serializes");
        assert_eq!(value["errors"]["stock"][0], "Ce stock n'est pas réservable");
    }
}
