use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{error, info};

use super::models::{StartIdentificationRequest, UbbleIdentificationResponse};
use crate::config::UbbleConfig;
use crate::fraud::domain::UbbleContent;
use crate::ids::UserId;

const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";
const USER_AGENT: &str = "pass-culture-api/0.1";

/// Failure while talking to a third-party HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExternalApiError {
    pub message: String,
    pub status_code: Option<u16>,
    pub is_retryable: bool,
}

impl ExternalApiError {
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: Some(status.as_u16()),
            is_retryable: status.is_server_error(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            is_retryable: true,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            is_retryable: false,
        }
    }
}

/// Raw picture body with the content type announced by the file host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureDownload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Remote identity verification provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn start_identification(
        &self,
        user_id: UserId,
        first_name: Option<&str>,
        last_name: Option<&str>,
        webhook_url: &str,
        redirect_url: &str,
    ) -> Result<UbbleContent, ExternalApiError>;

    async fn get_content(&self, identification_id: &str) -> Result<UbbleContent, ExternalApiError>;

    async fn download_picture(&self, url: &str) -> Result<PictureDownload, ExternalApiError>;
}

#[derive(Debug, Clone)]
pub struct UbbleClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl UbbleClient {
    pub fn new(config: &UbbleConfig) -> Result<Self, ExternalApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| ExternalApiError::decode(format!("invalid http client: {error}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    fn identifications_url(&self) -> String {
        format!("{}/identifications/", self.base_url)
    }

    async fn read_identification(
        response: reqwest::Response,
        action: &str,
    ) -> Result<UbbleContent, ExternalApiError> {
        let status = response.status();
        if !status.is_success() {
            error!(status_code = status.as_u16(), action, "Ubble API returned an error");
            return Err(ExternalApiError::from_status(
                status,
                format!("Error while {action}: unexpected status {status}"),
            ));
        }
        let payload: UbbleIdentificationResponse = response.json().await.map_err(|error| {
            ExternalApiError::decode(format!("Error while {action}: invalid payload ({error})"))
        })?;
        Ok(payload.to_content())
    }
}

#[async_trait]
impl IdentityProvider for UbbleClient {
    async fn start_identification(
        &self,
        user_id: UserId,
        first_name: Option<&str>,
        last_name: Option<&str>,
        webhook_url: &str,
        redirect_url: &str,
    ) -> Result<UbbleContent, ExternalApiError> {
        let body = StartIdentificationRequest {
            user_id,
            first_name: first_name.map(str::to_string),
            last_name: last_name.map(str::to_string),
            webhook_url: webhook_url.to_string(),
            redirect_url: redirect_url.to_string(),
        }
        .to_json_api();

        let response = self
            .client
            .post(self.identifications_url())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(ACCEPT, JSON_API_MEDIA_TYPE)
            .header(CONTENT_TYPE, JSON_API_MEDIA_TYPE)
            .json(&body)
            .send()
            .await
            .map_err(|error| ExternalApiError::network(format!("Ubble unreachable: {error}")))?;

        let content = Self::read_identification(response, "starting identification").await?;
        info!(
            user_id = %user_id,
            identification_id = content.identification_id.as_deref().unwrap_or_default(),
            "Valid response from Ubble while starting identification"
        );
        Ok(content)
    }

    async fn get_content(&self, identification_id: &str) -> Result<UbbleContent, ExternalApiError> {
        let response = self
            .client
            .get(format!("{}{identification_id}/", self.identifications_url()))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(ACCEPT, JSON_API_MEDIA_TYPE)
            .send()
            .await
            .map_err(|error| ExternalApiError::network(format!("Ubble unreachable: {error}")))?;

        Self::read_identification(response, "fetching identification").await
    }

    async fn download_picture(&self, url: &str) -> Result<PictureDownload, ExternalApiError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| ExternalApiError::network(format!("file host unreachable: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalApiError::from_status(
                status,
                format!("unexpected status {status} while downloading picture"),
            ));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|error| ExternalApiError::network(format!("picture body lost: {error}")))?;

        Ok(PictureDownload {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
