//! Download of the identity document pictures signed by the provider.

use std::fmt;

use reqwest::StatusCode;
use tracing::{error, info, warn};

use super::client::IdentityProvider;
use crate::fraud::domain::{BeneficiaryFraudCheck, UbbleContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureSide {
    Front,
    Back,
}

impl fmt::Display for PictureSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PictureSide::Front => write!(f, "front"),
            PictureSide::Back => write!(f, "back"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPicture {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPictures {
    pub front: Option<DownloadedPicture>,
    pub back: Option<DownloadedPicture>,
}

fn file_extension(content_type: Option<&str>, url: &str) -> String {
    let parsed = content_type.and_then(|value| value.trim().parse::<mime::Mime>().ok());
    if let Some(parsed) = parsed {
        match parsed.essence_str() {
            "image/png" => return "png".to_string(),
            "image/jpeg" | "image/jpg" => return "jpg".to_string(),
            "application/pdf" => return "pdf".to_string(),
            _ => {
                if let Some(extension) =
                    mime_guess::get_mime_extensions(&parsed).and_then(|all| all.first())
                {
                    return (*extension).to_string();
                }
            }
        }
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit_once('/')
        .map(|(_, file)| file)
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_else(|| "jpg".to_string())
}

/// Fetch one side of the document; failures are logged and reported as `None`.
pub async fn download_ubble_picture<P>(
    provider: &P,
    check: &BeneficiaryFraudCheck,
    url: &str,
    side: PictureSide,
) -> Option<DownloadedPicture>
where
    P: IdentityProvider + ?Sized,
{
    info!(url, fraud_check_id = %check.id, "External service called");
    let download = match provider.download_picture(url).await {
        Ok(download) => download,
        Err(failure) if failure.status_code == Some(StatusCode::FORBIDDEN.as_u16()) => {
            warn!(url, user_id = %check.user_id, "Unable to retrieve ubble file, request is expired");
            return None;
        }
        Err(failure) => {
            error!(
                url,
                user_id = %check.user_id,
                status_code = failure.status_code,
                error = %failure,
                "Unable to retrieve ubble file, unknown error"
            );
            return None;
        }
    };

    if download.bytes.is_empty() {
        error!(
            url,
            user_id = %check.user_id,
            "Ubble identity file URL given but uploaded file is empty"
        );
        return None;
    }

    let extension = file_extension(download.content_type.as_deref(), url);
    let content_type = download
        .content_type
        .unwrap_or_else(|| mime_guess::from_ext(&extension).first_or_octet_stream().to_string());
    Some(DownloadedPicture {
        file_name: format!("{}-{}-{side}.{extension}", check.user_id, check.third_party_id),
        content_type,
        bytes: download.bytes,
    })
}

pub async fn download_ubble_document_pictures<P>(
    provider: &P,
    content: &UbbleContent,
    check: &BeneficiaryFraudCheck,
) -> DocumentPictures
where
    P: IdentityProvider + ?Sized,
{
    let mut pictures = DocumentPictures::default();
    if let Some(url) = content.signed_image_front_url.as_deref() {
        pictures.front = download_ubble_picture(provider, check, url, PictureSide::Front).await;
    }
    if let Some(url) = content.signed_image_back_url.as_deref() {
        pictures.back = download_ubble_picture(provider, check, url, PictureSide::Back).await;
    }
    pictures
}
