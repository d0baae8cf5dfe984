use std::time::Duration;

use async_trait::async_trait;
use postpilot_core::types::{AccountCredentials, ContentItem};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::PublishError;
use crate::publisher::{PublishReceipt, Publisher};

const API_VERSION: &str = "5.199";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Wall-post adapter for the VK API, with optional photo attachment.
///
/// The photo path is the three-step remote upload: obtain an upload server,
/// transfer the image bytes, then save the wall photo. Any step failing
/// drops only the attachment; the text post still goes out.
pub struct VkPublisher {
    client: reqwest::Client,
    api_base: String,
}

impl VkPublisher {
    pub fn new() -> Self {
        Self::with_api_base("https://api.vk.com/method".to_string())
    }

    /// Override the API base URL (used by tests against a local stub).
    pub fn with_api_base(api_base: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, api_base }
    }

    /// Upload a remote image and return the `photo<owner>_<id>` attachment id.
    async fn upload_photo(
        &self,
        image_url: &str,
        creds: &AccountCredentials,
    ) -> Result<String, PublishError> {
        // 1. Obtain the upload target for the group's wall album.
        let server: VkResponse<UploadServer> = self
            .client
            .get(format!("{}/photos.getWallUploadServer", self.api_base))
            .query(&[
                ("access_token", creds.access_token.as_str()),
                ("group_id", &creds.group_id.to_string()),
                ("v", API_VERSION),
            ])
            .send()
            .await?
            .json()
            .await?;
        let upload_url = server.into_result()?.upload_url;

        // 2. Fetch the image bytes from the generation service.
        let img_bytes = self.client.get(image_url).send().await?.bytes().await?;

        // 3. Transfer the bytes to the upload server.
        let part = reqwest::multipart::Part::bytes(img_bytes.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new().part("photo", part);
        let uploaded: UploadResult = self
            .client
            .post(&upload_url)
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        // 4. Confirm the upload into the group album.
        let saved: VkResponse<Vec<SavedPhoto>> = self
            .client
            .post(format!("{}/photos.saveWallPhoto", self.api_base))
            .form(&[
                ("access_token", creds.access_token.as_str()),
                ("group_id", &creds.group_id.to_string()),
                ("photo", &uploaded.photo),
                ("server", &uploaded.server.to_string()),
                ("hash", &uploaded.hash),
                ("v", API_VERSION),
            ])
            .send()
            .await?
            .json()
            .await?;

        let photos = saved.into_result()?;
        let photo = photos
            .first()
            .ok_or_else(|| PublishError::Malformed("saveWallPhoto returned no photos".into()))?;
        Ok(attachment_id(photo.owner_id, photo.id))
    }
}

impl Default for VkPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for VkPublisher {
    fn name(&self) -> &str {
        "vk"
    }

    async fn publish(
        &self,
        content: &ContentItem,
        creds: &AccountCredentials,
    ) -> Result<PublishReceipt, PublishError> {
        if creds.access_token.is_empty() {
            return Err(PublishError::Auth("no access token provided".into()));
        }

        let message = format!("{}\n\n{}", content.title, content.text);
        let owner_id = format!("-{}", creds.group_id);

        // Attachment failures must not block the text post.
        let attachment = match &content.image_url {
            Some(url) => match self.upload_photo(url, creds).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("photo upload failed, posting without attachment: {e}");
                    None
                }
            },
            None => None,
        };

        let mut params: Vec<(&str, String)> = vec![
            ("access_token", creds.access_token.clone()),
            ("v", API_VERSION.to_string()),
            ("owner_id", owner_id),
            ("from_group", "1".to_string()),
            ("message", message),
        ];
        if let Some(att) = attachment {
            params.push(("attachments", att));
        }

        let resp: VkResponse<WallPostResult> = self
            .client
            .post(format!("{}/wall.post", self.api_base))
            .form(&params)
            .send()
            .await?
            .json()
            .await?;

        let result = resp.into_result()?;
        info!(post_id = result.post_id, "post published to vk wall");
        Ok(PublishReceipt {
            post_id: result.post_id.to_string(),
        })
    }
}

fn attachment_id(owner_id: i64, photo_id: i64) -> String {
    format!("photo{owner_id}_{photo_id}")
}

// VK API payloads (private — deserialization only)

/// Every VK method answers either `{"response": …}` or `{"error": …}`.
#[derive(Deserialize)]
struct VkResponse<T> {
    response: Option<T>,
    error: Option<VkApiError>,
}

impl<T> VkResponse<T> {
    fn into_result(self) -> Result<T, PublishError> {
        if let Some(err) = self.error {
            return Err(PublishError::Api {
                code: err.error_code,
                message: err.error_msg,
            });
        }
        self.response
            .ok_or_else(|| PublishError::Malformed("missing response body".into()))
    }
}

#[derive(Deserialize)]
struct VkApiError {
    error_code: i64,
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct WallPostResult {
    post_id: i64,
}

#[derive(Deserialize)]
struct UploadServer {
    upload_url: String,
}

#[derive(Deserialize)]
struct UploadResult {
    photo: String,
    server: i64,
    hash: String,
}

#[derive(Deserialize)]
struct SavedPhoto {
    owner_id: i64,
    id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_envelope_success() {
        let resp: VkResponse<WallPostResult> =
            serde_json::from_str(r#"{"response": {"post_id": 4242}}"#).unwrap();
        assert_eq!(resp.into_result().unwrap().post_id, 4242);
    }

    #[test]
    fn response_envelope_error() {
        let resp: VkResponse<WallPostResult> = serde_json::from_str(
            r#"{"error": {"error_code": 15, "error_msg": "Access denied"}}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(matches!(err, PublishError::Api { code: 15, .. }));
    }

    #[test]
    fn response_envelope_empty_is_malformed() {
        let resp: VkResponse<WallPostResult> = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            resp.into_result().unwrap_err(),
            PublishError::Malformed(_)
        ));
    }

    #[test]
    fn attachment_id_shape() {
        assert_eq!(attachment_id(-12345, 678), "photo-12345_678");
    }

    #[tokio::test]
    async fn empty_token_rejected_before_any_network_call() {
        let publisher = VkPublisher::new();
        let creds = AccountCredentials {
            access_token: String::new(),
            group_id: 1,
        };
        let item = ContentItem::new("t", "b", "topic");
        let err = publisher.publish(&item, &creds).await.unwrap_err();
        assert!(matches!(err, PublishError::Auth(_)));
    }
}
