use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::DeliveryError;
use crate::models::QueueItem;

pub const DEFAULT_API_BASE: &str = "https://api.raindrop.io/rest/v1";

/// Collection id the remote API uses for "Unsorted".
const UNSORTED_COLLECTION_ID: i64 = -1;

/// What the remote API reports about the bookmark it created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRecord {
    pub id: Option<i64>,
    pub link: Option<String>,
}

#[derive(Deserialize)]
struct CreatedResponse {
    item: Option<CreatedItem>,
}

#[derive(Deserialize)]
struct CreatedItem {
    #[serde(rename = "_id")]
    id: Option<i64>,
    link: Option<String>,
}

/// Performs one creation request per call. Retrying is the caller's job.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(
        &self,
        item: &QueueItem,
        token: Option<&str>,
    ) -> Result<RemoteRecord, DeliveryError>;
}

pub struct RaindropClient {
    client: reqwest::Client,
    api_base: String,
}

impl RaindropClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/raindrop", self.api_base)
    }
}

#[async_trait]
impl Deliverer for RaindropClient {
    async fn deliver(
        &self,
        item: &QueueItem,
        token: Option<&str>,
    ) -> Result<RemoteRecord, DeliveryError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Err(DeliveryError::Unauthorized);
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&json!({
                "link": &item.url,
                "collection": { "$id": UNSORTED_COLLECTION_ID },
                "pleaseParse": {},
            }))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(DeliveryError::Unauthorized);
        }
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        // The bookmark exists remotely at this point; a body we cannot read must not turn
        // into a retry that would create it twice.
        let body = resp.bytes().await.unwrap_or_default();
        let record = serde_json::from_slice::<CreatedResponse>(&body)
            .ok()
            .and_then(|r| r.item)
            .map(|item| RemoteRecord {
                id: item.id,
                link: item.link,
            })
            .unwrap_or_default();

        Ok(record)
    }
}
