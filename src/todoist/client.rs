use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::cache::merge::Delta;
use crate::cache::RemoteSync;
use crate::error::SyncError;
use crate::todoist::api_types::{
  ApiCompletedResponse, ApiItem, ApiQuickAddRequest, ApiSyncRequest, ApiSyncResponse,
  FULL_SYNC_TOKEN, RESOURCE_TYPES, USER_RESOURCE,
};
use crate::todoist::commands::{CommandReceipt, SyncCommand};
use crate::todoist::types::{CompletedTask, Task};

/// Todoist Sync API client
#[derive(Clone)]
pub struct SyncClient {
  http: reqwest::Client,
  base_url: Url,
  token: String,
}

impl SyncClient {
  /// `base_url` must end with `/` so endpoint paths join under it.
  pub fn new(base_url: Url, token: String, timeout: Duration) -> Result<Self, SyncError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("todoist-cli/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {}", e)))?;

    Ok(Self {
      http,
      base_url,
      token,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
    self
      .base_url
      .join(path)
      .map_err(|e| SyncError::Network(format!("invalid endpoint {}: {}", path, e)))
  }

  /// POST the sync endpoint with an optional batch of commands
  async fn post_sync(
    &self,
    cursor: &str,
    resource_types: &[&str],
    commands: Option<&[SyncCommand]>,
  ) -> Result<ApiSyncResponse, SyncError> {
    let body = ApiSyncRequest {
      sync_token: cursor,
      resource_types,
      commands,
    };

    let response = self
      .http
      .post(self.endpoint("sync")?)
      .bearer_auth(&self.token)
      .json(&body)
      .send()
      .await
      .map_err(transport_error)?;

    decode(response).await
  }

  /// Fetch changes since `cursor`, or the full state when `cursor` is `None`
  pub async fn fetch_delta(&self, cursor: Option<&str>) -> Result<Delta, SyncError> {
    let token = cursor.unwrap_or(FULL_SYNC_TOKEN);
    debug!(cursor = token, "fetching delta");

    let delta = self
      .post_sync(token, &RESOURCE_TYPES, None)
      .await?
      .into_delta()?;

    info!(
      full_sync = delta.full_sync,
      updated = delta.updated.len(),
      deleted = delta.deleted.len(),
      "delta received"
    );
    Ok(delta)
  }

  /// Execute mutation commands
  pub async fn execute(&self, commands: &[SyncCommand]) -> Result<CommandReceipt, SyncError> {
    let kinds: Vec<_> = commands.iter().map(|c| c.command_type).collect();
    debug!(commands = ?kinds, "executing commands");

    // No resources requested: the local store is updated optimistically.
    let response = self
      .post_sync(FULL_SYNC_TOKEN, &[], Some(commands))
      .await?;
    response.into_receipt(commands)
  }

  /// Get completed task history
  pub async fn completed_tasks(&self) -> Result<Vec<CompletedTask>, SyncError> {
    let response = self
      .http
      .get(self.endpoint("completed/get_all")?)
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(transport_error)?;

    if response.status() == StatusCode::FORBIDDEN {
      return Err(SyncError::PremiumRequired);
    }

    let completed: ApiCompletedResponse = decode(response).await?;
    Ok(completed.items.into_iter().map(CompletedTask::from).collect())
  }

  /// Add a task with the server parsing dates, `#project` and `@label` out of `text`
  pub async fn quick_add(&self, text: &str, auto_reminder: bool) -> Result<Task, SyncError> {
    debug!(auto_reminder, "quick add");
    let response = self
      .http
      .post(self.endpoint("quick/add")?)
      .bearer_auth(&self.token)
      .json(&ApiQuickAddRequest {
        text,
        auto_reminder,
      })
      .send()
      .await
      .map_err(transport_error)?;

    let item: ApiItem = decode(response).await?;
    item.into_task()
  }

  /// Current karma score of the account
  pub async fn karma(&self) -> Result<f64, SyncError> {
    let response = self.post_sync(FULL_SYNC_TOKEN, &USER_RESOURCE, None).await?;
    response
      .user
      .map(|user| user.karma)
      .ok_or_else(|| SyncError::Decode("response carries no user".into()))
  }
}

impl RemoteSync for SyncClient {
  async fn fetch_delta(&self, cursor: Option<&str>) -> Result<Delta, SyncError> {
    SyncClient::fetch_delta(self, cursor).await
  }

  async fn execute(&self, commands: &[SyncCommand]) -> Result<CommandReceipt, SyncError> {
    SyncClient::execute(self, commands).await
  }

  async fn completed_tasks(&self) -> Result<Vec<CompletedTask>, SyncError> {
    SyncClient::completed_tasks(self).await
  }

  async fn quick_add(&self, text: &str, auto_reminder: bool) -> Result<Task, SyncError> {
    SyncClient::quick_add(self, text, auto_reminder).await
  }

  async fn karma(&self) -> Result<f64, SyncError> {
    SyncClient::karma(self).await
  }
}

fn transport_error(e: reqwest::Error) -> SyncError {
  if e.is_timeout() {
    SyncError::Timeout
  } else {
    SyncError::Network(e.to_string())
  }
}

/// Map the HTTP status, then decode the JSON body
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
  let status = response.status();
  let body = response.bytes().await.map_err(transport_error)?;

  if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
    return Err(SyncError::Auth(error_message(status, &body)));
  }
  if !status.is_success() {
    return Err(SyncError::Api {
      status: status.as_u16(),
      message: error_message(status, &body),
    });
  }

  serde_json::from_slice(&body).map_err(|e| SyncError::Decode(e.to_string()))
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
  let text = String::from_utf8_lossy(body);
  let text = text.trim();
  if text.is_empty() {
    status
      .canonical_reason()
      .unwrap_or("request failed")
      .to_string()
  } else {
    text.to_string()
  }
}
