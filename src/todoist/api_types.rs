//! Serde types matching Sync API requests and responses.
//!
//! These are separate from domain types so the wire quirks (string ids,
//! 0/1 flags, optional resource lists) stay out of the cache format.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use super::commands::{CommandReceipt, SyncCommand};
use super::types::{
  CompletedTask, Due, Entity, EntityId, EntityKind, Label, Note, Priority, Project, Task,
};
use crate::cache::merge::Delta;
use crate::error::SyncError;

/// Cursor value asking for a full sync
pub const FULL_SYNC_TOKEN: &str = "*";

/// Resource lists requested on every sync
pub const RESOURCE_TYPES: [&str; 4] = ["items", "projects", "labels", "notes"];

/// Requested on its own for `karma`; the user record is not cached
pub const USER_RESOURCE: [&str; 1] = ["user"];

#[derive(Debug, Serialize)]
pub struct ApiQuickAddRequest<'a> {
  pub text: &'a str,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub auto_reminder: bool,
}

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiSyncRequest<'a> {
  pub sync_token: &'a str,
  pub resource_types: &'a [&'a str],
  #[serde(skip_serializing_if = "Option::is_none")]
  pub commands: Option<&'a [SyncCommand]>,
}

// ============================================================================
// Id and flag helpers
// ============================================================================

/// Ids arrive as numbers from older API versions and as numeric strings from newer ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
  Number(u64),
  Text(String),
}

impl RawId {
  fn into_id<E: serde::de::Error>(self) -> Result<Option<EntityId>, E> {
    match self {
      RawId::Number(n) => Ok(Some(n)),
      RawId::Text(s) if s.trim().is_empty() => Ok(None),
      RawId::Text(s) => s
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| E::custom(format!("invalid id '{}'", s))),
    }
  }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<EntityId, D::Error>
where
  D: Deserializer<'de>,
{
  RawId::deserialize(deserializer)?
    .into_id()?
    .ok_or_else(|| serde::de::Error::custom("empty id"))
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<EntityId>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<RawId>::deserialize(deserializer)? {
    Some(raw) => raw.into_id(),
    None => Ok(None),
  }
}

/// Flags arrive as booleans or as 0/1.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawFlag {
    Bool(bool),
    Int(i64),
  }

  Ok(match Option::<RawFlag>::deserialize(deserializer)? {
    Some(RawFlag::Bool(b)) => b,
    Some(RawFlag::Int(i)) => i != 0,
    None => false,
  })
}

// ============================================================================
// Resource records
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiDue {
  #[serde(default)]
  pub date: String,
  #[serde(default)]
  pub string: String,
  #[serde(default, deserialize_with = "deserialize_flag")]
  pub is_recurring: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiItem {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: EntityId,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub description: String,
  #[serde(default, deserialize_with = "deserialize_opt_id")]
  pub project_id: Option<EntityId>,
  #[serde(default, deserialize_with = "deserialize_opt_id")]
  pub parent_id: Option<EntityId>,
  #[serde(default = "default_priority")]
  pub priority: u8,
  #[serde(default)]
  pub labels: Vec<String>,
  pub due: Option<ApiDue>,
  #[serde(default, deserialize_with = "deserialize_flag")]
  pub checked: bool,
  #[serde(default)]
  pub child_order: i64,
  pub added_at: Option<String>,
  #[serde(default, deserialize_with = "deserialize_flag")]
  pub is_deleted: bool,
}

fn default_priority() -> u8 {
  Priority::LOWEST.value()
}

#[derive(Debug, Deserialize)]
pub struct ApiProject {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: EntityId,
  #[serde(default)]
  pub name: String,
  #[serde(default, deserialize_with = "deserialize_opt_id")]
  pub parent_id: Option<EntityId>,
  #[serde(default)]
  pub color: String,
  #[serde(default)]
  pub child_order: i64,
  #[serde(default, deserialize_with = "deserialize_flag")]
  pub is_archived: bool,
  #[serde(default, deserialize_with = "deserialize_flag")]
  pub is_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiLabel {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: EntityId,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub color: String,
  #[serde(default)]
  pub item_order: i64,
  #[serde(default, deserialize_with = "deserialize_flag")]
  pub is_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiNote {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: EntityId,
  #[serde(deserialize_with = "deserialize_id")]
  pub item_id: EntityId,
  #[serde(default)]
  pub content: String,
  pub posted_at: Option<String>,
  #[serde(default, deserialize_with = "deserialize_flag")]
  pub is_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  #[serde(default)]
  pub karma: f64,
}

// ============================================================================
// Sync endpoint response
// ============================================================================

/// Per-command result inside `sync_status`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiCommandStatus {
  Ok(String),
  Error {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error: String,
  },
}

#[derive(Debug, Deserialize)]
pub struct ApiSyncResponse {
  pub sync_token: Option<String>,
  #[serde(default)]
  pub full_sync: bool,
  /// A missing list means "not reported", never "empty"
  pub items: Option<Vec<ApiItem>>,
  pub projects: Option<Vec<ApiProject>>,
  pub labels: Option<Vec<ApiLabel>>,
  pub notes: Option<Vec<ApiNote>>,
  /// Only present when the `user` resource was requested
  pub user: Option<ApiUser>,
  #[serde(default)]
  pub sync_status: HashMap<String, ApiCommandStatus>,
  #[serde(default)]
  pub temp_id_mapping: HashMap<String, serde_json::Value>,
}

// ============================================================================
// Completed endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCompletedItem {
  #[serde(deserialize_with = "deserialize_id")]
  pub task_id: EntityId,
  #[serde(default)]
  pub content: String,
  #[serde(default, deserialize_with = "deserialize_opt_id")]
  pub project_id: Option<EntityId>,
  #[serde(default)]
  pub completed_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiCompletedResponse {
  #[serde(default)]
  pub items: Vec<ApiCompletedItem>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiItem {
  pub fn into_task(self) -> Result<Task, SyncError> {
    let priority = Priority::try_from(self.priority)
      .map_err(|e| SyncError::Decode(format!("task {}: {}", self.id, e)))?;

    Ok(Task {
      id: self.id,
      content: self.content,
      description: self.description,
      project_id: self.project_id,
      parent_id: self.parent_id,
      priority,
      labels: self.labels,
      due: self.due.map(|d| Due {
        date: d.date,
        string: d.string,
        is_recurring: d.is_recurring,
      }),
      checked: self.checked,
      child_order: self.child_order,
      added_at: self.added_at,
      is_deleted: self.is_deleted,
    })
  }
}

impl From<ApiProject> for Project {
  fn from(p: ApiProject) -> Self {
    Project {
      id: p.id,
      name: p.name,
      parent_id: p.parent_id,
      color: p.color,
      child_order: p.child_order,
      is_archived: p.is_archived,
      is_deleted: p.is_deleted,
    }
  }
}

impl From<ApiLabel> for Label {
  fn from(l: ApiLabel) -> Self {
    Label {
      id: l.id,
      name: l.name,
      color: l.color,
      item_order: l.item_order,
      is_deleted: l.is_deleted,
    }
  }
}

impl From<ApiNote> for Note {
  fn from(n: ApiNote) -> Self {
    Note {
      id: n.id,
      item_id: n.item_id,
      content: n.content,
      posted_at: n.posted_at,
      is_deleted: n.is_deleted,
    }
  }
}

impl From<ApiCompletedItem> for CompletedTask {
  fn from(c: ApiCompletedItem) -> Self {
    CompletedTask {
      task_id: c.task_id,
      content: c.content,
      project_id: c.project_id,
      completed_at: c.completed_at,
    }
  }
}

impl ApiSyncResponse {
  /// Split the resource lists into updates and deletions.
  pub fn into_delta(self) -> Result<Delta, SyncError> {
    let new_cursor = self
      .sync_token
      .ok_or_else(|| SyncError::Decode("response carries no sync_token".into()))?;

    let reported = [
      (EntityKind::Task, self.items.is_some()),
      (EntityKind::Project, self.projects.is_some()),
      (EntityKind::Label, self.labels.is_some()),
      (EntityKind::Note, self.notes.is_some()),
    ]
    .into_iter()
    .filter_map(|(kind, present)| present.then_some(kind))
    .collect();

    let mut entities = Vec::new();
    for item in self.items.into_iter().flatten() {
      entities.push(Entity::Task(item.into_task()?));
    }
    entities.extend(
      self
        .projects
        .into_iter()
        .flatten()
        .map(|p| Entity::Project(p.into())),
    );
    entities.extend(
      self
        .labels
        .into_iter()
        .flatten()
        .map(|l| Entity::Label(l.into())),
    );
    entities.extend(
      self
        .notes
        .into_iter()
        .flatten()
        .map(|n| Entity::Note(n.into())),
    );

    let (tombstones, updated): (Vec<Entity>, Vec<Entity>) =
      entities.into_iter().partition(Entity::is_deleted);

    Ok(Delta {
      new_cursor,
      full_sync: self.full_sync,
      updated,
      deleted: tombstones.iter().map(Entity::key).collect(),
      reported,
    })
  }

  /// Check every command was accepted and collect the id mapping.
  pub fn into_receipt(self, commands: &[SyncCommand]) -> Result<CommandReceipt, SyncError> {
    for command in commands {
      let key = command.uuid.to_string();
      match self.sync_status.get(&key) {
        Some(ApiCommandStatus::Ok(status)) if status == "ok" => {}
        Some(ApiCommandStatus::Ok(other)) => {
          return Err(SyncError::CommandRejected {
            command: command.command_type.to_string(),
            reason: other.clone(),
          })
        }
        Some(ApiCommandStatus::Error { error_code, error }) => {
          return Err(SyncError::CommandRejected {
            command: command.command_type.to_string(),
            reason: match error_code {
              Some(code) => format!("{} (code {})", error, code),
              None => error.clone(),
            },
          })
        }
        None => {
          return Err(SyncError::CommandRejected {
            command: command.command_type.to_string(),
            reason: "no status reported".into(),
          })
        }
      }
    }

    let mut temp_id_mapping = HashMap::new();
    for (temp_id, raw) in self.temp_id_mapping {
      let id = match &raw {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
      }
      .ok_or_else(|| SyncError::Decode(format!("invalid id for temp id {}: {}", temp_id, raw)))?;
      temp_id_mapping.insert(temp_id, id);
    }

    Ok(CommandReceipt { temp_id_mapping })
  }
}
