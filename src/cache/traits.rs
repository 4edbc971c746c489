//! Core traits for the sync cache.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::SyncError;
use crate::todoist::commands::{CommandReceipt, SyncCommand};
use crate::todoist::types::{CompletedTask, Entity, EntityId, EntityKind, Task};

use super::merge::Delta;

/// Trait for records that can live in the local store.
///
/// Implementors expose the shared accessors the merge engine works with,
/// so it never needs to look at kind-specific fields.
pub trait SyncEntity: Clone + Serialize + DeserializeOwned {
  /// Which table of the store holds this entity
  const KIND: EntityKind;

  /// Server-assigned identifier
  fn id(&self) -> EntityId;

  /// Tombstone flag. Tombstoned entities are purged, never stored.
  fn is_deleted(&self) -> bool;

  fn into_entity(self) -> Entity;

  /// Unwrap the matching variant, `None` for any other kind.
  fn from_entity(entity: Entity) -> Option<Self>;
}

/// The remote side of synchronization.
///
/// `SyncClient` talks HTTP; tests substitute in-memory fakes.
#[allow(async_fn_in_trait)]
pub trait RemoteSync {
  /// Fetch changes since `cursor`, or everything when `cursor` is `None`.
  async fn fetch_delta(&self, cursor: Option<&str>) -> Result<Delta, SyncError>;

  /// Send mutation commands. Fails unless every command was accepted.
  async fn execute(&self, commands: &[SyncCommand]) -> Result<CommandReceipt, SyncError>;

  /// Completed-task history, read live.
  async fn completed_tasks(&self) -> Result<Vec<CompletedTask>, SyncError>;

  /// Create a task from quick-add text, returning it as the server stored it.
  async fn quick_add(&self, text: &str, auto_reminder: bool) -> Result<Task, SyncError>;

  async fn karma(&self) -> Result<f64, SyncError>;
}
