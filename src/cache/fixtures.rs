//! Entity builders and in-memory fakes shared by unit tests.

use proptest::prelude::*;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;

use crate::error::{CacheError, SyncError};
use crate::todoist::commands::{CommandReceipt, SyncCommand};
use crate::todoist::types::{
  CompletedTask, Due, Entity, EntityId, EntityKind, EntityRef, Label, Note, Priority, Project,
  Task,
};

use super::codec::CacheStorage;
use super::merge::Delta;
use super::store::LocalStore;
use super::traits::RemoteSync;

pub fn task(id: EntityId, content: &str) -> Task {
  Task {
    id,
    content: content.to_string(),
    description: String::new(),
    project_id: None,
    parent_id: None,
    priority: Priority::default(),
    labels: Vec::new(),
    due: None,
    checked: false,
    child_order: 0,
    added_at: None,
    is_deleted: false,
  }
}

pub fn project(id: EntityId, name: &str) -> Project {
  Project {
    id,
    name: name.to_string(),
    parent_id: None,
    color: "grey".to_string(),
    child_order: 0,
    is_archived: false,
    is_deleted: false,
  }
}

pub fn label(id: EntityId, name: &str) -> Label {
  Label {
    id,
    name: name.to_string(),
    color: "grey".to_string(),
    item_order: 0,
    is_deleted: false,
  }
}

pub fn note(id: EntityId, item_id: EntityId, content: &str) -> Note {
  Note {
    id,
    item_id,
    content: content.to_string(),
    posted_at: None,
    is_deleted: false,
  }
}

// Strategies draw ids from a small range so updates, deletions and
// existing entities collide often.

fn arb_id() -> impl Strategy<Value = EntityId> {
  1..12u64
}

fn arb_text() -> impl Strategy<Value = String> {
  "[a-zA-Z0-9 #@]{0,12}"
}

pub fn arb_kind() -> impl Strategy<Value = EntityKind> {
  prop::sample::select(EntityKind::ALL.to_vec())
}

fn arb_due() -> impl Strategy<Value = Option<Due>> {
  prop::option::of(
    ("2024-0[1-9]-[12][0-9]", arb_text(), any::<bool>()).prop_map(|(date, string, is_recurring)| {
      Due {
        date,
        string,
        is_recurring,
      }
    }),
  )
}

fn arb_task() -> impl Strategy<Value = Task> {
  (
    (arb_id(), arb_text(), prop::option::of(arb_id()), prop::option::of(arb_id())),
    (1..=4u8, prop::collection::vec(arb_text(), 0..3), arb_due()),
    (any::<bool>(), any::<i64>(), any::<bool>()),
  )
    .prop_map(
      |((id, content, project_id, parent_id), (level, labels, due), flags)| {
        let (checked, child_order, is_deleted) = flags;
        Task {
          project_id,
          parent_id,
          priority: Priority::from_level(level).unwrap_or_default(),
          labels,
          due,
          checked,
          child_order,
          is_deleted,
          ..task(id, &content)
        }
      },
    )
}

fn arb_project() -> impl Strategy<Value = Project> {
  (arb_id(), arb_text(), prop::option::of(arb_id()), any::<bool>()).prop_map(
    |(id, name, parent_id, is_deleted)| Project {
      parent_id,
      is_deleted,
      ..project(id, &name)
    },
  )
}

fn arb_label() -> impl Strategy<Value = Label> {
  (arb_id(), arb_text(), any::<bool>()).prop_map(|(id, name, is_deleted)| Label {
    is_deleted,
    ..label(id, &name)
  })
}

fn arb_note() -> impl Strategy<Value = Note> {
  (arb_id(), arb_id(), arb_text(), any::<bool>()).prop_map(|(id, item_id, content, is_deleted)| {
    Note {
      is_deleted,
      ..note(id, item_id, &content)
    }
  })
}

pub fn arb_entity() -> impl Strategy<Value = Entity> {
  prop_oneof![
    arb_task().prop_map(Entity::Task),
    arb_project().prop_map(Entity::Project),
    arb_label().prop_map(Entity::Label),
    arb_note().prop_map(Entity::Note),
  ]
}

/// Any well-formed delta, full or incremental.
pub fn arb_delta() -> impl Strategy<Value = Delta> {
  (
    "c[0-9]{1,3}",
    any::<bool>(),
    prop::collection::vec(arb_entity(), 0..16),
    prop::collection::vec((arb_kind(), arb_id()), 0..6),
    prop::collection::btree_set(arb_kind(), 0..=4),
  )
    .prop_map(|(new_cursor, full_sync, updated, deleted, reported)| Delta {
      new_cursor,
      full_sync,
      updated,
      deleted: deleted
        .into_iter()
        .map(|(kind, id)| EntityRef::new(kind, id))
        .collect(),
      reported,
    })
}

/// A store reached by merging a bootstrap delta into an empty store.
pub fn arb_store() -> impl Strategy<Value = LocalStore> {
  arb_delta().prop_map(|delta| {
    super::merge::apply(&LocalStore::new(), &delta).unwrap_or_default()
  })
}

/// Scripted remote. Unscripted fetches fail with a network error;
/// unscripted command batches are accepted, numbering new ids from 700.
#[derive(Default)]
pub struct FakeRemote {
  pub deltas: RefCell<VecDeque<Result<Delta, SyncError>>>,
  pub receipts: RefCell<VecDeque<Result<CommandReceipt, SyncError>>>,
  pub cursors_seen: RefCell<Vec<Option<String>>>,
  pub executed: RefCell<Vec<SyncCommand>>,
  /// `None` behaves like a free account
  pub completed: Option<Vec<CompletedTask>>,
  /// Quick-add texts received, in order
  pub quick_added: RefCell<Vec<(String, bool)>>,
  pub karma: f64,
}

impl FakeRemote {
  pub fn with_deltas(deltas: Vec<Result<Delta, SyncError>>) -> Self {
    Self {
      deltas: RefCell::new(deltas.into()),
      ..Self::default()
    }
  }

  pub fn push_receipt(&self, receipt: Result<CommandReceipt, SyncError>) {
    self.receipts.borrow_mut().push_back(receipt);
  }
}

impl RemoteSync for FakeRemote {
  async fn fetch_delta(&self, cursor: Option<&str>) -> Result<Delta, SyncError> {
    self.cursors_seen.borrow_mut().push(cursor.map(str::to_string));
    self
      .deltas
      .borrow_mut()
      .pop_front()
      .unwrap_or_else(|| Err(SyncError::Network("no delta scripted".into())))
  }

  async fn execute(&self, commands: &[SyncCommand]) -> Result<CommandReceipt, SyncError> {
    self.executed.borrow_mut().extend_from_slice(commands);
    if let Some(scripted) = self.receipts.borrow_mut().pop_front() {
      return scripted;
    }
    let temp_id_mapping = commands
      .iter()
      .filter_map(|c| c.temp_id.clone())
      .zip(700..)
      .collect();
    Ok(CommandReceipt { temp_id_mapping })
  }

  async fn completed_tasks(&self) -> Result<Vec<CompletedTask>, SyncError> {
    self.completed.clone().ok_or(SyncError::PremiumRequired)
  }

  /// Stores the text verbatim as content, numbering ids from 900.
  async fn quick_add(&self, text: &str, auto_reminder: bool) -> Result<Task, SyncError> {
    let mut added = self.quick_added.borrow_mut();
    added.push((text.to_string(), auto_reminder));
    Ok(task(899 + added.len() as EntityId, text))
  }

  async fn karma(&self) -> Result<f64, SyncError> {
    Ok(self.karma)
  }
}

/// Storage kept in memory; `fail_saves` simulates an interrupted write.
#[derive(Default)]
pub struct MemoryStorage {
  pub saved: RefCell<Option<LocalStore>>,
  pub fail_saves: Cell<bool>,
}

impl MemoryStorage {
  pub fn holding(store: LocalStore) -> Self {
    Self {
      saved: RefCell::new(Some(store)),
      ..Self::default()
    }
  }

  pub fn saved(&self) -> Option<LocalStore> {
    self.saved.borrow().clone()
  }
}

impl CacheStorage for &MemoryStorage {
  fn load(&self) -> Result<LocalStore, CacheError> {
    self.saved.borrow().clone().ok_or(CacheError::NotFound {
      path: PathBuf::from("memory"),
    })
  }

  fn save(&self, store: &LocalStore) -> Result<(), CacheError> {
    if self.fail_saves.get() {
      return Err(CacheError::Io {
        path: PathBuf::from("memory"),
        source: std::io::Error::other("interrupted"),
      });
    }
    *self.saved.borrow_mut() = Some(store.clone());
    Ok(())
  }
}
