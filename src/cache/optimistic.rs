//! Local effects of a mutation the server has already accepted.
//!
//! Each change is mirrored the way the service applies it, so the store
//! matches what the next sync would report. Fields only the server can
//! compute (the next date of a recurring task) are left for that sync.

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::debug;

use crate::error::CoreError;
use crate::todoist::commands::{Change, CommandReceipt, Draft, Patch};
use crate::todoist::types::{
  Due, Entity, EntityId, EntityKind, EntityRef, Label, Note, Project, Task,
};

use super::store::LocalStore;

/// Apply an accepted change to `store`, returning the key it landed on.
///
/// `temp_id` is the id an add was sent under; `receipt` maps it to the
/// server id.
pub fn apply_change(
  store: &mut LocalStore,
  kind: EntityKind,
  id: Option<EntityId>,
  change: &Change,
  temp_id: Option<&str>,
  receipt: &CommandReceipt,
  today: NaiveDate,
) -> Result<EntityRef, CoreError> {
  match (change, id) {
    (Change::Add(draft), _) => {
      let new_id = temp_id.and_then(|t| receipt.resolve(t)).ok_or_else(|| {
        CoreError::InvalidChange(format!("server assigned no id to the new {}", kind))
      })?;
      add(store, draft, new_id, today);
      Ok(EntityRef::new(kind, new_id))
    }
    (Change::Modify(patch), Some(id)) => {
      modify(store, id, patch, today)?;
      Ok(EntityRef::new(kind, id))
    }
    (Change::Close, Some(id)) => {
      close_task(store, id)?;
      Ok(EntityRef::new(kind, id))
    }
    (Change::Delete, Some(id)) => {
      delete(store, EntityRef::new(kind, id));
      Ok(EntityRef::new(kind, id))
    }
    (_, None) => Err(CoreError::InvalidChange(format!("{} id is required", kind))),
  }
}

fn add(store: &mut LocalStore, draft: &Draft, id: EntityId, today: NaiveDate) {
  let entity = match draft {
    Draft::Task(new) => {
      let siblings = store
        .tasks()
        .iter()
        .filter(|t| t.project_id == new.project_id && t.parent_id == new.parent_id);
      let child_order = siblings.map(|t| t.child_order).max().unwrap_or(0) + 1;

      Entity::Task(Task {
        id,
        content: new.content.clone(),
        description: new.description.clone().unwrap_or_default(),
        project_id: new.project_id,
        parent_id: new.parent_id,
        priority: new.priority.unwrap_or_default(),
        labels: new.labels.clone(),
        due: new.due_string.as_deref().map(|s| Due::from_input(s, today)),
        checked: false,
        child_order,
        added_at: None,
        is_deleted: false,
      })
    }
    Draft::Project(new) => Entity::Project(Project {
      id,
      name: new.name.clone(),
      parent_id: new.parent_id,
      color: new.color.clone().unwrap_or_default(),
      child_order: store.projects().iter().map(|p| p.child_order).max().unwrap_or(0) + 1,
      is_archived: false,
      is_deleted: false,
    }),
    Draft::Label(new) => Entity::Label(Label {
      id,
      name: new.name.clone(),
      color: new.color.clone().unwrap_or_default(),
      item_order: store.labels().iter().map(|l| l.item_order).max().unwrap_or(0) + 1,
      is_deleted: false,
    }),
    Draft::Note(new) => Entity::Note(Note {
      id,
      item_id: new.task_id,
      content: new.content.clone(),
      posted_at: Some(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()),
      is_deleted: false,
    }),
  };
  store.upsert(entity);
}

fn modify(
  store: &mut LocalStore,
  id: EntityId,
  patch: &Patch,
  today: NaiveDate,
) -> Result<(), CoreError> {
  let missing = |kind| CoreError::UnknownEntity(EntityRef::new(kind, id));

  match patch {
    Patch::Task(p) => {
      let task = store
        .tasks_mut()
        .get_mut(id)
        .ok_or_else(|| missing(EntityKind::Task))?;
      if let Some(content) = &p.content {
        task.content = content.clone();
      }
      if let Some(priority) = p.priority {
        task.priority = priority;
      }
      if let Some(labels) = &p.labels {
        task.labels = labels.clone();
      }
      if let Some(due) = &p.due_string {
        task.due = Some(Due::from_input(due, today));
      }
      if let Some(project_id) = p.project_id {
        move_task(store, id, project_id);
      }
    }
    Patch::Project(attrs) => {
      let project = store
        .projects_mut()
        .get_mut(id)
        .ok_or_else(|| missing(EntityKind::Project))?;
      if let Some(name) = &attrs.name {
        project.name = name.clone();
      }
      if let Some(color) = &attrs.color {
        project.color = color.clone();
      }
    }
    Patch::Label(attrs) => {
      let label = store
        .labels_mut()
        .get_mut(id)
        .ok_or_else(|| missing(EntityKind::Label))?;
      let old_name = label.name.clone();
      if let Some(name) = &attrs.name {
        label.name = name.clone();
      }
      if let Some(color) = &attrs.color {
        label.color = color.clone();
      }
      if let Some(new_name) = &attrs.name {
        rename_label_on_tasks(store, &old_name, new_name);
      }
    }
    Patch::Note { content } => {
      let note = store
        .notes_mut()
        .get_mut(id)
        .ok_or_else(|| missing(EntityKind::Note))?;
      note.content = content.clone();
    }
  }
  Ok(())
}

/// Move a task and its subtasks; a moved subtask detaches from its parent.
fn move_task(store: &mut LocalStore, id: EntityId, project_id: EntityId) {
  let subtree = store.task_subtree(id);
  for task_id in subtree {
    if let Some(task) = store.tasks_mut().get_mut(task_id) {
      task.project_id = Some(project_id);
      if task_id == id {
        task.parent_id = None;
      }
    }
  }
}

fn rename_label_on_tasks(store: &mut LocalStore, old_name: &str, new_name: &str) {
  let ids: Vec<EntityId> = store
    .tasks()
    .iter()
    .filter(|t| t.labels.iter().any(|l| l == old_name))
    .map(|t| t.id)
    .collect();
  for id in ids {
    if let Some(task) = store.tasks_mut().get_mut(id) {
      for label in task.labels.iter_mut().filter(|l| *l == old_name) {
        *label = new_name.to_string();
      }
    }
  }
}

/// Complete a task and its subtasks. A recurring task stays open: the
/// server moves it to its next date, which arrives with the next sync.
fn close_task(store: &mut LocalStore, id: EntityId) -> Result<(), CoreError> {
  let task = store
    .task(id)
    .ok_or(CoreError::UnknownEntity(EntityRef::new(EntityKind::Task, id)))?;

  if task.due.as_ref().is_some_and(|d| d.is_recurring) {
    debug!(task = id, "recurring task closed remotely; next occurrence arrives on sync");
    return Ok(());
  }

  for task_id in store.task_subtree(id) {
    if let Some(task) = store.tasks_mut().get_mut(task_id) {
      task.checked = true;
    }
  }
  Ok(())
}

/// Remove an entity plus whatever the server removes along with it.
fn delete(store: &mut LocalStore, key: EntityRef) {
  match key.kind {
    EntityKind::Task => {
      let doomed = store.task_subtree(key.id);
      store.remove_all(EntityKind::Task, &doomed);
      store.notes_mut().retain(|n| !doomed.contains(&n.item_id));
    }
    EntityKind::Project => {
      let doomed = store.project_subtree(key.id);
      store.remove_all(EntityKind::Project, &doomed);
      store
        .tasks_mut()
        .retain(|t| !t.project_id.is_some_and(|p| doomed.contains(&p)));
      let remaining: HashSet<EntityId> = store.tasks().iter().map(|t| t.id).collect();
      store.notes_mut().retain(|n| remaining.contains(&n.item_id));
    }
    EntityKind::Label => {
      let name = store.labels().get(key.id).map(|l| l.name.clone());
      store.labels_mut().remove(key.id);
      if let Some(name) = name {
        let ids: Vec<EntityId> = store.tasks().iter().map(|t| t.id).collect();
        for id in ids {
          if let Some(task) = store.tasks_mut().get_mut(id) {
            task.labels.retain(|l| *l != name);
          }
        }
      }
    }
    EntityKind::Note => {
      store.notes_mut().remove(key.id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::fixtures::{label, note, project, task};
  use crate::cache::merge::{apply, Delta};
  use crate::todoist::commands::{AttributePatch, NewNote, NewTask, TaskPatch};
  use crate::todoist::types::Priority;
  use std::collections::HashMap;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
  }

  fn seeded() -> LocalStore {
    let delta = Delta {
      new_cursor: "c1".into(),
      full_sync: true,
      updated: vec![
        Entity::Project(project(10, "Home")),
        Entity::Project(Project {
          parent_id: Some(10),
          ..project(11, "Garden")
        }),
        Entity::Project(project(12, "Work")),
        Entity::Task(Task {
          project_id: Some(10),
          labels: vec!["errand".into()],
          ..task(5, "Buy milk")
        }),
        Entity::Task(Task {
          project_id: Some(10),
          parent_id: Some(5),
          ..task(6, "Check price")
        }),
        Entity::Task(Task {
          project_id: Some(11),
          ..task(7, "Water plants")
        }),
        Entity::Task(Task {
          project_id: Some(12),
          due: Some(Due {
            date: "2024-03-11".into(),
            string: "every day".into(),
            is_recurring: true,
          }),
          ..task(8, "Standup")
        }),
        Entity::Label(label(20, "errand")),
        Entity::Note(note(30, 5, "2%")),
        Entity::Note(note(31, 7, "twice")),
      ],
      ..Delta::default()
    };
    apply(&LocalStore::new(), &delta).unwrap()
  }

  fn no_receipt() -> CommandReceipt {
    CommandReceipt::default()
  }

  fn run(
    store: &mut LocalStore,
    kind: EntityKind,
    id: Option<EntityId>,
    change: Change,
  ) -> EntityRef {
    apply_change(store, kind, id, &change, None, &no_receipt(), today()).unwrap()
  }

  #[test]
  fn test_close_marks_task_and_subtasks() {
    let mut store = seeded();
    run(&mut store, EntityKind::Task, Some(5), Change::Close);

    assert!(store.task(5).unwrap().checked);
    assert!(store.task(6).unwrap().checked);
    assert!(!store.task(7).unwrap().checked);
    assert_eq!(store.sync_cursor(), Some("c1"));
  }

  #[test]
  fn test_close_recurring_leaves_task_open() {
    let mut store = seeded();
    run(&mut store, EntityKind::Task, Some(8), Change::Close);
    assert!(!store.task(8).unwrap().checked);
  }

  #[test]
  fn test_add_uses_server_id() {
    let mut store = seeded();
    let receipt = CommandReceipt {
      temp_id_mapping: HashMap::from([("tmp".to_string(), 900)]),
    };
    let change = Change::Add(Draft::Task(NewTask {
      content: "Buy bread".into(),
      project_id: Some(10),
      priority: Priority::from_level(2),
      due_string: Some("tomorrow".into()),
      ..NewTask::default()
    }));

    let key = apply_change(
      &mut store,
      EntityKind::Task,
      None,
      &change,
      Some("tmp"),
      &receipt,
      today(),
    )
    .unwrap();

    assert_eq!(key, EntityRef::new(EntityKind::Task, 900));
    let added = store.task(900).unwrap();
    assert_eq!(added.content, "Buy bread");
    assert_eq!(added.priority.level(), 2);
    assert_eq!(added.due.as_ref().unwrap().date, "2024-03-11");
  }

  #[test]
  fn test_add_without_mapping_fails() {
    let mut store = seeded();
    let change = Change::Add(Draft::Note(NewNote {
      task_id: 5,
      content: "x".into(),
    }));
    let result = apply_change(
      &mut store,
      EntityKind::Note,
      None,
      &change,
      Some("tmp"),
      &no_receipt(),
      today(),
    );
    assert!(matches!(result, Err(CoreError::InvalidChange(_))));
  }

  #[test]
  fn test_modify_moves_subtree() {
    let mut store = seeded();
    let patch = TaskPatch {
      content: Some("Buy oat milk".into()),
      project_id: Some(12),
      ..TaskPatch::default()
    };
    run(
      &mut store,
      EntityKind::Task,
      Some(5),
      Change::Modify(Patch::Task(patch)),
    );

    assert_eq!(store.task(5).unwrap().content, "Buy oat milk");
    assert_eq!(store.task(5).unwrap().project_id, Some(12));
    assert_eq!(store.task(6).unwrap().project_id, Some(12));
  }

  #[test]
  fn test_modify_unknown_task_fails() {
    let mut store = seeded();
    let result = apply_change(
      &mut store,
      EntityKind::Task,
      Some(404),
      &Change::Modify(Patch::Task(TaskPatch {
        content: Some("x".into()),
        ..TaskPatch::default()
      })),
      None,
      &no_receipt(),
      today(),
    );
    assert!(matches!(result, Err(CoreError::UnknownEntity(_))));
  }

  #[test]
  fn test_rename_label_updates_tasks() {
    let mut store = seeded();
    run(
      &mut store,
      EntityKind::Label,
      Some(20),
      Change::Modify(Patch::Label(AttributePatch {
        name: Some("shopping".into()),
        color: None,
      })),
    );

    assert_eq!(store.task(5).unwrap().labels, vec!["shopping".to_string()]);
  }

  #[test]
  fn test_delete_task_removes_subtasks_and_notes() {
    let mut store = seeded();
    run(&mut store, EntityKind::Task, Some(5), Change::Delete);

    assert!(store.task(5).is_none());
    assert!(store.task(6).is_none());
    assert!(store.notes().get(30).is_none());
    assert!(store.notes().get(31).is_some());
  }

  #[test]
  fn test_delete_project_cascades() {
    let mut store = seeded();
    run(&mut store, EntityKind::Project, Some(10), Change::Delete);

    assert!(store.project(10).is_none());
    assert!(store.project(11).is_none());
    assert!(store.project(12).is_some());
    assert_eq!(store.len(EntityKind::Task), 1);
    assert_eq!(store.len(EntityKind::Note), 0);
  }

  #[test]
  fn test_delete_label_strips_tasks() {
    let mut store = seeded();
    run(&mut store, EntityKind::Label, Some(20), Change::Delete);

    assert!(store.labels().is_empty());
    assert!(store.task(5).unwrap().labels.is_empty());
  }
}
