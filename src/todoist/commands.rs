//! Mutation requests and their Sync API command encoding.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::CoreError;

use super::types::{EntityId, EntityKind, Priority};

/// What a mutating command asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
  Add(Draft),
  Modify(Patch),
  /// Complete a task
  Close,
  Delete,
}

/// Fields of a new entity
#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
  Task(NewTask),
  Project(NewProject),
  Label(NewLabel),
  Note(NewNote),
}

impl Draft {
  pub fn kind(&self) -> EntityKind {
    match self {
      Draft::Task(_) => EntityKind::Task,
      Draft::Project(_) => EntityKind::Project,
      Draft::Label(_) => EntityKind::Label,
      Draft::Note(_) => EntityKind::Note,
    }
  }
}

/// Fields to change on an existing entity; `None` leaves a field as is.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
  Task(TaskPatch),
  Project(AttributePatch),
  Label(AttributePatch),
  Note { content: String },
}

impl Patch {
  pub fn kind(&self) -> EntityKind {
    match self {
      Patch::Task(_) => EntityKind::Task,
      Patch::Project(_) => EntityKind::Project,
      Patch::Label(_) => EntityKind::Label,
      Patch::Note { .. } => EntityKind::Note,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
  pub content: String,
  pub description: Option<String>,
  pub project_id: Option<EntityId>,
  pub parent_id: Option<EntityId>,
  pub priority: Option<Priority>,
  pub labels: Vec<String>,
  /// Natural language or `YYYY-MM-DD`, resolved by the server
  pub due_string: Option<String>,
  /// Also set a reminder at the due time (premium accounts)
  pub reminder: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
  pub content: Option<String>,
  pub priority: Option<Priority>,
  pub labels: Option<Vec<String>>,
  pub due_string: Option<String>,
  /// Moving a task is a separate remote command
  pub project_id: Option<EntityId>,
}

impl TaskPatch {
  pub fn is_empty(&self) -> bool {
    *self == TaskPatch::default()
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProject {
  pub name: String,
  pub parent_id: Option<EntityId>,
  pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewLabel {
  pub name: String,
  pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNote {
  pub task_id: EntityId,
  pub content: String,
}

/// Name/color changes shared by projects and labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributePatch {
  pub name: Option<String>,
  pub color: Option<String>,
}

/// One entry of the `commands` array of a sync request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncCommand {
  #[serde(rename = "type")]
  pub command_type: &'static str,
  pub uuid: Uuid,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub temp_id: Option<String>,
  pub args: Value,
}

impl SyncCommand {
  fn new(command_type: &'static str, args: Value) -> Self {
    Self {
      command_type,
      uuid: Uuid::new_v4(),
      temp_id: None,
      args,
    }
  }

  fn with_temp_id(mut self, temp_id: &str) -> Self {
    self.temp_id = Some(temp_id.to_string());
    self
  }
}

/// Commands for one change, plus the temporary id an add was sent under.
#[derive(Debug, Clone)]
pub struct CommandPlan {
  pub commands: Vec<SyncCommand>,
  pub temp_id: Option<String>,
}

/// What the server reported back for accepted commands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandReceipt {
  pub temp_id_mapping: HashMap<String, EntityId>,
}

impl CommandReceipt {
  pub fn resolve(&self, temp_id: &str) -> Option<EntityId> {
    self.temp_id_mapping.get(temp_id).copied()
  }
}

/// Encode `change` against `(kind, id)` as remote commands.
///
/// Only checks the shape of the request; whether `id` exists is the
/// caller's concern.
pub fn plan(
  kind: EntityKind,
  id: Option<EntityId>,
  change: &Change,
) -> Result<CommandPlan, CoreError> {
  match (change, id) {
    (Change::Add(draft), None) => {
      if draft.kind() != kind {
        return Err(CoreError::InvalidChange(format!(
          "cannot add a {} as a {}",
          draft.kind(),
          kind
        )));
      }
      let temp_id = Uuid::new_v4().to_string();
      let mut commands = vec![add_command(draft).with_temp_id(&temp_id)];
      if let Draft::Task(task) = draft {
        if task.reminder {
          commands.push(reminder_command(task, &temp_id)?);
        }
      }
      Ok(CommandPlan {
        commands,
        temp_id: Some(temp_id),
      })
    }
    (Change::Add(_), Some(id)) => Err(CoreError::InvalidChange(format!(
      "new {} cannot carry an id ({})",
      kind, id
    ))),
    (_, None) => Err(CoreError::InvalidChange(format!("{} id is required", kind))),
    (Change::Modify(patch), Some(id)) => {
      if patch.kind() != kind {
        return Err(CoreError::InvalidChange(format!(
          "cannot apply a {} change to a {}",
          patch.kind(),
          kind
        )));
      }
      Ok(CommandPlan {
        commands: modify_commands(id, patch)?,
        temp_id: None,
      })
    }
    (Change::Close, Some(id)) => {
      if kind != EntityKind::Task {
        return Err(CoreError::InvalidChange(format!(
          "only tasks can be closed, not a {}",
          kind
        )));
      }
      Ok(CommandPlan {
        commands: vec![SyncCommand::new("item_close", json!({ "id": id.to_string() }))],
        temp_id: None,
      })
    }
    (Change::Delete, Some(id)) => {
      let command_type = match kind {
        EntityKind::Task => "item_delete",
        EntityKind::Project => "project_delete",
        EntityKind::Label => "label_delete",
        EntityKind::Note => "note_delete",
      };
      Ok(CommandPlan {
        commands: vec![SyncCommand::new(command_type, json!({ "id": id.to_string() }))],
        temp_id: None,
      })
    }
  }
}

fn add_command(draft: &Draft) -> SyncCommand {
  match draft {
    Draft::Task(task) => {
      let mut args = Map::new();
      args.insert("content".into(), json!(task.content));
      insert_opt(&mut args, "description", task.description.as_ref());
      insert_opt(&mut args, "project_id", task.project_id.map(|id| id.to_string()));
      insert_opt(&mut args, "parent_id", task.parent_id.map(|id| id.to_string()));
      insert_opt(&mut args, "priority", task.priority.map(|p| p.value()));
      if !task.labels.is_empty() {
        args.insert("labels".into(), json!(task.labels));
      }
      if let Some(due) = &task.due_string {
        args.insert("due".into(), json!({ "string": due }));
      }
      SyncCommand::new("item_add", Value::Object(args))
    }
    Draft::Project(project) => {
      let mut args = Map::new();
      args.insert("name".into(), json!(project.name));
      insert_opt(&mut args, "parent_id", project.parent_id.map(|id| id.to_string()));
      insert_opt(&mut args, "color", project.color.as_ref());
      SyncCommand::new("project_add", Value::Object(args))
    }
    Draft::Label(label) => {
      let mut args = Map::new();
      args.insert("name".into(), json!(label.name));
      insert_opt(&mut args, "color", label.color.as_ref());
      SyncCommand::new("label_add", Value::Object(args))
    }
    Draft::Note(note) => SyncCommand::new(
      "note_add",
      json!({ "item_id": note.task_id.to_string(), "content": note.content }),
    ),
  }
}

/// `reminder_add` for a task sent in the same batch, referenced by its temp id.
fn reminder_command(task: &NewTask, task_temp_id: &str) -> Result<SyncCommand, CoreError> {
  let due = task
    .due_string
    .as_ref()
    .ok_or_else(|| CoreError::InvalidChange("a reminder needs a due date".into()))?;
  Ok(SyncCommand::new(
    "reminder_add",
    json!({
      "item_id": task_temp_id,
      "type": "absolute",
      "due": { "string": due },
    }),
  ))
}

fn modify_commands(id: EntityId, patch: &Patch) -> Result<Vec<SyncCommand>, CoreError> {
  let mut args = Map::new();
  args.insert("id".into(), json!(id.to_string()));

  let (command_type, move_to) = match patch {
    Patch::Task(task) => {
      if task.is_empty() {
        return Err(CoreError::InvalidChange("nothing to modify".into()));
      }
      insert_opt(&mut args, "content", task.content.as_ref());
      insert_opt(&mut args, "priority", task.priority.map(|p| p.value()));
      insert_opt(&mut args, "labels", task.labels.as_ref());
      if let Some(due) = &task.due_string {
        args.insert("due".into(), json!({ "string": due }));
      }
      ("item_update", task.project_id)
    }
    Patch::Project(attrs) | Patch::Label(attrs) => {
      if attrs.name.is_none() && attrs.color.is_none() {
        return Err(CoreError::InvalidChange("nothing to modify".into()));
      }
      insert_opt(&mut args, "name", attrs.name.as_ref());
      insert_opt(&mut args, "color", attrs.color.as_ref());
      let command_type = match patch {
        Patch::Project(_) => "project_update",
        _ => "label_update",
      };
      (command_type, None)
    }
    Patch::Note { content } => {
      args.insert("content".into(), json!(content));
      ("note_update", None)
    }
  };

  let mut commands = Vec::new();
  // A bare move has nothing else to update.
  if args.len() > 1 {
    commands.push(SyncCommand::new(command_type, Value::Object(args)));
  }
  if let Some(project_id) = move_to {
    commands.push(SyncCommand::new(
      "item_move",
      json!({ "id": id.to_string(), "project_id": project_id.to_string() }),
    ));
  }
  Ok(commands)
}

fn insert_opt<T: Serialize>(args: &mut Map<String, Value>, key: &str, value: Option<T>) {
  if let Some(value) = value {
    args.insert(key.to_string(), json!(value));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_add_task_gets_temp_id() {
    let plan = plan(
      EntityKind::Task,
      None,
      &Change::Add(Draft::Task(NewTask {
        content: "Buy milk".into(),
        priority: Priority::from_level(1),
        labels: vec!["errand".into()],
        due_string: Some("tomorrow".into()),
        ..NewTask::default()
      })),
    )
    .unwrap();

    let command = &plan.commands[0];
    assert_eq!(command.command_type, "item_add");
    assert_eq!(command.temp_id, plan.temp_id);
    assert_eq!(command.args["priority"], 4);
    assert_eq!(command.args["due"]["string"], "tomorrow");
    assert!(command.args.get("project_id").is_none());
  }

  #[test]
  fn test_reminder_follows_task_in_same_batch() {
    let plan = plan(
      EntityKind::Task,
      None,
      &Change::Add(Draft::Task(NewTask {
        content: "Dentist".into(),
        due_string: Some("friday 9am".into()),
        reminder: true,
        ..NewTask::default()
      })),
    )
    .unwrap();

    let types: Vec<_> = plan.commands.iter().map(|c| c.command_type).collect();
    assert_eq!(types, vec!["item_add", "reminder_add"]);
    let reminder = &plan.commands[1];
    assert_eq!(reminder.args["item_id"].as_str(), plan.temp_id.as_deref());
    assert_eq!(reminder.args["due"]["string"], "friday 9am");
    assert!(reminder.temp_id.is_none());
  }

  #[test]
  fn test_reminder_without_date_is_rejected() {
    let result = plan(
      EntityKind::Task,
      None,
      &Change::Add(Draft::Task(NewTask {
        content: "Dentist".into(),
        reminder: true,
        ..NewTask::default()
      })),
    );
    assert!(matches!(result, Err(CoreError::InvalidChange(_))));
  }

  #[test]
  fn test_close_encodes_string_id() {
    let plan = plan(EntityKind::Task, Some(5), &Change::Close).unwrap();
    let encoded = serde_json::to_value(&plan.commands[0]).unwrap();

    assert_eq!(encoded["type"], "item_close");
    assert_eq!(encoded["args"]["id"], "5");
    assert!(encoded.get("temp_id").is_none());
  }

  #[test]
  fn test_close_rejects_non_tasks() {
    let result = plan(EntityKind::Project, Some(5), &Change::Close);
    assert!(matches!(result, Err(CoreError::InvalidChange(_))));
  }

  #[test]
  fn test_modify_with_project_adds_move() {
    let patch = TaskPatch {
      content: Some("Buy oat milk".into()),
      project_id: Some(10),
      ..TaskPatch::default()
    };
    let plan = plan(EntityKind::Task, Some(5), &Change::Modify(Patch::Task(patch))).unwrap();

    let types: Vec<_> = plan.commands.iter().map(|c| c.command_type).collect();
    assert_eq!(types, vec!["item_update", "item_move"]);
  }

  #[test]
  fn test_move_only_skips_update() {
    let patch = TaskPatch {
      project_id: Some(10),
      ..TaskPatch::default()
    };
    let plan = plan(EntityKind::Task, Some(5), &Change::Modify(Patch::Task(patch))).unwrap();

    assert_eq!(plan.commands.len(), 1);
    assert_eq!(plan.commands[0].command_type, "item_move");
  }

  #[test]
  fn test_empty_patch_is_rejected() {
    let result = plan(
      EntityKind::Task,
      Some(5),
      &Change::Modify(Patch::Task(TaskPatch::default())),
    );
    assert!(matches!(result, Err(CoreError::InvalidChange(_))));
  }

  #[test]
  fn test_mismatched_kind_is_rejected() {
    let result = plan(
      EntityKind::Task,
      None,
      &Change::Add(Draft::Label(NewLabel {
        name: "x".into(),
        color: None,
      })),
    );
    assert!(matches!(result, Err(CoreError::InvalidChange(_))));
  }

  #[test]
  fn test_delete_requires_id() {
    let result = plan(EntityKind::Label, None, &Change::Delete);
    assert!(matches!(result, Err(CoreError::InvalidChange(_))));
  }

  #[test]
  fn test_receipt_resolves_temp_ids() {
    let receipt = CommandReceipt {
      temp_id_mapping: HashMap::from([("tmp".to_string(), 77)]),
    };
    assert_eq!(receipt.resolve("tmp"), Some(77));
    assert_eq!(receipt.resolve("other"), None);
  }
}
