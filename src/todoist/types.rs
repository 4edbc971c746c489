use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identifier, stable across sync cycles
pub type EntityId = u64;

/// The kinds of records mirrored in the local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Task,
  Project,
  Label,
  Note,
}

impl EntityKind {
  pub const ALL: [EntityKind; 4] = [
    EntityKind::Task,
    EntityKind::Project,
    EntityKind::Label,
    EntityKind::Note,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      EntityKind::Task => "task",
      EntityKind::Project => "project",
      EntityKind::Label => "label",
      EntityKind::Note => "note",
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `(kind, id)` key of a cached entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
  pub kind: EntityKind,
  pub id: EntityId,
}

impl EntityRef {
  pub fn new(kind: EntityKind, id: EntityId) -> Self {
    Self { kind, id }
  }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.kind, self.id)
  }
}

/// Task priority as the API encodes it: 4 is most urgent, 1 is the default.
///
/// Users think in levels instead (p1 is most urgent), see [`Priority::level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
  pub const LOWEST: Priority = Priority(1);

  /// Build from a user-facing level (1 = p1 = most urgent).
  pub fn from_level(level: u8) -> Option<Self> {
    (1..=4).contains(&level).then(|| Priority(5 - level))
  }

  pub fn level(&self) -> u8 {
    5 - self.0
  }

  pub fn value(&self) -> u8 {
    self.0
  }
}

impl Default for Priority {
  fn default() -> Self {
    Self::LOWEST
  }
}

impl TryFrom<u8> for Priority {
  type Error = String;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    if (1..=4).contains(&value) {
      Ok(Priority(value))
    } else {
      Err(format!("priority must be between 1 and 4, got {}", value))
    }
  }
}

impl From<Priority> for u8 {
  fn from(p: Priority) -> u8 {
    p.0
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "p{}", self.level())
  }
}

/// Due date of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Due {
  /// `YYYY-MM-DD`, or a datetime `YYYY-MM-DDTHH:MM:SS[Z]`. Empty while the
  /// server has not resolved a natural-language `string` yet.
  #[serde(default)]
  pub date: String,
  /// Human form as entered, e.g. "every monday"
  #[serde(default)]
  pub string: String,
  #[serde(default)]
  pub is_recurring: bool,
}

impl Due {
  /// Build a due date from user input, resolving the forms that need no server help.
  pub fn from_input(input: &str, today: NaiveDate) -> Self {
    let trimmed = input.trim();
    let date = match trimmed.to_lowercase().as_str() {
      "today" => Some(today),
      "tomorrow" => Some(today + Duration::days(1)),
      _ => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y/%m/%d"))
        .ok(),
    };

    Due {
      date: date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
      string: trimmed.to_string(),
      is_recurring: trimmed.to_lowercase().starts_with("every"),
    }
  }

  pub fn naive_date(&self) -> Option<NaiveDate> {
    let day = self.date.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
  }

  pub fn naive_datetime(&self) -> Option<NaiveDateTime> {
    let stamp = self.date.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S").ok()
  }
}

/// A task (the API calls these "items")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: EntityId,
  pub content: String,
  #[serde(default)]
  pub description: String,
  pub project_id: Option<EntityId>,
  /// Parent task for subtasks
  pub parent_id: Option<EntityId>,
  #[serde(default)]
  pub priority: Priority,
  /// Label names
  #[serde(default)]
  pub labels: Vec<String>,
  pub due: Option<Due>,
  #[serde(default)]
  pub checked: bool,
  #[serde(default)]
  pub child_order: i64,
  pub added_at: Option<String>,
  #[serde(default)]
  pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: EntityId,
  pub name: String,
  pub parent_id: Option<EntityId>,
  #[serde(default)]
  pub color: String,
  #[serde(default)]
  pub child_order: i64,
  #[serde(default)]
  pub is_archived: bool,
  #[serde(default)]
  pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
  pub id: EntityId,
  pub name: String,
  #[serde(default)]
  pub color: String,
  #[serde(default)]
  pub item_order: i64,
  #[serde(default)]
  pub is_deleted: bool,
}

/// Comment attached to a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
  pub id: EntityId,
  /// Task the note belongs to
  pub item_id: EntityId,
  pub content: String,
  pub posted_at: Option<String>,
  #[serde(default)]
  pub is_deleted: bool,
}

/// Completed task history entry (premium accounts only, never cached)
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTask {
  pub task_id: EntityId,
  pub content: String,
  pub project_id: Option<EntityId>,
  pub completed_at: String,
}

/// Any cached record
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
  Task(Task),
  Project(Project),
  Label(Label),
  Note(Note),
}

impl Entity {
  pub fn kind(&self) -> EntityKind {
    match self {
      Entity::Task(_) => EntityKind::Task,
      Entity::Project(_) => EntityKind::Project,
      Entity::Label(_) => EntityKind::Label,
      Entity::Note(_) => EntityKind::Note,
    }
  }

  pub fn id(&self) -> EntityId {
    match self {
      Entity::Task(t) => t.id,
      Entity::Project(p) => p.id,
      Entity::Label(l) => l.id,
      Entity::Note(n) => n.id,
    }
  }

  pub fn is_deleted(&self) -> bool {
    match self {
      Entity::Task(t) => t.is_deleted,
      Entity::Project(p) => p.is_deleted,
      Entity::Label(l) => l.is_deleted,
      Entity::Note(n) => n.is_deleted,
    }
  }

  pub fn key(&self) -> EntityRef {
    EntityRef::new(self.kind(), self.id())
  }
}
