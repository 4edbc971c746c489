//! Store integration for Todoist types.

use crate::cache::SyncEntity;

use super::types::{Entity, EntityId, EntityKind, Label, Note, Project, Task};

// ============================================================================
// SyncEntity implementations
// ============================================================================

impl SyncEntity for Task {
  const KIND: EntityKind = EntityKind::Task;

  fn id(&self) -> EntityId {
    self.id
  }

  fn is_deleted(&self) -> bool {
    self.is_deleted
  }

  fn into_entity(self) -> Entity {
    Entity::Task(self)
  }

  fn from_entity(entity: Entity) -> Option<Self> {
    match entity {
      Entity::Task(t) => Some(t),
      _ => None,
    }
  }
}

impl SyncEntity for Project {
  const KIND: EntityKind = EntityKind::Project;

  fn id(&self) -> EntityId {
    self.id
  }

  fn is_deleted(&self) -> bool {
    self.is_deleted
  }

  fn into_entity(self) -> Entity {
    Entity::Project(self)
  }

  fn from_entity(entity: Entity) -> Option<Self> {
    match entity {
      Entity::Project(p) => Some(p),
      _ => None,
    }
  }
}

impl SyncEntity for Label {
  const KIND: EntityKind = EntityKind::Label;

  fn id(&self) -> EntityId {
    self.id
  }

  fn is_deleted(&self) -> bool {
    self.is_deleted
  }

  fn into_entity(self) -> Entity {
    Entity::Label(self)
  }

  fn from_entity(entity: Entity) -> Option<Self> {
    match entity {
      Entity::Label(l) => Some(l),
      _ => None,
    }
  }
}

impl SyncEntity for Note {
  const KIND: EntityKind = EntityKind::Note;

  fn id(&self) -> EntityId {
    self.id
  }

  fn is_deleted(&self) -> bool {
    self.is_deleted
  }

  fn into_entity(self) -> Entity {
    Entity::Note(self)
  }

  fn from_entity(entity: Entity) -> Option<Self> {
    match entity {
      Entity::Note(n) => Some(n),
      _ => None,
    }
  }
}
