//! In-memory mirror of the last synchronized remote state.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};

use crate::todoist::types::{
  Entity, EntityId, EntityKind, EntityRef, Label, Note, Project, Task,
};

use super::traits::SyncEntity;

/// Ordered table of one entity kind, unique by id.
///
/// Overwriting an entity keeps its position so listings stay stable
/// across syncs. New entities are appended.
#[derive(Debug, Clone)]
pub struct EntityTable<T> {
  items: Vec<T>,
  index: HashMap<EntityId, usize>,
}

impl<T: SyncEntity> EntityTable<T> {
  pub fn new() -> Self {
    Self {
      items: Vec::new(),
      index: HashMap::new(),
    }
  }

  /// Build a table from a list, rejecting duplicate ids.
  pub fn from_items(items: Vec<T>) -> Result<Self, EntityId> {
    let mut index = HashMap::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
      if index.insert(item.id(), position).is_some() {
        return Err(item.id());
      }
    }
    Ok(Self { items, index })
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, T> {
    self.items.iter()
  }

  pub fn contains(&self, id: EntityId) -> bool {
    self.index.contains_key(&id)
  }

  pub fn get(&self, id: EntityId) -> Option<&T> {
    self.index.get(&id).map(|&position| &self.items[position])
  }

  pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
    match self.index.get(&id) {
      Some(&position) => self.items.get_mut(position),
      None => None,
    }
  }

  /// Insert or overwrite by id. Returns the replaced entity.
  pub fn upsert(&mut self, item: T) -> Option<T> {
    match self.index.get(&item.id()) {
      Some(&position) => Some(std::mem::replace(&mut self.items[position], item)),
      None => {
        self.index.insert(item.id(), self.items.len());
        self.items.push(item);
        None
      }
    }
  }

  /// Remove by id. Removing an absent id is a no-op.
  pub fn remove(&mut self, id: EntityId) -> Option<T> {
    let position = self.index.remove(&id)?;
    let removed = self.items.remove(position);
    self.reindex();
    Some(removed)
  }

  /// Drop tombstoned entities. Returns how many were dropped.
  pub fn purge_tombstones(&mut self) -> usize {
    self.retain(|item| !item.is_deleted())
  }

  /// Keep only entities matching `keep`. Returns how many were dropped.
  pub fn retain<F>(&mut self, mut keep: F) -> usize
  where
    F: FnMut(&T) -> bool,
  {
    let before = self.items.len();
    self.items.retain(|item| keep(item));
    let dropped = before - self.items.len();
    if dropped > 0 {
      self.reindex();
    }
    dropped
  }

  fn reindex(&mut self) {
    self.index = self
      .items
      .iter()
      .enumerate()
      .map(|(position, item)| (item.id(), position))
      .collect();
  }
}

impl<T: SyncEntity> Default for EntityTable<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: PartialEq> PartialEq for EntityTable<T> {
  fn eq(&self, other: &Self) -> bool {
    self.items == other.items
  }
}

impl<T: SyncEntity> Serialize for EntityTable<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.items.serialize(serializer)
  }
}

impl<'de, T: SyncEntity> Deserialize<'de> for EntityTable<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let items = Vec::<T>::deserialize(deserializer)?;
    Self::from_items(items)
      .map_err(|id| D::Error::custom(format!("duplicate {} id {}", T::KIND, id)))
  }
}

/// Last known synchronized state plus the cursor it was synchronized to.
///
/// The field layout is the on-disk cache format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalStore {
  /// `None` until the first successful sync
  #[serde(default)]
  sync_cursor: Option<String>,
  #[serde(default)]
  tasks: EntityTable<Task>,
  #[serde(default)]
  projects: EntityTable<Project>,
  #[serde(default)]
  labels: EntityTable<Label>,
  #[serde(default)]
  notes: EntityTable<Note>,
}

impl LocalStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn sync_cursor(&self) -> Option<&str> {
    self.sync_cursor.as_deref()
  }

  /// Whether remote state has been incorporated at least once.
  pub fn is_synced(&self) -> bool {
    self.sync_cursor.is_some()
  }

  /// Only the merge engine advances the cursor.
  pub(super) fn set_sync_cursor(&mut self, cursor: String) {
    self.sync_cursor = Some(cursor);
  }

  pub fn tasks(&self) -> &EntityTable<Task> {
    &self.tasks
  }

  pub fn projects(&self) -> &EntityTable<Project> {
    &self.projects
  }

  pub fn labels(&self) -> &EntityTable<Label> {
    &self.labels
  }

  #[cfg(test)]
  pub fn notes(&self) -> &EntityTable<Note> {
    &self.notes
  }

  pub(super) fn tasks_mut(&mut self) -> &mut EntityTable<Task> {
    &mut self.tasks
  }

  pub(super) fn projects_mut(&mut self) -> &mut EntityTable<Project> {
    &mut self.projects
  }

  pub(super) fn labels_mut(&mut self) -> &mut EntityTable<Label> {
    &mut self.labels
  }

  pub(super) fn notes_mut(&mut self) -> &mut EntityTable<Note> {
    &mut self.notes
  }

  pub fn len(&self, kind: EntityKind) -> usize {
    match kind {
      EntityKind::Task => self.tasks.len(),
      EntityKind::Project => self.projects.len(),
      EntityKind::Label => self.labels.len(),
      EntityKind::Note => self.notes.len(),
    }
  }

  pub fn contains(&self, key: EntityRef) -> bool {
    match key.kind {
      EntityKind::Task => self.tasks.contains(key.id),
      EntityKind::Project => self.projects.contains(key.id),
      EntityKind::Label => self.labels.contains(key.id),
      EntityKind::Note => self.notes.contains(key.id),
    }
  }

  /// Ids of one kind in display order.
  pub fn ids(&self, kind: EntityKind) -> Vec<EntityId> {
    match kind {
      EntityKind::Task => self.tasks.iter().map(|t| t.id).collect(),
      EntityKind::Project => self.projects.iter().map(|p| p.id).collect(),
      EntityKind::Label => self.labels.iter().map(|l| l.id).collect(),
      EntityKind::Note => self.notes.iter().map(|n| n.id).collect(),
    }
  }

  /// Whether no entity of any kind is cached.
  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
      && self.projects.is_empty()
      && self.labels.is_empty()
      && self.notes.is_empty()
  }

  /// All entities of one kind in display order.
  pub fn entities(&self, kind: EntityKind) -> Vec<Entity> {
    match kind {
      EntityKind::Task => collect_entities(&self.tasks),
      EntityKind::Project => collect_entities(&self.projects),
      EntityKind::Label => collect_entities(&self.labels),
      EntityKind::Note => collect_entities(&self.notes),
    }
  }

  /// Insert or fully replace an entity.
  pub(super) fn upsert(&mut self, entity: Entity) {
    match entity {
      Entity::Task(t) => {
        self.tasks.upsert(t);
      }
      Entity::Project(p) => {
        self.projects.upsert(p);
      }
      Entity::Label(l) => {
        self.labels.upsert(l);
      }
      Entity::Note(n) => {
        self.notes.upsert(n);
      }
    }
  }

  /// Remove every listed id of `kind`. Absent ids are ignored.
  pub(super) fn remove_all(&mut self, kind: EntityKind, ids: &HashSet<EntityId>) -> usize {
    match kind {
      EntityKind::Task => self.tasks.retain(|t| !ids.contains(&t.id)),
      EntityKind::Project => self.projects.retain(|p| !ids.contains(&p.id)),
      EntityKind::Label => self.labels.retain(|l| !ids.contains(&l.id)),
      EntityKind::Note => self.notes.retain(|n| !ids.contains(&n.id)),
    }
  }

  /// Drop any entity still carrying a tombstone.
  pub(super) fn purge_tombstones(&mut self) -> usize {
    self.tasks.purge_tombstones()
      + self.projects.purge_tombstones()
      + self.labels.purge_tombstones()
      + self.notes.purge_tombstones()
  }

  pub fn task(&self, id: EntityId) -> Option<&Task> {
    self.tasks.get(id)
  }

  pub fn project(&self, id: EntityId) -> Option<&Project> {
    self.projects.get(id)
  }

  /// Case-insensitive project lookup by name.
  pub fn project_by_name(&self, name: &str) -> Option<&Project> {
    self
      .projects
      .iter()
      .find(|p| p.name.eq_ignore_ascii_case(name))
  }

  /// Notes attached to `task_id`, in store order.
  pub fn notes_for(&self, task_id: EntityId) -> impl Iterator<Item = &Note> {
    self.notes.iter().filter(move |n| n.item_id == task_id)
  }

  /// `task_id` and all its transitive subtasks.
  pub fn task_subtree(&self, task_id: EntityId) -> HashSet<EntityId> {
    subtree(task_id, self.tasks.iter().map(|t| (t.id, t.parent_id)))
  }

  /// `project_id` and all its transitive child projects.
  pub fn project_subtree(&self, project_id: EntityId) -> HashSet<EntityId> {
    subtree(project_id, self.projects.iter().map(|p| (p.id, p.parent_id)))
  }

  /// Names from the root project down to `project_id`, e.g. `["Work", "Q3"]`.
  pub fn project_path(&self, project_id: EntityId) -> Vec<&str> {
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut current = self.projects.get(project_id);
    while let Some(project) = current {
      if !seen.insert(project.id) {
        break;
      }
      path.push(project.name.as_str());
      current = project.parent_id.and_then(|id| self.projects.get(id));
    }
    path.reverse();
    path
  }
}

fn collect_entities<T: SyncEntity>(table: &EntityTable<T>) -> Vec<Entity> {
  table.iter().cloned().map(SyncEntity::into_entity).collect()
}

/// Collect `root` plus everything reachable through child -> parent links.
fn subtree(
  root: EntityId,
  links: impl Iterator<Item = (EntityId, Option<EntityId>)>,
) -> HashSet<EntityId> {
  let mut children: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
  for (id, parent) in links {
    if let Some(parent) = parent {
      children.entry(parent).or_default().push(id);
    }
  }

  let mut found = HashSet::from([root]);
  let mut pending = vec![root];
  while let Some(id) = pending.pop() {
    for &child in children.get(&id).into_iter().flatten() {
      if found.insert(child) {
        pending.push(child);
      }
    }
  }
  found
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::fixtures::{project, task};

  #[test]
  fn test_upsert_overwrites_in_place() {
    let mut table = EntityTable::new();
    table.upsert(task(1, "a"));
    table.upsert(task(2, "b"));
    let replaced = table.upsert(task(1, "a2"));

    assert_eq!(replaced.map(|t| t.content), Some("a".to_string()));
    let contents: Vec<_> = table.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["a2", "b"]);
  }

  #[test]
  fn test_remove_absent_is_noop() {
    let mut table = EntityTable::new();
    table.upsert(task(1, "a"));
    assert!(table.remove(99).is_none());
    assert_eq!(table.len(), 1);
  }

  #[test]
  fn test_remove_keeps_index_consistent() {
    let mut table = EntityTable::new();
    for id in 1..=4 {
      table.upsert(task(id, &format!("t{}", id)));
    }
    table.remove(2);

    assert_eq!(table.get(3).map(|t| t.content.as_str()), Some("t3"));
    assert_eq!(table.get(4).map(|t| t.content.as_str()), Some("t4"));
    assert!(!table.contains(2));
  }

  #[test]
  fn test_duplicate_ids_fail_to_decode() {
    let json = r#"[
      {"id": 1, "name": "a", "parent_id": null},
      {"id": 1, "name": "b", "parent_id": null}
    ]"#;
    let result: Result<EntityTable<Project>, _> = serde_json::from_str(json);
    let err = result.unwrap_err().to_string();
    assert!(err.contains("duplicate project id 1"), "{}", err);
  }

  #[test]
  fn test_entities_preserve_order() {
    let mut store = LocalStore::new();
    store.upsert(Entity::Project(project(3, "c")));
    store.upsert(Entity::Project(project(1, "a")));

    let ids: Vec<_> = store
      .entities(EntityKind::Project)
      .iter()
      .map(Entity::id)
      .collect();
    assert_eq!(ids, vec![3, 1]);
  }

  #[test]
  fn test_task_subtree_follows_parents() {
    let mut store = LocalStore::new();
    store.upsert(Entity::Task(task(1, "root")));
    store.upsert(Entity::Task(Task {
      parent_id: Some(1),
      ..task(2, "child")
    }));
    store.upsert(Entity::Task(Task {
      parent_id: Some(2),
      ..task(3, "grandchild")
    }));
    store.upsert(Entity::Task(task(4, "other")));

    let subtree = store.task_subtree(1);
    assert_eq!(subtree, HashSet::from([1, 2, 3]));
  }

  #[test]
  fn test_project_path_survives_cycles() {
    let mut store = LocalStore::new();
    store.upsert(Entity::Project(Project {
      parent_id: Some(2),
      ..project(1, "a")
    }));
    store.upsert(Entity::Project(Project {
      parent_id: Some(1),
      ..project(2, "b")
    }));

    assert_eq!(store.project_path(1), vec!["b", "a"]);
  }

  #[test]
  fn test_project_path_with_missing_parent() {
    let mut store = LocalStore::new();
    store.upsert(Entity::Project(Project {
      parent_id: Some(99),
      ..project(1, "orphan")
    }));
    assert_eq!(store.project_path(1), vec!["orphan"]);
  }

  #[test]
  fn test_ids_are_per_kind() {
    let mut store = LocalStore::new();
    assert!(store.is_empty());
    store.upsert(Entity::Task(task(3, "a")));
    store.upsert(Entity::Task(task(1, "b")));
    store.upsert(Entity::Project(project(1, "p")));

    assert!(!store.is_empty());
    assert_eq!(store.ids(EntityKind::Task), vec![3, 1]);
    assert_eq!(store.ids(EntityKind::Project), vec![1]);
    assert!(store.ids(EntityKind::Note).is_empty());
  }
}
