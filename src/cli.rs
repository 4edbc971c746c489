//! Subcommands and their handlers.
//!
//! Handlers are thin: they turn arguments into core calls and core results
//! into rows. Output goes to the writer they are given.

use chrono::{DateTime, Local, NaiveDate};
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::process::Command as Process;
use std::sync::LazyLock;

use crate::cache::{CacheLayer, CacheStorage, LocalStore, RemoteSync, SyncEntity, SyncSummary};
use crate::filter;
use crate::output::{Cell, Table, Tone, View};
use crate::todoist::commands::{
  AttributePatch, Change, Draft, NewLabel, NewNote, NewProject, NewTask, Patch, TaskPatch,
};
use crate::todoist::types::{
  CompletedTask, Due, EntityId, EntityKind, Label, Priority, Project, Task,
};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
  /// Show all open tasks
  #[command(visible_alias = "l")]
  List {
    /// Filter expression, e.g. "(overdue | today) & p1"
    #[arg(short, long)]
    filter: Option<String>,
  },

  /// Show task detail
  Show {
    id: EntityId,
    /// Open the first URL in the task content with the system browser
    #[arg(short = 'o', long)]
    browse: bool,
  },

  /// Show completed tasks (premium accounts only)
  #[command(name = "completed-list", visible_aliases = ["c-l", "cl"])]
  CompletedList,

  /// Add a task
  #[command(visible_alias = "a")]
  Add {
    content: String,
    #[command(flatten)]
    fields: TaskFields,
    /// Also set a reminder at the due time (premium accounts)
    #[arg(short = 'r', long, requires = "date")]
    reminder: bool,
  },

  /// Add a task from one line of text, e.g. "Buy milk tomorrow #Home @errand p1"
  #[command(name = "quick-add", visible_alias = "q")]
  QuickAdd {
    #[arg(required = true)]
    text: Vec<String>,
    /// Add the default reminder when the text sets a time
    #[arg(short = 'r', long)]
    reminder: bool,
  },

  /// Read a quick-add line from standard input
  Quick,

  /// Modify a task
  #[command(visible_alias = "m")]
  Modify {
    id: EntityId,
    #[arg(short, long)]
    content: Option<String>,
    #[command(flatten)]
    fields: TaskFields,
  },

  /// Close tasks
  #[command(visible_alias = "c")]
  Close {
    #[arg(required = true)]
    ids: Vec<EntityId>,
  },

  /// Delete tasks
  #[command(visible_alias = "d")]
  Delete {
    #[arg(required = true)]
    ids: Vec<EntityId>,
  },

  /// Show all labels
  Labels,

  /// Show all projects
  Projects,

  /// Add, rename or delete a project
  #[command(subcommand)]
  Project(AttributeCommand),

  /// Add, rename or delete a label
  #[command(subcommand)]
  Label(AttributeCommand),

  /// Add, edit or delete a task comment
  #[command(subcommand)]
  Note(NoteCommand),

  /// Show the karma score
  Karma,

  /// Sync the local cache
  #[command(visible_alias = "s")]
  Sync,
}

/// Task fields shared by `add` and `modify`
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct TaskFields {
  /// Priority level, 1 (urgent) to 4
  #[arg(short, long)]
  pub priority: Option<u8>,
  /// Label names, separated by commas
  #[arg(short = 'L', long = "labels")]
  pub labels: Option<String>,
  #[arg(short = 'P', long, conflicts_with = "project_name")]
  pub project_id: Option<EntityId>,
  #[arg(short = 'N', long)]
  pub project_name: Option<String>,
  /// Due date: today, tomorrow, 2024/10/02, or any phrase the server understands
  #[arg(short, long)]
  pub date: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum AttributeCommand {
  Add {
    name: String,
    /// Parent project id (projects only)
    #[arg(long)]
    parent: Option<EntityId>,
    #[arg(long)]
    color: Option<String>,
  },
  Modify {
    id: EntityId,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    color: Option<String>,
  },
  Delete {
    id: EntityId,
  },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum NoteCommand {
  Add { task_id: EntityId, content: String },
  Modify { id: EntityId, content: String },
  Delete { id: EntityId },
}

pub async fn run<R, S, W>(
  command: Command,
  layer: &mut CacheLayer<R, S>,
  view: &View,
  out: &mut W,
) -> Result<()>
where
  R: RemoteSync,
  S: CacheStorage,
  W: Write,
{
  let today = Local::now().date_naive();

  match command {
    Command::List { filter } => {
      let expr = filter.as_deref().map(filter::parse).transpose()?;
      let store = layer.read().await?;
      let mut table = Table::new(&["ID", "Priority", "DueDate", "Project", "Labels", "Content"]);
      for (task, depth) in ordered_open_tasks(store) {
        if expr.as_ref().is_some_and(|e| !e.matches(task, store, today)) {
          continue;
        }
        table.push(task_row(task, depth, store, view));
      }
      write!(out, "{}", table.render(view))?;
    }
    Command::Show { id, browse } => {
      let store = layer.read().await?;
      let task = store
        .task(id)
        .ok_or_else(|| eyre!("task {} not found", id))?;
      write!(out, "{}", detail_table(task, store, view).render(view))?;
      if browse {
        match first_url(&task.content) {
          Some(url) => open_url(url)?,
          None => tracing::info!(id, "no URL in task content"),
        }
      }
    }
    Command::CompletedList => {
      let completed = layer.completed_tasks().await?;
      let store = layer.read().await?;
      let mut table = Table::new(&["ID", "CompletedDate", "Project", "Content"]);
      for item in &completed {
        table.push(completed_row(item, store, view));
      }
      write!(out, "{}", table.render(view))?;
    }
    Command::Add {
      content,
      fields,
      reminder,
    } => {
      let store = layer.read().await?;
      let draft = NewTask {
        content,
        description: None,
        project_id: resolve_project(store, &fields)?,
        parent_id: None,
        priority: parse_priority(fields.priority)?,
        labels: fields.labels.as_deref().map(split_labels).unwrap_or_default(),
        due_string: fields.date,
        reminder,
      };
      let key = layer
        .mutate(EntityKind::Task, None, Change::Add(Draft::Task(draft)))
        .await?;
      writeln!(out, "{}", key.id)?;
    }
    Command::QuickAdd { text, reminder } => {
      let key = layer.quick_add(&text.join(" "), reminder).await?;
      writeln!(out, "{}", key.id)?;
    }
    Command::Quick => {
      let text = read_quick_line(&mut std::io::stdin().lock(), &mut std::io::stderr())?;
      let key = layer.quick_add(&text, false).await?;
      writeln!(out, "{}", key.id)?;
    }
    Command::Modify {
      id,
      content,
      fields,
    } => {
      let store = layer.read().await?;
      let patch = TaskPatch {
        content,
        priority: parse_priority(fields.priority)?,
        labels: fields.labels.as_deref().map(split_labels),
        due_string: fields.date.clone(),
        project_id: resolve_project(store, &fields)?,
      };
      layer
        .mutate(EntityKind::Task, Some(id), Change::Modify(Patch::Task(patch)))
        .await?;
    }
    Command::Close { ids } => {
      for id in ids {
        layer.mutate(EntityKind::Task, Some(id), Change::Close).await?;
      }
    }
    Command::Delete { ids } => {
      for id in ids {
        layer.mutate(EntityKind::Task, Some(id), Change::Delete).await?;
      }
    }
    Command::Labels => {
      let mut table = Table::new(&["ID", "Name"]);
      let labels = layer.get_all(EntityKind::Label).await?;
      for label in labels.into_iter().filter_map(Label::from_entity) {
        table.push(vec![
          Cell::plain(label.id.to_string()),
          Cell::new(format!("@{}", label.name), Tone::Label),
        ]);
      }
      write!(out, "{}", table.render(view))?;
    }
    Command::Projects => {
      let store = layer.read().await?;
      let mut table = Table::new(&["ID", "Name"]);
      for (project, depth) in ordered_projects(store) {
        let name = if view.project_namespace {
          project_label(store, project.id, true)
        } else {
          format!("{}#{}", indent(depth, view), project.name)
        };
        table.push(vec![
          Cell::plain(project.id.to_string()),
          Cell::new(name, Tone::Project),
        ]);
      }
      write!(out, "{}", table.render(view))?;
    }
    Command::Project(action) => {
      mutate_attributes(layer, EntityKind::Project, action, out).await?;
    }
    Command::Label(action) => {
      mutate_attributes(layer, EntityKind::Label, action, out).await?;
    }
    Command::Note(action) => {
      let (id, change) = match action {
        NoteCommand::Add { task_id, content } => (
          None,
          Change::Add(Draft::Note(NewNote { task_id, content })),
        ),
        NoteCommand::Modify { id, content } => {
          (Some(id), Change::Modify(Patch::Note { content }))
        }
        NoteCommand::Delete { id } => (Some(id), Change::Delete),
      };
      let is_add = id.is_none();
      let key = layer.mutate(EntityKind::Note, id, change).await?;
      if is_add {
        writeln!(out, "{}", key.id)?;
      }
    }
    Command::Karma => {
      let karma = layer.karma().await?;
      writeln!(out, "{}", karma)?;
    }
    Command::Sync => {
      let summary = layer.sync().await?;
      tracing::debug!(cursor = %summary.cursor, "cursor advanced");
      writeln!(out, "{}", sync_line(&summary))?;
    }
  }

  Ok(())
}

/// Project and label changes; prints the new id after an add.
async fn mutate_attributes<R, S, W>(
  layer: &mut CacheLayer<R, S>,
  kind: EntityKind,
  action: AttributeCommand,
  out: &mut W,
) -> Result<()>
where
  R: RemoteSync,
  S: CacheStorage,
  W: Write,
{
  if kind == EntityKind::Label {
    if let AttributeCommand::Add {
      parent: Some(_), ..
    } = action
    {
      return Err(eyre!("labels cannot have a parent"));
    }
  }

  let id = action.id();
  let key = layer.mutate(kind, id, action.into_change(kind)).await?;
  if id.is_none() {
    writeln!(out, "{}", key.id)?;
  }
  Ok(())
}

impl AttributeCommand {
  fn id(&self) -> Option<EntityId> {
    match self {
      AttributeCommand::Add { .. } => None,
      AttributeCommand::Modify { id, .. } | AttributeCommand::Delete { id } => Some(*id),
    }
  }

  fn into_change(self, kind: EntityKind) -> Change {
    match self {
      AttributeCommand::Add {
        name,
        parent,
        color,
      } => match kind {
        EntityKind::Project => Change::Add(Draft::Project(NewProject {
          name,
          parent_id: parent,
          color,
        })),
        _ => Change::Add(Draft::Label(NewLabel { name, color })),
      },
      AttributeCommand::Modify { name, color, .. } => {
        let attrs = AttributePatch { name, color };
        match kind {
          EntityKind::Project => Change::Modify(Patch::Project(attrs)),
          _ => Change::Modify(Patch::Label(attrs)),
        }
      }
      AttributeCommand::Delete { .. } => Change::Delete,
    }
  }
}

/// One line describing what a sync changed.
fn sync_line(summary: &SyncSummary) -> String {
  format!(
    "{} sync: {} updated, {} removed",
    if summary.full_sync { "full" } else { "incremental" },
    summary.stats.upserted,
    summary.stats.removed,
  )
}

/// Prompts on `prompt` and returns the first line of `input`, trimmed.
fn read_quick_line(input: &mut impl BufRead, prompt: &mut impl Write) -> Result<String> {
  write!(prompt, "Quick add: ")?;
  prompt.flush()?;
  let mut line = String::new();
  input.read_line(&mut line)?;
  let text = line.trim();
  if text.is_empty() {
    return Err(eyre!("nothing to add"));
  }
  Ok(text.to_string())
}

static URL_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"https?://[^\s)\]>]+").expect("valid url regex"));

fn first_url(text: &str) -> Option<&str> {
  URL_RE.find(text).map(|m| m.as_str())
}

fn open_url(url: &str) -> Result<()> {
  let mut process = if cfg!(target_os = "macos") {
    Process::new("open")
  } else if cfg!(target_os = "windows") {
    let mut cmd = Process::new("cmd");
    cmd.args(["/C", "start", ""]);
    cmd
  } else {
    Process::new("xdg-open")
  };
  let status = process.arg(url).status()?;
  if !status.success() {
    return Err(eyre!("could not open {} ({})", url, status));
  }
  Ok(())
}

fn parse_priority(level: Option<u8>) -> Result<Option<Priority>> {
  level
    .map(|l| Priority::from_level(l).ok_or_else(|| eyre!("priority must be 1 to 4, got {}", l)))
    .transpose()
}

fn split_labels(raw: &str) -> Vec<String> {
  raw
    .split(',')
    .map(|l| l.trim().trim_start_matches('@'))
    .filter(|l| !l.is_empty())
    .map(str::to_string)
    .collect()
}

fn resolve_project(store: &LocalStore, fields: &TaskFields) -> Result<Option<EntityId>> {
  if let Some(name) = &fields.project_name {
    let name = name.trim_start_matches('#');
    return store
      .project_by_name(name)
      .map(|p| Some(p.id))
      .ok_or_else(|| eyre!("no project named '{}'", name));
  }
  Ok(fields.project_id)
}

/// Open tasks in display order: projects by their order, subtasks right
/// after their parent. Pairs each task with its depth.
fn ordered_open_tasks(store: &LocalStore) -> Vec<(&Task, usize)> {
  let open: HashMap<EntityId, &Task> = store
    .tasks()
    .iter()
    .filter(|t| !t.checked)
    .map(|t| (t.id, t))
    .collect();

  let project_order = |task: &Task| {
    task
      .project_id
      .and_then(|id| store.project(id))
      .map(|p| p.child_order)
      .unwrap_or(i64::MAX)
  };

  let mut roots: Vec<&Task> = Vec::new();
  let mut children: HashMap<EntityId, Vec<&Task>> = HashMap::new();
  for task in store.tasks().iter().filter(|t| !t.checked) {
    match task.parent_id.filter(|p| open.contains_key(p)) {
      Some(parent) => children.entry(parent).or_default().push(task),
      None => roots.push(task),
    }
  }
  roots.sort_by_key(|t| (project_order(t), t.project_id, t.child_order, t.id));
  for siblings in children.values_mut() {
    siblings.sort_by_key(|t| (t.child_order, t.id));
  }

  let mut ordered = Vec::with_capacity(open.len());
  let mut seen = HashSet::new();
  let mut pending: Vec<(&Task, usize)> = roots.into_iter().rev().map(|t| (t, 0)).collect();
  while let Some((task, depth)) = pending.pop() {
    if !seen.insert(task.id) {
      continue;
    }
    ordered.push((task, depth));
    if let Some(kids) = children.get(&task.id) {
      pending.extend(kids.iter().rev().map(|k| (*k, depth + 1)));
    }
  }
  ordered
}

/// Projects in display order with their nesting depth.
fn ordered_projects(store: &LocalStore) -> Vec<(&Project, usize)> {
  let mut roots: Vec<&Project> = Vec::new();
  let mut children: HashMap<EntityId, Vec<&Project>> = HashMap::new();
  for project in store.projects().iter() {
    match project.parent_id.filter(|p| store.project(*p).is_some()) {
      Some(parent) => children.entry(parent).or_default().push(project),
      None => roots.push(project),
    }
  }
  roots.sort_by_key(|p| (p.child_order, p.id));
  for siblings in children.values_mut() {
    siblings.sort_by_key(|p| (p.child_order, p.id));
  }

  let mut ordered = Vec::new();
  let mut seen = HashSet::new();
  let mut pending: Vec<(&Project, usize)> = roots.into_iter().rev().map(|p| (p, 0)).collect();
  while let Some((project, depth)) = pending.pop() {
    if !seen.insert(project.id) {
      continue;
    }
    ordered.push((project, depth));
    if let Some(kids) = children.get(&project.id) {
      pending.extend(kids.iter().rev().map(|k| (*k, depth + 1)));
    }
  }
  ordered
}

fn indent(depth: usize, view: &View) -> String {
  if view.indent {
    "  ".repeat(depth)
  } else {
    String::new()
  }
}

/// `#Name`, or `#Parent:Child` with namespaces; empty for unknown projects.
fn project_label(store: &LocalStore, project_id: EntityId, namespace: bool) -> String {
  let path = store.project_path(project_id);
  match (namespace, path.last()) {
    (_, None) => String::new(),
    (true, Some(_)) => format!("#{}", path.join(":")),
    (false, Some(name)) => format!("#{}", name),
  }
}

fn task_content(task: &Task, depth: usize, store: &LocalStore, view: &View) -> String {
  if !view.namespace {
    return format!("{}{}", indent(depth, view), task.content);
  }

  let mut parts = vec![task.content.as_str()];
  let mut seen = HashSet::from([task.id]);
  let mut parent = task.parent_id.and_then(|id| store.task(id));
  while let Some(p) = parent {
    if !seen.insert(p.id) {
      break;
    }
    parts.push(p.content.as_str());
    parent = p.parent_id.and_then(|id| store.task(id));
  }
  parts.reverse();
  parts.join(":")
}

fn task_row(task: &Task, depth: usize, store: &LocalStore, view: &View) -> Vec<Cell> {
  let project = task
    .project_id
    .map(|id| project_label(store, id, view.project_namespace))
    .unwrap_or_default();
  let labels = task
    .labels
    .iter()
    .map(|l| format!("@{}", l))
    .collect::<Vec<_>>()
    .join(",");

  vec![
    Cell::plain(task.id.to_string()),
    Cell::new(task.priority.to_string(), Tone::Priority(task.priority)),
    Cell::plain(task.due.as_ref().map(format_due).unwrap_or_default()),
    Cell::new(project, Tone::Project),
    Cell::new(labels, Tone::Label),
    Cell::plain(task_content(task, depth, store, view)),
  ]
}

fn detail_table(task: &Task, store: &LocalStore, view: &View) -> Table {
  let mut table = Table::new(&["Field", "Value"]);
  let mut row = |key: &str, cell: Cell| table.push(vec![Cell::plain(key), cell]);

  row("ID", Cell::plain(task.id.to_string()));
  row("Content", Cell::plain(task.content.clone()));
  if !task.description.is_empty() {
    row("Description", Cell::plain(task.description.clone()));
  }
  row(
    "Project",
    Cell::new(
      task
        .project_id
        .map(|id| project_label(store, id, view.project_namespace))
        .unwrap_or_default(),
      Tone::Project,
    ),
  );
  row(
    "Labels",
    Cell::new(
      task
        .labels
        .iter()
        .map(|l| format!("@{}", l))
        .collect::<Vec<_>>()
        .join(","),
      Tone::Label,
    ),
  );
  row(
    "Priority",
    Cell::new(task.priority.to_string(), Tone::Priority(task.priority)),
  );
  row(
    "DueDate",
    Cell::plain(task.due.as_ref().map(format_due).unwrap_or_default()),
  );
  if let Some(due) = task.due.as_ref().filter(|d| d.is_recurring) {
    row("Repeats", Cell::new(due.string.clone(), Tone::Muted));
  }
  for note in store.notes_for(task.id) {
    let text = match note.posted_at.as_deref() {
      Some(posted) => format!("[{}] {}", format_timestamp(posted), note.content),
      None => note.content.clone(),
    };
    row("Note", Cell::plain(text));
  }
  table
}

fn completed_row(item: &CompletedTask, store: &LocalStore, view: &View) -> Vec<Cell> {
  vec![
    Cell::plain(item.task_id.to_string()),
    Cell::plain(format_timestamp(&item.completed_at)),
    Cell::new(
      item
        .project_id
        .map(|id| project_label(store, id, view.project_namespace))
        .unwrap_or_default(),
      Tone::Project,
    ),
    Cell::plain(item.content.clone()),
  ]
}

/// `24/03/10(Sun) 09:00` for timed dates, `24/03/10(Sun)` for whole days.
/// A phrase the server has not resolved yet is shown as entered.
pub fn format_due(due: &Due) -> String {
  if let Ok(stamp) = DateTime::parse_from_rfc3339(&due.date) {
    return stamp.with_timezone(&Local).format("%y/%m/%d(%a) %H:%M").to_string();
  }
  if let Some(stamp) = due.naive_datetime() {
    return stamp.format("%y/%m/%d(%a) %H:%M").to_string();
  }
  match due.naive_date() {
    Some(day) => format_day(day),
    None => due.string.clone(),
  }
}

fn format_day(day: NaiveDate) -> String {
  day.format("%y/%m/%d(%a)").to_string()
}

/// Server timestamps are UTC; show them in local time.
fn format_timestamp(raw: &str) -> String {
  DateTime::parse_from_rfc3339(raw)
    .map(|t| t.with_timezone(&Local).format("%y/%m/%d(%a) %H:%M").to_string())
    .unwrap_or_else(|_| raw.to_string())
}
