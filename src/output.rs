//! Table rendering: aligned columns or CSV, with optional color.

use crossterm::style::{style, Color, Stylize};

use crate::todoist::types::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
  /// Space-aligned columns
  #[default]
  Columns,
  /// RFC 4180
  Csv,
}

/// How listings are rendered, from the global flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct View {
  pub format: Format,
  pub header: bool,
  pub color: bool,
  /// Indent subtasks under their parents
  pub indent: bool,
  /// Prefix tasks with their parents' content, `Parent:Child`
  pub namespace: bool,
  /// Show projects as `#Parent:Child`
  pub project_namespace: bool,
}

/// Styling hint for a cell; ignored unless color is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
  Plain,
  Priority(Priority),
  Project,
  Label,
  Muted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
  text: String,
  tone: Tone,
}

impl Cell {
  pub fn new(text: impl Into<String>, tone: Tone) -> Self {
    Self {
      text: text.into(),
      tone,
    }
  }

  pub fn plain(text: impl Into<String>) -> Self {
    Self::new(text, Tone::Plain)
  }
}

pub struct Table {
  header: Vec<&'static str>,
  rows: Vec<Vec<Cell>>,
}

impl Table {
  pub fn new(header: &[&'static str]) -> Self {
    Self {
      header: header.to_vec(),
      rows: Vec::new(),
    }
  }

  pub fn push(&mut self, row: Vec<Cell>) {
    self.rows.push(row);
  }

  /// Render every row, each terminated by a newline.
  pub fn render(&self, view: &View) -> String {
    let header: Vec<Cell> = self.header.iter().map(|h| Cell::plain(*h)).collect();
    let rows = view
      .header
      .then_some(&header)
      .into_iter()
      .chain(self.rows.iter());

    match view.format {
      Format::Csv => rows.map(|row| csv_line(row) + "\n").collect(),
      Format::Columns => {
        let rows: Vec<&Vec<Cell>> = rows.collect();
        let widths = column_widths(&rows);
        rows
          .iter()
          .map(|row| aligned_line(row, &widths, view.color) + "\n")
          .collect()
      }
    }
  }
}

fn column_widths(rows: &[&Vec<Cell>]) -> Vec<usize> {
  let mut widths = Vec::new();
  for row in rows {
    for (i, cell) in row.iter().enumerate() {
      let width = cell.text.chars().count();
      match widths.get_mut(i) {
        Some(w) if *w < width => *w = width,
        Some(_) => {}
        None => widths.push(width),
      }
    }
  }
  widths
}

fn aligned_line(row: &[Cell], widths: &[usize], color: bool) -> String {
  let last = row.len().saturating_sub(1);
  let cells: Vec<String> = row
    .iter()
    .enumerate()
    .map(|(i, cell)| {
      // Pad before styling so escape codes do not count toward the width.
      let padded = if i == last {
        cell.text.clone()
      } else {
        format!("{:<width$}", cell.text, width = widths[i])
      };
      if color {
        paint(padded, cell.tone)
      } else {
        padded
      }
    })
    .collect();
  cells.join(" ")
}

fn paint(text: String, tone: Tone) -> String {
  match tone {
    Tone::Plain => text,
    Tone::Priority(p) => match priority_color(p) {
      Some(color) => style(text).with(color).to_string(),
      None => text,
    },
    Tone::Project => text.magenta().to_string(),
    Tone::Label => text.cyan().to_string(),
    Tone::Muted => text.dark_grey().to_string(),
  }
}

/// Display color for a priority; the default priority stays uncolored.
pub fn priority_color(priority: Priority) -> Option<Color> {
  match priority.level() {
    1 => Some(Color::Red),
    2 => Some(Color::Yellow),
    3 => Some(Color::Blue),
    _ => None,
  }
}

fn csv_line(row: &[Cell]) -> String {
  row
    .iter()
    .map(|cell| csv_field(&cell.text))
    .collect::<Vec<_>>()
    .join(",")
}

fn csv_field(text: &str) -> String {
  if text.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", text.replace('"', "\"\""))
  } else {
    text.to_string()
  }
}
