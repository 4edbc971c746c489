//! Task filter expressions for `list --filter`.
//!
//! ```text
//! expr  := and ('|' and)*
//! and   := unary ('&' unary)*
//! unary := '!' unary | '(' expr ')' | atom
//! atom  := p1..p4 | #Project | ##Project | @label
//!        | today | tomorrow | overdue | no date
//! ```

use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::cache::LocalStore;
use crate::todoist::types::{Priority, Task};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Priority(Priority),
  /// `#Name`, or `##Name` to include subprojects
  Project { name: String, with_subprojects: bool },
  Label(String),
  Today,
  Tomorrow,
  Overdue,
  NoDate,
  Not(Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
}

/// Positions count characters from 1.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
  #[error("filter ends unexpectedly")]
  UnexpectedEnd,

  #[error("unexpected '{found}' at position {position}")]
  Unexpected { found: char, position: usize },

  #[error("unknown filter term '{term}' at position {position}")]
  UnknownTerm { term: String, position: usize },

  #[error("missing name after '{prefix}' at position {position}")]
  MissingName { prefix: &'static str, position: usize },
}

pub fn parse(input: &str) -> Result<Expr, FilterError> {
  let mut parser = Parser {
    chars: input.chars().collect(),
    pos: 0,
  };
  let expr = parser.or()?;
  parser.skip_whitespace();
  match parser.peek() {
    None => Ok(expr),
    Some(found) => Err(parser.unexpected(found)),
  }
}

struct Parser {
  chars: Vec<char>,
  pos: usize,
}

impl Parser {
  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn skip_whitespace(&mut self) {
    while self.peek().is_some_and(char::is_whitespace) {
      self.pos += 1;
    }
  }

  /// Consume `expected` if it is the next non-blank character.
  fn eat(&mut self, expected: char) -> bool {
    self.skip_whitespace();
    if self.peek() == Some(expected) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn unexpected(&self, found: char) -> FilterError {
    FilterError::Unexpected {
      found,
      position: self.pos + 1,
    }
  }

  fn or(&mut self) -> Result<Expr, FilterError> {
    let mut left = self.and()?;
    while self.eat('|') {
      let right = self.and()?;
      left = Expr::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn and(&mut self) -> Result<Expr, FilterError> {
    let mut left = self.unary()?;
    while self.eat('&') {
      let right = self.unary()?;
      left = Expr::And(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn unary(&mut self) -> Result<Expr, FilterError> {
    if self.eat('!') {
      return Ok(Expr::Not(Box::new(self.unary()?)));
    }
    if self.eat('(') {
      let inner = self.or()?;
      if !self.eat(')') {
        return Err(match self.peek() {
          Some(found) => self.unexpected(found),
          None => FilterError::UnexpectedEnd,
        });
      }
      return Ok(inner);
    }
    self.atom()
  }

  fn atom(&mut self) -> Result<Expr, FilterError> {
    self.skip_whitespace();
    let start = self.pos;
    while self.peek().is_some_and(|c| !matches!(c, '&' | '|' | '(' | ')')) {
      self.pos += 1;
    }

    let text: String = self.chars[start..self.pos].iter().collect();
    let term = text.trim_end();
    if term.is_empty() {
      return Err(match self.peek() {
        Some(found) => self.unexpected(found),
        None => FilterError::UnexpectedEnd,
      });
    }
    classify(term, start + 1)
  }
}

fn classify(term: &str, position: usize) -> Result<Expr, FilterError> {
  let named = |prefix: &'static str| {
    let name = term[prefix.len()..].trim();
    if name.is_empty() {
      Err(FilterError::MissingName { prefix, position })
    } else {
      Ok(name.to_string())
    }
  };

  if term.starts_with("##") {
    return Ok(Expr::Project {
      name: named("##")?,
      with_subprojects: true,
    });
  }
  if term.starts_with('#') {
    return Ok(Expr::Project {
      name: named("#")?,
      with_subprojects: false,
    });
  }
  if term.starts_with('@') {
    return Ok(Expr::Label(named("@")?));
  }

  let words = term.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
  let expr = match words.as_str() {
    "today" => Expr::Today,
    "tomorrow" => Expr::Tomorrow,
    "overdue" | "od" => Expr::Overdue,
    "no date" => Expr::NoDate,
    level => level
      .strip_prefix('p')
      .and_then(|n| n.parse::<u8>().ok())
      .and_then(Priority::from_level)
      .map(Expr::Priority)
      .ok_or_else(|| FilterError::UnknownTerm {
        term: term.to_string(),
        position,
      })?,
  };
  Ok(expr)
}

impl Expr {
  pub fn matches(&self, task: &Task, store: &LocalStore, today: NaiveDate) -> bool {
    let due = || task.due.as_ref().and_then(|d| d.naive_date());

    match self {
      Expr::Priority(priority) => task.priority == *priority,
      Expr::Project {
        name,
        with_subprojects,
      } => {
        let Some(project_id) = task.project_id else {
          return false;
        };
        store
          .projects()
          .iter()
          .filter(|p| p.name.eq_ignore_ascii_case(name))
          .any(|p| {
            if *with_subprojects {
              store.project_subtree(p.id).contains(&project_id)
            } else {
              p.id == project_id
            }
          })
      }
      Expr::Label(name) => task.labels.iter().any(|l| l.eq_ignore_ascii_case(name)),
      Expr::Today => due() == Some(today),
      Expr::Tomorrow => due() == Some(today + Duration::days(1)),
      Expr::Overdue => due().is_some_and(|d| d < today),
      Expr::NoDate => task.due.is_none(),
      Expr::Not(inner) => !inner.matches(task, store, today),
      Expr::And(a, b) => a.matches(task, store, today) && b.matches(task, store, today),
      Expr::Or(a, b) => a.matches(task, store, today) || b.matches(task, store, today),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::fixtures::{project, task};
  use crate::cache::merge::{apply, Delta};
  use crate::todoist::types::{Due, Entity, Project};

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
  }

  fn due(date: &str) -> Option<Due> {
    Some(Due {
      date: date.into(),
      string: date.into(),
      is_recurring: false,
    })
  }

  fn store() -> LocalStore {
    let delta = Delta {
      new_cursor: "c1".into(),
      full_sync: true,
      updated: vec![
        Entity::Project(project(10, "Work")),
        Entity::Project(Project {
          parent_id: Some(10),
          ..project(11, "Reports")
        }),
        Entity::Project(project(12, "Home")),
      ],
      ..Delta::default()
    };
    apply(&LocalStore::new(), &delta).unwrap()
  }

  fn sample() -> Vec<Task> {
    vec![
      Task {
        project_id: Some(10),
        priority: Priority::from_level(1).unwrap(),
        due: due("2024-03-10"),
        ..task(1, "Ship release")
      },
      Task {
        project_id: Some(11),
        labels: vec!["Finance".into()],
        due: due("2024-03-08T09:00:00"),
        ..task(2, "Quarterly report")
      },
      Task {
        project_id: Some(12),
        due: due("2024-03-11"),
        ..task(3, "Water plants")
      },
      Task {
        project_id: Some(12),
        ..task(4, "Fix shelf")
      },
    ]
  }

  fn ids(filter: &str) -> Vec<u64> {
    let expr = parse(filter).unwrap();
    let store = store();
    sample()
      .iter()
      .filter(|t| expr.matches(t, &store, today()))
      .map(|t| t.id)
      .collect()
  }

  #[test]
  fn test_and_binds_tighter_than_or() {
    let expr = parse("p1 | p2 & @home").unwrap();
    assert_eq!(
      expr,
      Expr::Or(
        Box::new(Expr::Priority(Priority::from_level(1).unwrap())),
        Box::new(Expr::And(
          Box::new(Expr::Priority(Priority::from_level(2).unwrap())),
          Box::new(Expr::Label("home".into())),
        )),
      )
    );
  }

  #[test]
  fn test_project_names_may_contain_spaces() {
    assert_eq!(
      parse("#Side Project & today").unwrap(),
      Expr::And(
        Box::new(Expr::Project {
          name: "Side Project".into(),
          with_subprojects: false,
        }),
        Box::new(Expr::Today),
      )
    );
  }

  #[test]
  fn test_date_terms() {
    assert_eq!(ids("today"), vec![1]);
    assert_eq!(ids("tomorrow"), vec![3]);
    assert_eq!(ids("overdue"), vec![2]);
    assert_eq!(ids("no  date"), vec![4]);
  }

  #[test]
  fn test_project_terms() {
    assert_eq!(ids("#work"), vec![1]);
    assert_eq!(ids("##Work"), vec![1, 2]);
    assert_eq!(ids("#Nowhere"), Vec::<u64>::new());
  }

  #[test]
  fn test_negation_and_grouping() {
    assert_eq!(ids("!(#Home | p1)"), vec![2]);
    assert_eq!(ids("@finance | (#Home & !no date)"), vec![2, 3]);
  }

  #[test]
  fn test_default_priority_is_p4() {
    assert_eq!(ids("p4"), vec![2, 3, 4]);
  }

  #[test]
  fn test_unknown_term_reports_position() {
    assert_eq!(
      parse("today & p5"),
      Err(FilterError::UnknownTerm {
        term: "p5".into(),
        position: 9,
      })
    );
  }

  #[test]
  fn test_unbalanced_parentheses() {
    assert_eq!(parse("(today | p1"), Err(FilterError::UnexpectedEnd));
    assert_eq!(
      parse("today )"),
      Err(FilterError::Unexpected {
        found: ')',
        position: 7,
      })
    );
  }

  #[test]
  fn test_dangling_operator() {
    assert_eq!(parse("today &"), Err(FilterError::UnexpectedEnd));
    assert_eq!(
      parse("| today"),
      Err(FilterError::Unexpected {
        found: '|',
        position: 1,
      })
    );
  }

  #[test]
  fn test_missing_name() {
    assert_eq!(
      parse("@"),
      Err(FilterError::MissingName {
        prefix: "@",
        position: 1,
      })
    );
  }
}
