//! The event stream produced by the upstream notation translator.
//!
//! One transcription file becomes one `FileStart … FileEnd` run of events.
//! Nesting is validated by [`crate::ingest::EventParser`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::class::{ClassDescriptor, ClassMapping, ColumnDescriptor};

/// Identification of the transcription being imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
  pub path:          String,
  /// Short display name; defaults to the last path component.
  #[serde(default)]
  pub name:          Option<String>,
  /// Identifier of the notation structure the file was translated with.
  pub structure:     String,
  pub translator:    String,
  #[serde(default)]
  pub translated_at: Option<DateTime<Utc>>,
}

impl FileHeader {
  pub fn display_name(&self) -> &str {
    self.name.as_deref().unwrap_or_else(|| {
      self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path)
    })
  }
}

/// Opening of one transcribed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHeader {
  pub id:            String,
  /// Notation group name, e.g. `n` or `casamento`.
  pub name:          String,
  /// Category declared in the transcription, used when the group name has
  /// no known class.
  #[serde(default)]
  pub category_hint: Option<String>,
  #[serde(default)]
  pub order:         i64,
  #[serde(default)]
  pub level:         i64,
  #[serde(default)]
  pub line:          i64,
}

/// Opening of one named field inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHeader {
  pub name:  String,
  /// Semantic class of the element; matched against column classes.
  pub class: String,
}

/// Kind of a meta-relation between an occurrence and something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaRelationKind {
  /// Two occurrences denote the same real-world subject.
  SameAs,
  /// Bind the origin occurrence to an existing real entity.
  AttachToRealEntity,
}

/// An identity statement embedded in the transcription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRelation {
  pub id:          String,
  pub origin:      String,
  pub destination: String,
  pub kind:        MetaRelationKind,
  #[serde(default)]
  pub value:       Option<String>,
  #[serde(default)]
  pub extra:       Option<String>,
  #[serde(default)]
  pub line:        i64,
}

/// One event of the translated stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
  FileStart(FileHeader),
  ClassOpened(ClassMapping),
  Attribute(ColumnDescriptor),
  ClassClosed,
  GroupOpened(GroupHeader),
  ElementOpened(ElementHeader),
  CoreValue { text: String },
  Comment { text: String },
  OriginalWording { text: String },
  ElementClosed,
  GroupClosed,
  MetaRelation(MetaRelation),
  FileEnd,
}

impl Event {
  /// Expand a complete class definition into its open/attribute/close run.
  pub fn class_defined(descriptor: ClassDescriptor) -> Vec<Event> {
    let mut events = Vec::with_capacity(descriptor.columns.len() + 2);
    events.push(Event::ClassOpened(descriptor.mapping));
    events.extend(descriptor.columns.into_iter().map(Event::Attribute));
    events.push(Event::ClassClosed);
    events
  }

  /// Short name used in structural error messages.
  pub fn label(&self) -> &'static str {
    match self {
      Self::FileStart(_) => "file-start",
      Self::ClassOpened(_) => "class-opened",
      Self::Attribute(_) => "attribute",
      Self::ClassClosed => "class-closed",
      Self::GroupOpened(_) => "group-opened",
      Self::ElementOpened(_) => "element-opened",
      Self::CoreValue { .. } => "core-value",
      Self::Comment { .. } => "comment",
      Self::OriginalWording { .. } => "original-wording",
      Self::ElementClosed => "element-closed",
      Self::GroupClosed => "group-closed",
      Self::MetaRelation(_) => "meta-relation",
      Self::FileEnd => "file-end",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn events_are_tagged_in_snake_case() {
    let json = r#"{"event":"core_value","text":"Maria"}"#;
    let event: Event = serde_json::from_str(json).unwrap();
    assert_eq!(event, Event::CoreValue { text: "Maria".into() });

    let json = r#"{"event":"group_opened","id":"p1","name":"n","line":12}"#;
    let Event::GroupOpened(header) = serde_json::from_str(json).unwrap() else {
      panic!("expected group_opened");
    };
    assert_eq!(header.line, 12);
    assert!(header.category_hint.is_none());
  }

  #[test]
  fn display_name_defaults_to_file_name() {
    let header = FileHeader {
      path:          "sources/baptisms/b1688.cli".into(),
      name:          None,
      structure:     "gacto2.str".into(),
      translator:    "kleio".into(),
      translated_at: None,
    };
    assert_eq!(header.display_name(), "b1688.cli");
  }
}
