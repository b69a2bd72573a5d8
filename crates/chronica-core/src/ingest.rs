//! The ingestion state machine.
//!
//! [`EventParser`] validates the nesting of an event stream and assembles
//! complete units (class definitions, groups with their elements,
//! meta-relations) before handing them to an [`ImportHandler`]. It performs
//! no storage itself.
//!
//! ```text
//! Start ─FileStart→ File ─ClassOpened→ ClassDef ─Attribute*─ClassClosed→ File
//!                   File ─GroupOpened→ Group ─ElementOpened→ Element
//!                          Element ─CoreValue|Comment|OriginalWording*─ElementClosed→ Group
//!                          Group ─GroupClosed→ File
//!                   File ─MetaRelation→ File
//!                   File ─FileEnd→ Start
//! ```
//!
//! A transition violation aborts the open file only: the parser reports it
//! through [`ImportHandler::file_aborted`] and skips events until the next
//! `FileEnd` or `FileStart`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
  class::{ClassDescriptor, ClassMapping, ColumnDescriptor},
  event::{ElementHeader, Event, FileHeader, GroupHeader, MetaRelation},
};

// ─── Assembled units ─────────────────────────────────────────────────────────

/// A named field of a group with everything the translator recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
  pub name:     String,
  pub class:    String,
  pub values:   Vec<String>,
  pub comments: Vec<String>,
  pub original: Vec<String>,
}

impl Element {
  /// The core value; repeated values are joined with `", "`.
  pub fn core(&self) -> Option<String> {
    if self.values.is_empty() {
      None
    } else {
      Some(self.values.join(", "))
    }
  }
}

/// One transcribed record, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub header:   GroupHeader,
  pub elements: Vec<Element>,
}

impl Group {
  pub fn id(&self) -> &str { &self.header.id }

  pub fn line(&self) -> i64 { self.header.line }

  /// First element carrying the given semantic class.
  pub fn element_by_class(&self, class: &str) -> Option<&Element> {
    self.elements.iter().find(|e| e.class == class)
  }

  pub fn element_by_name(&self, name: &str) -> Option<&Element> {
    self.elements.iter().find(|e| e.name == name)
  }

  /// Core value of the element with the given class.
  pub fn core(&self, class: &str) -> Option<String> {
    self.element_by_class(class).and_then(Element::core)
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Parser position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  Start,
  File,
  ClassDef,
  Group,
  Element,
  /// Discarding events after a violation until the file boundary.
  Skipping,
}

/// Malformed event nesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralError {
  pub state: State,
  pub event: &'static str,
  /// Transcription line of the group being assembled, if any.
  pub line:  Option<i64>,
}

impl fmt::Display for StructuralError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unexpected {} event in state {:?}", self.event, self.state)?;
    if let Some(line) = self.line {
      write!(f, " (line {line})")?;
    }
    Ok(())
  }
}

impl std::error::Error for StructuralError {}

// ─── Handler ─────────────────────────────────────────────────────────────────

/// Receiver of validated units. Implemented by storage backends.
///
/// Returning an error from any callback stops the whole session; per-unit
/// data problems are expected to be recorded by the handler instead.
pub trait ImportHandler {
  type Error;

  fn file_started(&mut self, header: FileHeader) -> Result<(), Self::Error>;

  fn class_defined(&mut self, descriptor: ClassDescriptor) -> Result<(), Self::Error>;

  fn group(&mut self, group: Group) -> Result<(), Self::Error>;

  fn meta_relation(&mut self, relation: MetaRelation) -> Result<(), Self::Error>;

  fn file_ended(&mut self) -> Result<(), Self::Error>;

  /// The open file was abandoned because of a nesting violation.
  fn file_aborted(&mut self, error: StructuralError) -> Result<(), Self::Error>;
}

// ─── Parser ──────────────────────────────────────────────────────────────────

/// Event-driven validator and dispatcher.
#[derive(Debug)]
pub struct EventParser {
  state:   State,
  class:   Option<(ClassMapping, Vec<ColumnDescriptor>)>,
  group:   Option<Group>,
  element: Option<Element>,
}

impl Default for EventParser {
  fn default() -> Self { Self::new() }
}

impl EventParser {
  pub fn new() -> Self {
    Self { state: State::Start, class: None, group: None, element: None }
  }

  pub fn state(&self) -> State { self.state }

  /// Feed a whole stream and close it.
  pub fn drive<H, I>(&mut self, events: I, handler: &mut H) -> Result<(), H::Error>
  where
    H: ImportHandler,
    I: IntoIterator<Item = Event>,
  {
    for event in events {
      self.feed(event, handler)?;
    }
    self.finish(handler)
  }

  /// Advance by one event.
  pub fn feed<H: ImportHandler>(
    &mut self,
    event: Event,
    handler: &mut H,
  ) -> Result<(), H::Error> {
    match (self.state, event) {
      (State::Start | State::Skipping, Event::FileStart(header)) => {
        self.state = State::File;
        handler.file_started(header)
      }
      (State::Skipping, Event::FileEnd) => {
        self.state = State::Start;
        Ok(())
      }
      (State::Skipping, _) => Ok(()),

      (State::File, Event::ClassOpened(mapping)) => {
        self.class = Some((mapping, Vec::new()));
        self.state = State::ClassDef;
        Ok(())
      }
      (State::File, Event::GroupOpened(header)) => {
        self.group = Some(Group { header, elements: Vec::new() });
        self.state = State::Group;
        Ok(())
      }
      (State::File, Event::MetaRelation(relation)) => handler.meta_relation(relation),
      (State::File, Event::FileEnd) => {
        self.state = State::Start;
        handler.file_ended()
      }

      (State::ClassDef, Event::Attribute(column)) => {
        if let Some((_, columns)) = self.class.as_mut() {
          columns.push(column);
        }
        Ok(())
      }
      (State::ClassDef, Event::ClassClosed) => {
        self.state = State::File;
        match self.class.take() {
          Some((mapping, columns)) => {
            handler.class_defined(ClassDescriptor::new(mapping, columns))
          }
          None => Ok(()),
        }
      }

      (State::Group, Event::ElementOpened(ElementHeader { name, class })) => {
        self.element = Some(Element { name, class, ..Element::default() });
        self.state = State::Element;
        Ok(())
      }
      (State::Group, Event::GroupClosed) => {
        self.state = State::File;
        match self.group.take() {
          Some(group) => handler.group(group),
          None => Ok(()),
        }
      }

      (State::Element, Event::CoreValue { text }) => {
        self.with_element(|e| e.values.push(text));
        Ok(())
      }
      (State::Element, Event::Comment { text }) => {
        self.with_element(|e| e.comments.push(text));
        Ok(())
      }
      (State::Element, Event::OriginalWording { text }) => {
        self.with_element(|e| e.original.push(text));
        Ok(())
      }
      (State::Element, Event::ElementClosed) => {
        if let (Some(element), Some(group)) = (self.element.take(), self.group.as_mut()) {
          group.elements.push(element);
        }
        self.state = State::Group;
        Ok(())
      }

      (state, event) => self.violation(state, event, handler),
    }
  }

  /// Close the stream; a file still open at this point is aborted.
  pub fn finish<H: ImportHandler>(&mut self, handler: &mut H) -> Result<(), H::Error> {
    match self.state {
      State::Start | State::Skipping => {
        self.reset(State::Start);
        Ok(())
      }
      state => {
        let error = StructuralError {
          state,
          event: "end-of-stream",
          line: self.group.as_ref().map(Group::line),
        };
        self.reset(State::Start);
        handler.file_aborted(error)
      }
    }
  }

  fn violation<H: ImportHandler>(
    &mut self,
    state: State,
    event: Event,
    handler: &mut H,
  ) -> Result<(), H::Error> {
    let error = StructuralError {
      state,
      event: event.label(),
      line: self.group.as_ref().map(Group::line),
    };
    self.reset(State::Skipping);

    if state == State::Start {
      // No file is open; nothing to abort.
      tracing::warn!(%error, "event outside of any file, skipping to next file");
      return Ok(());
    }

    tracing::warn!(%error, "aborting file");
    handler.file_aborted(error)?;

    // A file start inside an open file both aborts it and opens the next.
    if let Event::FileStart(header) = event {
      self.state = State::File;
      return handler.file_started(header);
    }
    Ok(())
  }

  fn with_element(&mut self, f: impl FnOnce(&mut Element)) {
    if let Some(element) = self.element.as_mut() {
      f(element);
    }
  }

  fn reset(&mut self, state: State) {
    self.state = state;
    self.class = None;
    self.group = None;
    self.element = None;
  }
}
