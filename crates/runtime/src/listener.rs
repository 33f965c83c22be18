//! Write and print listeners.
//!
//! The interpreter emits a [`WriteEvent`] to every registered listener on
//! each mutation of an entity root; embedders use these to journal changes
//! or drive external mirrors. `print` output routes through
//! [`PrintListener`] so embedders can capture it.

use crate::entity::EntityId;

/// What changed on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEventKind {
    /// The entity's root tree was replaced.
    RootReplaced,
    /// A value was assigned to a labeled node.
    AssignToLabel { label: String },
    /// A value was accumulated onto a labeled node.
    AccumToLabel { label: String },
    /// The entity was created.
    Created,
    /// The entity was cloned from another.
    Cloned { from: EntityId },
    /// The entity was moved to a new container.
    Moved,
    /// The entity was destroyed.
    Destroyed,
    /// The entity's random seed was set.
    SeedSet,
}

/// A mutation event carrying the entity and a description of the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    pub entity: EntityId,
    pub kind: WriteEventKind,
}

/// Receives a write event for every entity mutation.
pub trait WriteListener: Send {
    fn on_write(&mut self, event: &WriteEvent);
}

/// Receives `print` output.
pub trait PrintListener: Send {
    fn print(&mut self, text: &str);
}

/// A listener that accumulates events in memory, used by tests and by
/// change-capturing callers.
#[derive(Default)]
pub struct RecordingWriteListener {
    pub events: Vec<WriteEvent>,
}

impl WriteListener for RecordingWriteListener {
    fn on_write(&mut self, event: &WriteEvent) {
        self.events.push(event.clone());
    }
}
