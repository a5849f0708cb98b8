//! Domain layer for tsd-client.
//!
//! Contains the command model shared across all modules:
//! - `Command`: closed set of insertable facts (series, property, message)
//! - `OrderedMap` / `Tags`: insertion-ordered maps that drive wire token order
//! - `CommandError`: construction-time validation failures

pub mod command;
pub mod error;
pub mod message;
pub mod ordered;
pub mod property;
pub mod series;
pub mod severity;

pub use command::{Command, MESSAGE_COMMAND, PROPERTY_COMMAND, SERIES_COMMAND};
pub use error::CommandError;
pub use message::MessageCommand;
pub use ordered::{OrderedMap, Tags};
pub use property::PropertyCommand;
pub use series::{MultipleInsertCommand, Sample, SeriesCommand};
pub use severity::Severity;
