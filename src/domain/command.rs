use super::error::CommandError;
use super::message::MessageCommand;
use super::property::PropertyCommand;
use super::series::{MultipleInsertCommand, SeriesCommand};
use crate::protocol;

pub const SERIES_COMMAND: &str = "series";
pub const PROPERTY_COMMAND: &str = "property";
pub const MESSAGE_COMMAND: &str = "message";

/// One fact to ingest through the plain-text port.
///
/// Commands are immutable once built; `compose()` is pure and yields the
/// same line for the same command every time.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Series(SeriesCommand),
    MultipleInsert(MultipleInsertCommand),
    Property(PropertyCommand),
    Message(MessageCommand),
}

impl Command {
    pub fn command_name(&self) -> &'static str {
        match self {
            Command::Series(_) | Command::MultipleInsert(_) => SERIES_COMMAND,
            Command::Property(_) => PROPERTY_COMMAND,
            Command::Message(_) => MESSAGE_COMMAND,
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            Command::Series(c) => c.entity(),
            Command::MultipleInsert(c) => c.entity(),
            Command::Property(c) => c.entity(),
            Command::Message(c) => c.entity(),
        }
    }

    pub fn time_millis(&self) -> Option<i64> {
        match self {
            Command::Series(c) => c.time_millis(),
            Command::MultipleInsert(c) => c.time_millis(),
            Command::Property(c) => c.time_millis(),
            Command::Message(c) => c.time_millis(),
        }
    }

    /// Render the newline-terminated wire line.
    pub fn compose(&self) -> String {
        protocol::compose(self)
    }
}

impl From<SeriesCommand> for Command {
    fn from(command: SeriesCommand) -> Self {
        Command::Series(command)
    }
}

impl From<MultipleInsertCommand> for Command {
    fn from(command: MultipleInsertCommand) -> Self {
        Command::MultipleInsert(command)
    }
}

impl From<PropertyCommand> for Command {
    fn from(command: PropertyCommand) -> Self {
        Command::Property(command)
    }
}

impl From<MessageCommand> for Command {
    fn from(command: MessageCommand) -> Self {
        Command::Message(command)
    }
}

pub(crate) fn require_entity(entity: String) -> Result<String, CommandError> {
    require_non_blank(entity, CommandError::MissingEntity)
}

pub(crate) fn require_non_blank(value: String, error: CommandError) -> Result<String, CommandError> {
    if value.trim().is_empty() {
        Err(error)
    } else {
        Ok(value)
    }
}
