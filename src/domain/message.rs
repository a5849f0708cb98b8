use super::command::require_entity;
use super::error::CommandError;
use super::ordered::Tags;
use super::severity::Severity;

/// A free-text event attached to an entity.
///
/// `type`, `source` and `severity` travel as reserved tags ahead of any
/// user tags; the text itself is the `m:` token.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageCommand {
    entity: String,
    time_millis: Option<i64>,
    message_type: Option<String>,
    source: Option<String>,
    severity: Option<Severity>,
    tags: Tags,
    text: String,
}

impl MessageCommand {
    pub fn new(entity: impl Into<String>, text: impl Into<String>) -> Result<Self, CommandError> {
        Ok(Self {
            entity: require_entity(entity.into())?,
            time_millis: None,
            message_type: None,
            source: None,
            severity: None,
            tags: Tags::new(),
            text: text.into(),
        })
    }

    pub fn with_time(mut self, time_millis: i64) -> Self {
        self.time_millis = Some(time_millis);
        self
    }

    pub fn with_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name, value.into());
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn time_millis(&self) -> Option<i64> {
        self.time_millis
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
