use super::command::{require_entity, require_non_blank};
use super::error::CommandError;
use super::ordered::Tags;

/// A property record: a typed set of tags attached to an entity and
/// identified by an optional key.
///
/// Renders as `property e:<entity> [ms:<t>] t:<type> [k:<k>=<v>]... [v:<k>=<v>]...`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyCommand {
    entity: String,
    property_type: String,
    time_millis: Option<i64>,
    key: Tags,
    tags: Tags,
}

impl PropertyCommand {
    pub fn new(
        entity: impl Into<String>,
        property_type: impl Into<String>,
    ) -> Result<Self, CommandError> {
        Ok(Self {
            entity: require_entity(entity.into())?,
            property_type: require_non_blank(
                property_type.into(),
                CommandError::MissingPropertyType,
            )?,
            time_millis: None,
            key: Tags::new(),
            tags: Tags::new(),
        })
    }

    pub fn with_time(mut self, time_millis: i64) -> Self {
        self.time_millis = Some(time_millis);
        self
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.key.insert(name, value.into());
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name, value.into());
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn property_type(&self) -> &str {
        &self.property_type
    }

    pub fn time_millis(&self) -> Option<i64> {
        self.time_millis
    }

    pub fn key(&self) -> &Tags {
        &self.key
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }
}
