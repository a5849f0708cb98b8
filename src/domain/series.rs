use super::command::{require_entity, require_non_blank};
use super::error::CommandError;
use super::ordered::{OrderedMap, Tags};
use chrono::{DateTime, Utc};

/// One observation of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    time_millis: Option<i64>,
    numeric: f64,
    text: Option<String>,
}

impl Sample {
    /// A sample without a timestamp; the server assigns its receive time.
    pub fn new(numeric: f64) -> Self {
        Self {
            time_millis: None,
            numeric,
            text: None,
        }
    }

    pub fn at(time_millis: i64, numeric: f64) -> Self {
        Self::new(numeric).with_time(time_millis)
    }

    pub fn with_time(mut self, time_millis: i64) -> Self {
        self.time_millis = Some(time_millis);
        self
    }

    /// Empty text is treated as absent.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = (!text.is_empty()).then_some(text);
        self
    }

    pub fn time_millis(&self) -> Option<i64> {
        self.time_millis
    }

    pub fn numeric(&self) -> f64 {
        self.numeric
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// A single metric sample for one entity.
///
/// Renders as `series e:<entity> [ms:<t>] [t:..]... m:<metric>=<value> [x:<metric>=<text>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesCommand {
    entity: String,
    metric: String,
    sample: Sample,
    tags: Tags,
}

impl SeriesCommand {
    pub fn new(
        entity: impl Into<String>,
        metric: impl Into<String>,
        sample: Sample,
    ) -> Result<Self, CommandError> {
        Ok(Self {
            entity: require_entity(entity.into())?,
            metric: require_non_blank(metric.into(), CommandError::MissingMetric)?,
            sample,
            tags: Tags::new(),
        })
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

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn time_millis(&self) -> Option<i64> {
        self.sample.time_millis
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }
}

/// Several metric values for one entity at one instant.
///
/// Numeric values render before text values, each group in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipleInsertCommand {
    entity: String,
    time_millis: Option<i64>,
    tags: Tags,
    numeric_values: OrderedMap<f64>,
    text_values: Tags,
}

impl MultipleInsertCommand {
    pub fn new(
        entity: impl Into<String>,
        time_millis: Option<i64>,
        tags: Tags,
        numeric_values: OrderedMap<f64>,
    ) -> Result<Self, CommandError> {
        Ok(Self {
            entity: require_entity(entity.into())?,
            time_millis,
            tags,
            numeric_values,
            text_values: Tags::new(),
        })
    }

    pub fn with_text_values(mut self, text_values: Tags) -> Self {
        self.text_values = text_values;
        self
    }

    pub fn with_numeric(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.numeric_values.insert(metric, value);
        self
    }

    pub fn with_text(mut self, metric: impl Into<String>, value: impl Into<String>) -> Self {
        self.text_values.insert(metric, value.into());
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name, value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.time_millis = Some(timestamp.timestamp_millis());
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn time_millis(&self) -> Option<i64> {
        self.time_millis
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn numeric_values(&self) -> &OrderedMap<f64> {
        &self.numeric_values
    }

    pub fn text_values(&self) -> &Tags {
        &self.text_values
    }
}
