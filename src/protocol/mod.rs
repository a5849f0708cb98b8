//! Plain-text wire format for the ingestion port.
//!
//! ```text
//! <command> e:<entity> [ms:<epoch-millis>] [t:<tag>=<value>]... <value-tokens>...\n
//! ```
//!
//! Composing never performs I/O and never mutates the command.

pub mod escape;
pub mod number;

pub use escape::{needs_quoting, quote};
pub use number::format_metric_value;

use crate::domain::{Command, MessageCommand, OrderedMap, PropertyCommand};
use escape::write_token;

/// Render a command into its newline-terminated wire line.
pub fn compose(command: &Command) -> String {
    let mut writer = LineWriter::new(command.command_name());
    writer.token("e:", command.entity());
    if let Some(time_millis) = command.time_millis() {
        writer.raw("ms:", time_millis);
    }

    match command {
        Command::Series(series) => {
            writer.pairs("t:", series.tags());
            let sample = series.sample();
            writer.numeric_pair("m:", series.metric(), sample.numeric());
            if let Some(text) = sample.text() {
                writer.pair("x:", series.metric(), text);
            }
        }
        Command::MultipleInsert(insert) => {
            writer.pairs("t:", insert.tags());
            for (metric, value) in insert.numeric_values() {
                writer.numeric_pair("m:", metric, *value);
            }
            writer.pairs("x:", insert.text_values());
        }
        Command::Property(property) => write_property(&mut writer, property),
        Command::Message(message) => write_message(&mut writer, message),
    }

    writer.finish()
}

fn write_property(writer: &mut LineWriter, property: &PropertyCommand) {
    writer.token("t:", property.property_type());
    writer.pairs("k:", property.key());
    writer.pairs("v:", property.tags());
}

fn write_message(writer: &mut LineWriter, message: &MessageCommand) {
    if let Some(message_type) = message.message_type() {
        writer.pair("t:", "type", message_type);
    }
    if let Some(source) = message.source() {
        writer.pair("t:", "source", source);
    }
    if let Some(severity) = message.severity() {
        writer.pair("t:", "severity", severity.as_str());
    }
    writer.pairs("t:", message.tags());
    if !message.text().is_empty() {
        writer.token("m:", message.text());
    }
}

/// Accumulates space-separated tokens for a single command line.
#[derive(Debug)]
pub struct LineWriter {
    line: String,
}

impl LineWriter {
    pub fn new(command_name: &str) -> Self {
        let mut line = String::with_capacity(128);
        line.push_str(command_name);
        Self { line }
    }

    /// `<prefix><value>` with the value quoted when needed.
    pub fn token(&mut self, prefix: &str, value: &str) -> &mut Self {
        self.line.push(' ');
        self.line.push_str(prefix);
        write_token(&mut self.line, value);
        self
    }

    /// `<prefix><value>` for values that never need quoting.
    pub fn raw(&mut self, prefix: &str, value: impl std::fmt::Display) -> &mut Self {
        use std::fmt::Write;
        self.line.push(' ');
        self.line.push_str(prefix);
        // Writing into a String cannot fail.
        let _ = write!(self.line, "{value}");
        self
    }

    pub fn pair(&mut self, prefix: &str, key: &str, value: &str) -> &mut Self {
        self.line.push(' ');
        self.line.push_str(prefix);
        write_token(&mut self.line, key);
        self.line.push('=');
        write_token(&mut self.line, value);
        self
    }

    pub fn numeric_pair(&mut self, prefix: &str, key: &str, value: f64) -> &mut Self {
        self.line.push(' ');
        self.line.push_str(prefix);
        write_token(&mut self.line, key);
        self.line.push('=');
        self.line.push_str(&format_metric_value(value));
        self
    }

    pub fn pairs(&mut self, prefix: &str, map: &OrderedMap<String>) -> &mut Self {
        for (key, value) in map {
            self.pair(prefix, key, value);
        }
        self
    }

    pub fn finish(mut self) -> String {
        self.line.push('\n');
        self.line
    }
}
