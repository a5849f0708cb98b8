use thiserror::Error;

/// Invalid-argument failures raised while building a command.
///
/// These never reach the wire: a command that fails validation is never
/// constructed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid argument: entity name is empty")]
    MissingEntity,

    #[error("Invalid argument: property type is empty")]
    MissingPropertyType,

    #[error("Invalid argument: metric name is empty")]
    MissingMetric,
}
