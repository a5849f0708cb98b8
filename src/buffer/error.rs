use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: usize },

    #[error("Buffer is full (capacity {capacity}), newest command rejected")]
    BufferFull { capacity: usize },
}
