//! Work items.

use uuid::Uuid;

/// One unit of synthetic work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    pub id: Uuid,
    /// Producer that created the item.
    pub source: usize,
    /// Opaque content.
    pub payload: String,
}

impl DataItem {
    pub fn new(source: usize, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            payload: payload.into(),
        }
    }
}

/// A random alphabetic payload of `len` characters.
pub fn random_payload(len: usize) -> String {
    std::iter::repeat_with(fastrand::alphabetic).take(len).collect()
}
