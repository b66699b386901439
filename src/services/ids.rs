use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of fresh bar identifiers.
pub trait IdGenerator {
    fn next_id(&self) -> String;
}

impl<T: IdGenerator + ?Sized> IdGenerator for &T {
    fn next_id(&self) -> String {
        (**self).next_id()
    }
}

/// Random v4 UUIDs, used by the API and the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic `prefix-1`, `prefix-2`, ... ids.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
