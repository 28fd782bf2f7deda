//! Per-session key/value storage for application state.
//!
//! Values are stored as `Arc<dyn Any + Send + Sync>` under string keys and
//! read back with typed accessors. The store belongs to one session and is
//! emptied when that session closes, dropping every value it held.

use std::{any::Any, sync::Arc};

use dashmap::DashMap;

/// Concurrent map of session-scoped values.
///
/// # Examples
///
/// ```
/// use playwire::attachment::Attachment;
///
/// let attachment = Attachment::default();
/// attachment.insert("user_id", 42_u64);
/// assert_eq!(attachment.get::<u64>("user_id").as_deref(), Some(&42));
/// assert!(attachment.get::<String>("user_id").is_none());
/// ```
#[derive(Default)]
pub struct Attachment {
    values: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Attachment {
    /// Store `value` under `key`, replacing any previous value.
    pub fn insert<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Fetch the value under `key` if it exists and has type `T`.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let value = self.values.get(key).map(|entry| Arc::clone(entry.value()))?;
        value.downcast::<T>().ok()
    }

    /// Fetch a copy of the value under `key`, or `T::default()`.
    #[must_use]
    pub fn get_or_default<T>(&self, key: &str) -> T
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        self.get::<T>(key).map(|v| T::clone(&v)).unwrap_or_default()
    }

    /// Remove and return the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.values.remove(key).map(|(_, value)| value)
    }

    /// Returns `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool { self.values.contains_key(key) }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize { self.values.len() }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Drop every stored value.
    pub fn clear(&self) {
        self.values.clear();
        self.values.shrink_to_fit();
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("len", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Attachment;

    #[test]
    fn typed_access_checks_the_stored_type() {
        let attachment = Attachment::default();
        attachment.insert("name", String::from("x"));
        assert_eq!(attachment.get::<String>("name").as_deref().map(String::as_str), Some("x"));
        assert!(attachment.get::<u32>("name").is_none());
        assert_eq!(attachment.get_or_default::<u32>("missing"), 0);
    }

    #[test]
    fn clear_drops_held_values() {
        let attachment = Attachment::default();
        let shared = Arc::new(5_u8);
        attachment.insert("shared", Arc::clone(&shared));
        assert_eq!(Arc::strong_count(&shared), 2);

        attachment.clear();
        assert!(attachment.is_empty());
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn remove_returns_the_value() {
        let attachment = Attachment::default();
        attachment.insert("k", 1_i32);
        assert!(attachment.contains("k"));
        let removed = attachment.remove("k").expect("present");
        assert_eq!(removed.downcast_ref::<i32>(), Some(&1));
        assert!(!attachment.contains("k"));
    }
}
