//! Lazily loaded child collections.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A child collection that may not have been fetched from the store.
///
/// `Loaded(Vec::new())` means the collection was fetched and is empty, which
/// is distinct from [`Children::NotLoaded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children<T> {
    /// The collection was not requested from the store.
    NotLoaded,
    /// The collection was fetched; it may be empty.
    Loaded(Vec<T>),
}

impl<T> Children<T> {
    /// Returns `true` when the collection has been fetched.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Returns `true` when the collection has not been fetched.
    #[must_use]
    pub const fn is_not_loaded(&self) -> bool {
        !self.is_loaded()
    }

    /// Returns the loaded items, or `None` when not fetched.
    #[must_use]
    pub fn loaded(&self) -> Option<&[T]> {
        match self {
            Self::NotLoaded => None,
            Self::Loaded(items) => Some(items),
        }
    }

    /// Returns the loaded items, treating an unfetched collection as empty.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        self.loaded().unwrap_or_default()
    }
}

impl<T> Default for Children<T> {
    fn default() -> Self {
        Self::NotLoaded
    }
}

impl<T> From<Vec<T>> for Children<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Loaded(items)
    }
}

impl<T: Serialize> Serialize for Children<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::NotLoaded => serializer.serialize_none(),
            Self::Loaded(items) => serializer.collect_seq(items),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Children<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Option::<Vec<T>>::deserialize(deserializer)?;
        Ok(items.map_or(Self::NotLoaded, Self::Loaded))
    }
}
