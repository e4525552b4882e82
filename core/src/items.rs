//! Ordered child lists and MIME boundary tokens.
//!
//! Both `Batch` and `ChangeSet` are an `ItemList` one level apart: an ordered
//! sequence of children plus the boundary that delimits them on the wire.
//! Position in the list is the only key that links a serialized child to its
//! decoded response, so items are never reordered or removed.

use uuid::Uuid;

/// Fixed-length random token: 12 lowercase hex characters.
///
/// There is no collision detection; the token only has to be unique within
/// one outgoing payload.
pub fn generate_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..12].to_string()
}

/// A MIME boundary of the form `<prefix>_<8hex>-<4hex>-<4hex>`.
pub fn generate_boundary(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}-{}-{}", &hex[..8], &hex[8..12], &hex[12..16])
}

/// An ordered list of children sharing one boundary.
#[derive(Debug)]
pub struct ItemList<T> {
    name: &'static str,
    boundary: String,
    items: Vec<T>,
}

impl<T> ItemList<T> {
    /// Create an empty list.
    ///
    /// `name` identifies the list in logs and is mandatory; `prefix` labels the
    /// boundary (`batch`, `changeset`) and may be empty.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn new(name: &'static str, prefix: &str) -> Self {
        assert!(!name.is_empty(), "item list requires a name");
        Self {
            name,
            boundary: generate_boundary(prefix),
            items: Vec::new(),
        }
    }

    /// Append `item` and return a handle to it.
    pub fn add(&mut self, item: T) -> &mut T {
        self.items.push(item);
        tracing::trace!(list = self.name, len = self.items.len(), "item added");
        let last = self.items.len() - 1;
        &mut self.items[last]
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}
