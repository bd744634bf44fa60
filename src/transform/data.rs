//! DataMap: a type-keyed bag of configuration and derived facts.
//!
//! Transforms read their configuration from the input map and write the
//! facts they derive into an output map. Each Rust type is its own key,
//! so a transform asks for `BindingRemapperConfig` rather than a string
//! name, and a lookup can never yield a value of the wrong type.

use std::any::{type_name, Any, TypeId};

use crate::diagnostic::{Diagnostic, System};

struct Entry {
    key: TypeId,
    name: &'static str,
    value: Box<dyn Any>,
}

/// Insertion-ordered, at most one value per type.
#[derive(Default)]
pub struct DataMap {
    entries: Vec<Entry>,
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, replacing any existing value of the same type in place.
    pub fn add<T: Any>(&mut self, value: T) {
        let key = TypeId::of::<T>();
        let value: Box<dyn Any> = Box::new(value);
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(Entry {
                key,
                name: type_name::<T>(),
                value,
            }),
        }
    }

    /// Builder-style `add`.
    pub fn with<T: Any>(mut self, value: T) -> Self {
        self.add(value);
        self
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        let key = TypeId::of::<T>();
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.value.downcast_ref())
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Remove and return the value of type `T`.
    pub fn take<T: Any>(&mut self) -> Option<T> {
        let key = TypeId::of::<T>();
        let pos = self.entries.iter().position(|e| e.key == key)?;
        let entry = self.entries.remove(pos);
        entry.value.downcast().ok().map(|b| *b)
    }

    /// The value of type `T`, or a diagnostic naming what `transform` is missing.
    pub fn require<T: Any>(&self, transform: &str) -> Result<&T, Diagnostic> {
        self.get::<T>().ok_or_else(|| {
            Diagnostic::error(
                System::Transform,
                format!("missing {} for {}", short_name(type_name::<T>()), transform),
            )
        })
    }

    /// Move every entry of `other` into this map; `other` wins on conflicts.
    pub fn merge(&mut self, other: DataMap) {
        for entry in other.entries {
            match self.entries.iter_mut().find(|e| e.key == entry.key) {
                Some(existing) => existing.value = entry.value,
                None => self.entries.push(entry),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short type names of the entries, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| short_name(e.name))
    }
}

impl std::fmt::Debug for DataMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// `glint::transform::binding_remapper::BindingRemapperConfig` → `BindingRemapperConfig`.
fn short_name(name: &'static str) -> &'static str {
    name.rsplit("::").next().unwrap_or(name)
}
