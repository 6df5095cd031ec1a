use std::collections::HashMap;

use crate::error::{EntryKind, Error, Result};

/// Named catalogue entry
pub trait Entry {
    const KIND: EntryKind;

    fn name(&self) -> &str;
}

/// Name-indexed collection that keeps catalogue order
#[derive(Debug, Clone)]
pub struct Registry<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Entry> Registry<T> {
    pub fn new(items: Vec<T>) -> Result<Self> {
        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if index.insert(item.name().to_string(), position).is_some() {
                return Err(Error::InvalidCatalog(format!(
                    "duplicate {} name: {}",
                    T::KIND,
                    item.name()
                )));
            }
        }
        Ok(Self { items, index })
    }

    pub fn find(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.items[i])
    }

    pub fn get(&self, name: &str) -> Result<&T> {
        self.find(name).ok_or_else(|| Error::unknown(T::KIND, name))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut T> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.items[i]),
            None => Err(Error::unknown(T::KIND, name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Names in catalogue order
    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<'a, T: Entry> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
