use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Position of a `T` in an [`Arena`].
///
/// Traits are implemented by hand so `T` itself needs none of them.
pub struct Key<T>(u32, PhantomData<fn() -> T>);

impl<T> Key<T> {
    pub(crate) fn new(index: u32) -> Self {
        Self(index, PhantomData)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Grow-only vector of `T`, addressed by [`Key`].
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn alloc(&mut self, value: T) -> Key<T> {
        let key = Key::new(self.items.len() as u32);
        self.items.push(value);
        key
    }

    pub fn get(&self, key: Key<T>) -> Option<&T> {
        self.items.get(key.index() as usize)
    }

    pub fn iter_enumerated(&self) -> impl Iterator<Item = (Key<T>, &T)> {
        (0..).map(Key::new).zip(&self.items)
    }

    pub fn keys(&self) -> impl Iterator<Item = Key<T>> + use<T> {
        (0..self.items.len() as u32).map(Key::new)
    }

    /// Drops every item, keeping the allocation.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T> Index<Key<T>> for Arena<T> {
    type Output = T;

    fn index(&self, key: Key<T>) -> &T {
        &self.items[key.index() as usize]
    }
}

impl<T> IndexMut<Key<T>> for Arena<T> {
    fn index_mut(&mut self, key: Key<T>) -> &mut T {
        &mut self.items[key.index() as usize]
    }
}
