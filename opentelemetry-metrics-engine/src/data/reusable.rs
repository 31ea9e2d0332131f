use std::{ops::Deref, slice};

/// A growable array whose elements outlive a logical reset.
///
/// `ReusableArray` keeps every element it ever created in a backing vector and
/// tracks how many of them are live. [`reset`](ReusableArray::reset) only sets
/// the live count back to zero, so the next pass hands out the previous pass's
/// elements again, including whatever allocations they own.
#[derive(Debug, Clone)]
pub struct ReusableArray<T> {
    items: Vec<T>,
    count: usize,
}

impl<T> Default for ReusableArray<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
        }
    }
}

impl<T> ReusableArray<T> {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` when there are no live elements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of elements retained for reuse, live or not.
    pub fn retained(&self) -> usize {
        self.items.len()
    }

    /// The live elements.
    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.count]
    }

    /// Iterates over the live elements.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Marks every element as not live, keeping them for reuse.
    pub(crate) fn reset(&mut self) {
        self.count = 0;
    }

    /// Extends the live range by one, reusing a retained element when one is
    /// available and creating one with `create` otherwise.
    pub(crate) fn reallocate_with(&mut self, create: impl FnOnce() -> T) -> &mut T {
        if self.count == self.items.len() {
            self.items.push(create());
        }
        self.count += 1;
        &mut self.items[self.count - 1]
    }
}

impl<T: Default> ReusableArray<T> {
    /// [`reallocate_with`](ReusableArray::reallocate_with) using `T::default`.
    pub(crate) fn reallocate(&mut self) -> &mut T {
        self.reallocate_with(T::default)
    }
}

impl<T> Deref for ReusableArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T> IntoIterator for &'a ReusableArray<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PartialEq> PartialEq for ReusableArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}
