//! Bounded ranking buffer.
//!
//! Keeps the `k` highest-ranked entries seen so far, ordered from highest to
//! lowest. Insertion is an O(k) shift-scan from the low end. Among entries
//! that compare equal, the one inserted first ranks higher, and a full buffer
//! only admits an entry that strictly outranks its current minimum.

use std::cmp::Ordering;
use std::ops::Index;

pub struct TopKSelector<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    entries: Vec<T>,
    capacity: usize,
    cmp: F,
}

impl<T, F> TopKSelector<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// `cmp(a, b) == Greater` means `a` ranks above `b`.
    pub fn new(capacity: usize, cmp: F) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            cmp,
        }
    }

    /// Offers `entry`; returns whether it was retained.
    pub fn add(&mut self, entry: T) -> bool {
        let mut pos = self.entries.len();
        while pos > 0 && (self.cmp)(&entry, &self.entries[pos - 1]) == Ordering::Greater {
            pos -= 1;
        }
        if self.entries.len() == self.capacity {
            if pos == self.capacity {
                return false;
            }
            self.entries.pop();
        }
        self.entries.insert(pos, entry);
        true
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from highest to lowest rank.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entries
    }
}

impl<T, F> Index<usize> for TopKSelector<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    type Output = T;

    fn index(&self, idx: usize) -> &T {
        assert!(
            idx < self.entries.len(),
            "index {} out of range for {} ranked entries",
            idx,
            self.entries.len()
        );
        &self.entries[idx]
    }
}
