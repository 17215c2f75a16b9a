//! Position-addressed sequences with explicit null padding.
//!
//! Exported text and link arrays are addressed by absolute 1-based segment
//! position. Positions that carry no value are emitted as JSON `null`.

use serde::{Serialize, Serializer};

/// A dense sequence of optional values addressed by 1-based position.
///
/// `len()` always equals the highest filled position; every slot below it
/// that was never placed holds `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseSeq<T> {
    slots: Vec<Option<T>>,
    highest: usize,
}

impl<T> SparseSeq<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            highest: 0,
        }
    }

    /// Place `value` at the 1-based `position`, padding any gap with `None`.
    ///
    /// Placing at or below the current highest position replaces that slot.
    /// Position 0 is not addressable and is ignored.
    pub fn place(&mut self, position: usize, value: T) {
        if position == 0 {
            return;
        }
        if position > self.slots.len() {
            self.slots.resize_with(position, || None);
        }
        self.slots[position - 1] = Some(value);
        self.highest = self.highest.max(position);
    }

    /// Highest filled position, 0 when nothing was placed.
    pub fn highest_filled(&self) -> usize {
        self.highest
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True when no slot holds a value.
    pub fn is_blank(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Value at the 1-based `position`.
    pub fn get(&self, position: usize) -> Option<&T> {
        position
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    pub fn as_slice(&self) -> &[Option<T>] {
        &self.slots
    }

    pub fn into_vec(self) -> Vec<Option<T>> {
        self.slots
    }
}

impl<T> Default for SparseSeq<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Serialize for SparseSeq<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.slots.serialize(serializer)
    }
}
