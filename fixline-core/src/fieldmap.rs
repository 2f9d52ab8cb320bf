/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Insertion-ordered tag → value storage.
//!
//! A [`FieldMap`] holds at most one [`Slot`] per tag. A slot is either a raw
//! scalar value or the ordered entries of a repeating group keyed by the
//! group's count tag. Group counts are never stored; they are derived from
//! the entry list when encoding.

use crate::error::FieldMapError;
use crate::field::{FieldConvert, FixField};
use crate::group::Group;
use bytes::Bytes;
use smallvec::SmallVec;

/// Content of one tag within a [`FieldMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Raw scalar value.
    Value(Bytes),
    /// Repeating group entries, in wire order.
    Groups(Vec<Group>),
}

/// Ordered map of FIX fields.
///
/// Lookups are linear; typical header and body maps hold a handful of tags,
/// for which a scan beats hashing. Equality compares tag by tag and ignores
/// insertion order; group entry order still matters.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: SmallVec<[(u32, Slot); 16]>,
}

impl FieldMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&self, tag: u32) -> Option<usize> {
        self.entries.iter().position(|(t, _)| *t == tag)
    }

    /// Sets a scalar field.
    ///
    /// Overwrites in place if the tag is present, else appends.
    pub fn set_field(&mut self, tag: u32, value: impl Into<Bytes>) {
        let slot = Slot::Value(value.into());
        match self.index_of(tag) {
            Some(i) => self.entries[i].1 = slot,
            None => self.entries.push((tag, slot)),
        }
    }

    /// Sets a field from a typed value.
    pub fn set_as<T: FieldConvert>(&mut self, tag: u32, value: &T) {
        self.set_field(tag, value.to_field());
    }

    /// Sets a field through its descriptor.
    pub fn set<F: FixField>(&mut self, value: F::Value) {
        self.set_as(F::TAG, &value);
    }

    /// Returns the raw value of a scalar field.
    ///
    /// # Errors
    /// Returns `FieldMapError::FieldNotFound` if the tag is absent or holds a group.
    pub fn get_field(&self, tag: u32) -> Result<&Bytes, FieldMapError> {
        match self.slot(tag) {
            Some(Slot::Value(v)) => Ok(v),
            _ => Err(FieldMapError::FieldNotFound { tag }),
        }
    }

    /// Returns a scalar field as a string slice.
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue` for non UTF-8 content.
    pub fn get_str(&self, tag: u32) -> Result<&str, FieldMapError> {
        let raw = self.get_field(tag)?;
        std::str::from_utf8(raw).map_err(|e| FieldMapError::InvalidValue {
            tag,
            reason: e.to_string(),
        })
    }

    /// Returns a field converted to `T`.
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue`.
    pub fn get_as<T: FieldConvert>(&self, tag: u32) -> Result<T, FieldMapError> {
        T::from_field(tag, self.get_field(tag)?)
    }

    /// Returns a field through its descriptor.
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue`.
    pub fn get<F: FixField>(&self) -> Result<F::Value, FieldMapError> {
        self.get_as(F::TAG)
    }

    /// Returns true if the tag holds a value or group.
    #[must_use]
    pub fn is_set_field(&self, tag: u32) -> bool {
        self.index_of(tag).is_some()
    }

    /// Returns the slot for a tag.
    #[must_use]
    pub fn slot(&self, tag: u32) -> Option<&Slot> {
        self.entries.iter().find(|(t, _)| *t == tag).map(|(_, s)| s)
    }

    /// Removes a tag, returning its slot.
    pub fn remove_field(&mut self, tag: u32) -> Option<Slot> {
        self.index_of(tag).map(|i| self.entries.remove(i).1)
    }

    /// Appends a group entry under its count tag.
    ///
    /// A scalar previously stored under the count tag is replaced.
    ///
    /// # Errors
    /// Returns `FieldMapError::MissingDelimiter` if the entry lacks its delimiter.
    pub fn add_group(&mut self, entry: Group) -> Result<(), FieldMapError> {
        if !entry.has_delimiter() {
            return Err(FieldMapError::MissingDelimiter {
                count_tag: entry.count_tag(),
                delimiter: entry.spec().delimiter(),
            });
        }
        let count_tag = entry.count_tag();
        match self.index_of(count_tag) {
            Some(i) => match &mut self.entries[i].1 {
                Slot::Groups(list) => list.push(entry),
                slot => *slot = Slot::Groups(vec![entry]),
            },
            None => self.entries.push((count_tag, Slot::Groups(vec![entry]))),
        }
        Ok(())
    }

    /// Returns all entries of a group.
    #[must_use]
    pub fn groups(&self, count_tag: u32) -> &[Group] {
        match self.slot(count_tag) {
            Some(Slot::Groups(list)) => list,
            _ => &[],
        }
    }

    /// Returns the number of entries of a group.
    #[must_use]
    pub fn group_count(&self, count_tag: u32) -> usize {
        self.groups(count_tag).len()
    }

    /// Returns one group entry.
    ///
    /// # Errors
    /// Returns `FieldMapError::GroupNotFound` if there is no such entry.
    pub fn group(&self, count_tag: u32, index: usize) -> Result<&Group, FieldMapError> {
        self.groups(count_tag)
            .get(index)
            .ok_or(FieldMapError::GroupNotFound { count_tag, index })
    }

    /// Returns one group entry mutably.
    ///
    /// # Errors
    /// Returns `FieldMapError::GroupNotFound` if there is no such entry.
    pub fn group_mut(&mut self, count_tag: u32, index: usize) -> Result<&mut Group, FieldMapError> {
        let found = self.entries.iter_mut().find(|(t, _)| *t == count_tag);
        match found {
            Some((_, Slot::Groups(list))) => list
                .get_mut(index)
                .ok_or(FieldMapError::GroupNotFound { count_tag, index }),
            _ => Err(FieldMapError::GroupNotFound { count_tag, index }),
        }
    }

    /// Iterates slots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Slot)> {
        self.entries.iter().map(|(t, s)| (*t, s))
    }

    /// Returns the number of distinct tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every field.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl PartialEq for FieldMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(tag, slot)| other.slot(*tag) == Some(slot))
    }
}
