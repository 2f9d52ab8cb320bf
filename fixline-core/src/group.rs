/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Repeating groups.
//!
//! A [`GroupSpec`] is the schema of one repeating group: the count tag
//! (`NoXXX`), the delimiter tag that starts every entry, the ordered member
//! tags and the specs of any groups nested inside an entry. A [`Group`] is a
//! single entry of such a group.

use crate::error::FieldMapError;
use crate::field::{FieldConvert, FixField};
use crate::fieldmap::{FieldMap, Slot};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Schema of a repeating group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    count_tag: u32,
    delimiter: u32,
    members: Vec<u32>,
    nested: Vec<Arc<GroupSpec>>,
}

impl GroupSpec {
    /// Creates a group schema.
    ///
    /// The first member is the delimiter. Nested group count tags must be
    /// listed among `members` at the position their entries appear.
    ///
    /// # Arguments
    /// * `count_tag` - The `NoXXX` tag carrying the number of entries
    /// * `members` - Member tags in wire order
    #[must_use]
    pub fn new(count_tag: u32, members: impl IntoIterator<Item = u32>) -> Self {
        let members: Vec<u32> = members.into_iter().collect();
        Self {
            count_tag,
            delimiter: members.first().copied().unwrap_or(0),
            members,
            nested: Vec::new(),
        }
    }

    /// Adds a nested group schema.
    ///
    /// The nested count tag is appended to the members if it is not already
    /// listed.
    #[must_use]
    pub fn with_nested(mut self, spec: impl Into<Arc<GroupSpec>>) -> Self {
        let spec = spec.into();
        if !self.members.contains(&spec.count_tag) {
            self.members.push(spec.count_tag);
        }
        self.nested.push(spec);
        self
    }

    /// Returns the count tag.
    #[inline]
    #[must_use]
    pub const fn count_tag(&self) -> u32 {
        self.count_tag
    }

    /// Returns the delimiter tag.
    #[inline]
    #[must_use]
    pub const fn delimiter(&self) -> u32 {
        self.delimiter
    }

    /// Returns the member tags in declared order.
    #[must_use]
    pub fn members(&self) -> &[u32] {
        &self.members
    }

    /// Returns true if `tag` belongs to this group's schema.
    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.members.contains(&tag)
    }

    /// Returns the declared position of `tag`.
    #[must_use]
    pub fn position(&self, tag: u32) -> Option<usize> {
        self.members.iter().position(|&t| t == tag)
    }

    /// Returns the nested group spec for `count_tag`.
    #[must_use]
    pub fn nested(&self, count_tag: u32) -> Option<&Arc<GroupSpec>> {
        self.nested.iter().find(|s| s.count_tag == count_tag)
    }
}

/// One entry of a repeating group.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    spec: Arc<GroupSpec>,
    fields: FieldMap,
}

impl Group {
    /// Creates an empty entry for the given schema.
    #[must_use]
    pub fn new(spec: impl Into<Arc<GroupSpec>>) -> Self {
        Self {
            spec: spec.into(),
            fields: FieldMap::new(),
        }
    }

    /// Returns the schema of this entry.
    #[must_use]
    pub fn spec(&self) -> &Arc<GroupSpec> {
        &self.spec
    }

    /// Returns the count tag of the group this entry belongs to.
    #[inline]
    #[must_use]
    pub fn count_tag(&self) -> u32 {
        self.spec.count_tag
    }

    /// Sets a member field.
    ///
    /// # Errors
    /// Returns `FieldMapError::TagNotInGroup` if `tag` is not a scalar member
    /// of the schema.
    pub fn set_field(&mut self, tag: u32, value: impl Into<Bytes>) -> Result<(), FieldMapError> {
        if !self.spec.contains(tag) || self.spec.nested(tag).is_some() {
            return Err(FieldMapError::TagNotInGroup {
                tag,
                count_tag: self.spec.count_tag,
            });
        }
        self.fields.set_field(tag, value);
        Ok(())
    }

    /// Sets a member field from a typed value.
    ///
    /// # Errors
    /// Returns `FieldMapError::TagNotInGroup` if `tag` is not a member.
    pub fn set_as<T: FieldConvert>(&mut self, tag: u32, value: &T) -> Result<(), FieldMapError> {
        self.set_field(tag, value.to_field())
    }

    /// Sets a member field through its descriptor.
    ///
    /// # Errors
    /// Returns `FieldMapError::TagNotInGroup` if the field is not a member.
    pub fn set<F: FixField>(&mut self, value: F::Value) -> Result<(), FieldMapError> {
        self.set_as(F::TAG, &value)
    }

    /// Returns the raw value of a member field.
    ///
    /// # Errors
    /// Returns `FieldMapError::FieldNotFound` if the field is not set.
    pub fn get_field(&self, tag: u32) -> Result<&Bytes, FieldMapError> {
        self.fields.get_field(tag)
    }

    /// Returns a member field converted to `T`.
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue`.
    pub fn get_as<T: FieldConvert>(&self, tag: u32) -> Result<T, FieldMapError> {
        self.fields.get_as(tag)
    }

    /// Returns a member field through its descriptor.
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue`.
    pub fn get<F: FixField>(&self) -> Result<F::Value, FieldMapError> {
        self.fields.get::<F>()
    }

    /// Returns true if the member is set.
    #[must_use]
    pub fn is_set_field(&self, tag: u32) -> bool {
        self.fields.is_set_field(tag)
    }

    /// Appends an entry to a nested group.
    ///
    /// # Errors
    /// Returns `TagNotInGroup` if the nested group is not part of this schema,
    /// or `MissingDelimiter` if the entry lacks its delimiter.
    pub fn add_group(&mut self, entry: Group) -> Result<(), FieldMapError> {
        if self.spec.nested(entry.count_tag()).is_none() {
            return Err(FieldMapError::TagNotInGroup {
                tag: entry.count_tag(),
                count_tag: self.spec.count_tag,
            });
        }
        self.fields.add_group(entry)
    }

    /// Returns a nested group entry.
    ///
    /// # Errors
    /// Returns `FieldMapError::GroupNotFound` if there is no such entry.
    pub fn group(&self, count_tag: u32, index: usize) -> Result<&Group, FieldMapError> {
        self.fields.group(count_tag, index)
    }

    /// Returns the number of entries in a nested group.
    #[must_use]
    pub fn group_count(&self, count_tag: u32) -> usize {
        self.fields.group_count(count_tag)
    }

    /// Returns the underlying field map.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Returns true if the entry carries its delimiter.
    #[must_use]
    pub fn has_delimiter(&self) -> bool {
        self.fields.is_set_field(self.spec.delimiter)
    }

    /// Iterates the entry's slots in the schema's declared order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (u32, &Slot)> {
        self.spec
            .members
            .iter()
            .filter_map(|&tag| self.fields.slot(tag).map(|slot| (tag, slot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;

    fn assert_serde<T: Serialize + DeserializeOwned>() {}

    #[test]
    fn test_nested_spec_is_serializable() {
        assert_serde::<GroupSpec>();
        assert_serde::<Arc<GroupSpec>>();
    }

    fn parties() -> Arc<GroupSpec> {
        Arc::new(
            GroupSpec::new(453, [448, 447, 452])
                .with_nested(GroupSpec::new(802, [523, 803])),
        )
    }

    #[test]
    fn test_spec_layout() {
        let spec = parties();
        assert_eq!(spec.count_tag(), 453);
        assert_eq!(spec.delimiter(), 448);
        assert_eq!(spec.members(), &[448, 447, 452, 802]);
        assert!(spec.nested(802).is_some());
        assert_eq!(spec.position(452), Some(2));
    }

    #[test]
    fn test_set_field_rejects_foreign_tag() {
        let mut entry = Group::new(parties());
        entry.set_field(448, "BROKER").unwrap();
        let err = entry.set_field(55, "MSFT").unwrap_err();
        assert_eq!(err, FieldMapError::TagNotInGroup { tag: 55, count_tag: 453 });

        // count tags go through add_group
        assert!(entry.set_field(802, "1").is_err());
    }

    #[test]
    fn test_nested_group() {
        let spec = parties();
        let nested = spec.nested(802).unwrap().clone();
        let mut entry = Group::new(spec);
        entry.set_field(448, "BROKER").unwrap();

        let mut sub = Group::new(nested);
        sub.set_field(523, "DESK-1").unwrap();
        entry.add_group(sub).unwrap();
        assert_eq!(entry.group_count(802), 1);
        assert_eq!(&entry.group(802, 0).unwrap().get_field(523).unwrap()[..], b"DESK-1");

        let stranger = Group::new(GroupSpec::new(78, [79]));
        assert!(entry.add_group(stranger).is_err());
    }

    #[test]
    fn test_iter_ordered_follows_schema() {
        let mut entry = Group::new(parties());
        entry.set_field(452, "1").unwrap();
        entry.set_field(448, "BROKER").unwrap();
        entry.set_field(447, "D").unwrap();
        let tags: Vec<u32> = entry.iter_ordered().map(|(t, _)| t).collect();
        assert_eq!(tags, vec![448, 447, 452]);
    }
}
