//! MQTT 5 property bag abstraction.
//!
//! A thin, transport-neutral view of the MQTT 5 user-property list: codecs
//! append string or binary properties, the transport maps them onto its
//! native representation, and receivers look values up by name.

use bytes::Bytes;

/// One property entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// UTF-8 user property.
    String {
        /// Property name.
        name: Bytes,
        /// Property value.
        value: Bytes,
    },
    /// Binary property (correlation data and friends).
    Binary {
        /// Property name.
        name: Bytes,
        /// Property value.
        value: Bytes,
    },
}

impl Property {
    /// The property name.
    pub fn name(&self) -> &[u8] {
        match self {
            Property::String { name, .. } | Property::Binary { name, .. } => name,
        }
    }

    /// The property value bytes.
    pub fn value(&self) -> &[u8] {
        match self {
            Property::String { value, .. } | Property::Binary { value, .. } => value,
        }
    }
}

/// An ordered MQTT 5 property list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBag {
    entries: Vec<Property>,
}

impl PropertyBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a UTF-8 user property.
    pub fn append_string(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.entries.push(Property::String {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Appends a binary property.
    pub fn append_binary(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.entries.push(Property::Binary {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Removes every entry, keeping the bag reusable.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The first value stored under `name`, if any.
    pub fn find(&self, name: &[u8]) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|entry| entry.name() == name)
            .map(Property::value)
    }

    /// Iterates entries in append order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the bag holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_find_clear() {
        let mut bag = PropertyBag::new();
        bag.append_string(&b"Status"[..], &b"200"[..]);
        bag.append_binary(&b"corr"[..], &b"\x01\x02"[..]);

        assert_eq!(bag.len(), 2);
        assert_eq!(bag.find(b"Status"), Some(b"200".as_slice()));
        assert_eq!(bag.find(b"corr"), Some(b"\x01\x02".as_slice()));
        assert_eq!(bag.find(b"missing"), None);

        bag.clear();
        assert!(bag.is_empty());
        assert_eq!(bag.find(b"Status"), None);
    }
}
