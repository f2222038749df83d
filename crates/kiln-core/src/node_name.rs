//! Name of a node in the execution order

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// Reserved prefix identifying data-quality test nodes in the execution order
pub const TEST_NODE_PREFIX: &str = "test:";

/// Name of a node in the execution order: `schema.object` or bare `object`.
///
/// Never empty. Test nodes carry the [`TEST_NODE_PREFIX`] and are never
/// materialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeName(String);

impl NodeName {
    /// Panics on an empty name; use [`NodeName::try_new`] for manifest input.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "node name must not be empty");
        Self(name)
    }

    pub fn try_new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        (!name.is_empty()).then_some(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this node is a data-quality test
    pub fn is_test(&self) -> bool {
        self.0.starts_with(TEST_NODE_PREFIX)
    }

    /// Schema part of a qualified name, if any
    pub fn schema(&self) -> Option<&str> {
        self.0.rfind('.').map(|pos| &self.0[..pos])
    }

    /// Object part of the name (everything after the last `.`)
    pub fn object(&self) -> &str {
        match self.0.rfind('.') {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    /// Schema to use for this node, falling back to the active schema
    pub fn schema_or<'a>(&'a self, active: Option<&'a str>) -> Option<&'a str> {
        self.schema().or(active)
    }
}

impl TryFrom<String> for NodeName {
    type Error = &'static str;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::try_new(name).ok_or("node name must not be empty")
    }
}

impl TryFrom<&str> for NodeName {
    type Error = &'static str;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::try_from(name.to_string())
    }
}

impl From<NodeName> for String {
    fn from(name: NodeName) -> Self {
        name.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for NodeName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NodeName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<String> for NodeName {
    fn eq(&self, other: &String) -> bool {
        &self.0 == other
    }
}

#[cfg(test)]
#[path = "node_name_test.rs"]
mod tests;
