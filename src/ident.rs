//! # Gossip Identifiers
//!
//! Identifiers partition the gossip streams sharing one shell. Equality and
//! hashing are derived solely from the identifier's string form: two
//! identifiers compare equal if and only if their strings are equal, so the
//! string form is the canonical wire representation.

use std::fmt;

/// Opaque handle distinguishing coexisting gossip streams within one shell.
///
/// Cheap to clone; ordered so registries and test output are deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GossipIdentifier(String);

impl GossipIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GossipIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GossipIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GossipIdentifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Normalization of domain-specific identifiers into the canonical form.
///
/// Applications with their own identifier types implement this so the same
/// value can key a gossip stream without stringly-typed call sites.
pub trait GossipIdentified {
    fn gossip_identifier(&self) -> GossipIdentifier;
}

impl GossipIdentified for GossipIdentifier {
    fn gossip_identifier(&self) -> GossipIdentifier {
        self.clone()
    }
}

impl GossipIdentified for &str {
    fn gossip_identifier(&self) -> GossipIdentifier {
        GossipIdentifier::from(*self)
    }
}

impl GossipIdentified for String {
    fn gossip_identifier(&self) -> GossipIdentifier {
        GossipIdentifier::from(self.clone())
    }
}
