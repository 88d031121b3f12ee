use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Flat set of permission codenames a user holds through their active groups.
///
/// Serializes as a sorted JSON array, which is also the cached form and the
/// `permissions` field of the login response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, codename: &str) -> bool {
        self.0.contains(codename)
    }

    pub fn has_any<'a, I>(&self, codenames: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        codenames.into_iter().any(|c| self.contains(c))
    }

    pub fn has_all<'a, I>(&self, codenames: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        codenames.into_iter().all(|c| self.contains(c))
    }

    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        requirement.is_satisfied_by(self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Predicate over a [`PermissionSet`] that guards a route or a UI element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    One(String),
    AnyOf(Vec<String>),
    AllOf(Vec<String>),
}

impl Requirement {
    pub fn any_of<I, S>(codenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(codenames.into_iter().map(Into::into).collect())
    }

    pub fn all_of<I, S>(codenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllOf(codenames.into_iter().map(Into::into).collect())
    }

    pub fn is_satisfied_by(&self, set: &PermissionSet) -> bool {
        match self {
            Requirement::One(code) => set.contains(code),
            // An empty any-of can never be met; an empty all-of always is.
            Requirement::AnyOf(codes) => set.has_any(codes.iter().map(String::as_str)),
            Requirement::AllOf(codes) => set.has_all(codes.iter().map(String::as_str)),
        }
    }
}

impl From<&str> for Requirement {
    fn from(codename: &str) -> Self {
        Self::One(codename.to_string())
    }
}

impl From<String> for Requirement {
    fn from(codename: String) -> Self {
        Self::One(codename)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::One(code) => f.write_str(code),
            Requirement::AnyOf(codes) => write!(f, "any of [{}]", codes.join(", ")),
            Requirement::AllOf(codes) => write!(f, "all of [{}]", codes.join(", ")),
        }
    }
}
