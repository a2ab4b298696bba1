//! Process-wide string interner backing the freezer's structural deduplication.
//!
//! Two strings with the same bytes resolve to the same `&'static str` pointer,
//! so equality/hashing after interning is pointer comparison, but the interner
//! itself compares *structurally* when deciding whether a string is new --
//! otherwise the size-halving benefit of interning vanishes.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::RwLock;
use std::sync::LazyLock;

static INTERNER: LazyLock<RwLock<HashSet<&'static str>>> = LazyLock::new(|| RwLock::new(HashSet::new()));

/// An interned, reference-counted-by-leak string. Cheap to clone and compare.
#[derive(Clone, Copy, Eq)]
pub struct InternedString {
    inner: &'static str,
}

impl InternedString {
    pub fn new(s: &str) -> Self {
        // Fast path: already interned.
        if let Some(found) = INTERNER.read().unwrap().get(s) {
            return InternedString { inner: found };
        }
        // Slow path: double-check under the write lock, then leak.
        let mut interner = INTERNER.write().unwrap();
        if let Some(found) = interner.get(s) {
            return InternedString { inner: found };
        }
        let leaked: &'static str = Box::leak(s.to_string().into_boxed_str());
        interner.insert(leaked);
        InternedString { inner: leaked }
    }

    pub fn as_str(&self) -> &'static str {
        self.inner
    }
}

impl PartialEq for InternedString {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Hash for InternedString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.inner.as_ptr() as usize).hash(state);
    }
}

impl PartialOrd for InternedString {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternedString {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.inner.cmp(other.inner)
    }
}

impl Deref for InternedString {
    type Target = str;
    fn deref(&self) -> &str {
        self.inner
    }
}

impl AsRef<str> for InternedString {
    fn as_ref(&self) -> &str {
        self.inner
    }
}

impl Borrow<str> for InternedString {
    fn borrow(&self) -> &str {
        self.inner
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.inner)
    }
}

impl fmt::Display for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<&str> for InternedString {
    fn from(s: &str) -> Self {
        InternedString::new(s)
    }
}

impl From<String> for InternedString {
    fn from(s: String) -> Self {
        InternedString::new(&s)
    }
}

impl serde::Serialize for InternedString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.inner)
    }
}

impl<'de> serde::Deserialize<'de> for InternedString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(InternedString::new(&s))
    }
}

/// An interner scoped to one freeze pass. Wraps the process-wide interner so
/// that repeated string payloads within a single frozen model share storage,
/// while still benefiting from cross-run deduplication.
#[derive(Debug, Default)]
pub struct Interner;

impl Interner {
    pub fn new() -> Self {
        Interner
    }

    pub fn intern(&mut self, s: &str) -> InternedString {
        InternedString::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_share_storage() {
        let a = InternedString::new("STREQUAL");
        let b = InternedString::new("STREQUAL");
        assert_eq!(a, b);
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
    }

    #[test]
    fn different_strings_differ() {
        let a = InternedString::new("PUBLIC");
        let b = InternedString::new("PRIVATE");
        assert_ne!(a, b);
    }

    #[test]
    fn interner_intern_reuses_process_wide_table() {
        let mut interner = Interner::new();
        let a = interner.intern("INTERFACE");
        let b = InternedString::new("INTERFACE");
        assert_eq!(a, b);
    }
}
