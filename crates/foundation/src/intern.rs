//! Process-wide string intern pool.
//!
//! Symbols, assoc keys, labels, and string values are all held as interned
//! ids. The pool is reference-counted: one count per *held* id. Every code
//! path that stores an id must pair with a release when the holder lets go,
//! otherwise the entry leaks for the life of the process.
//!
//! The pool is an explicit owner constructed once at runtime init and
//! passed (as `Arc<StringPool>`) into everything that needs it.

use std::collections::HashMap;
use std::sync::RwLock;

/// Interned string id. `NOT_A_STRING_ID` is the null sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u32);

/// The id carried by null/absent strings. Resolves to nothing and is safe
/// to release any number of times.
pub const NOT_A_STRING_ID: StringId = StringId(0);

impl StringId {
    /// Whether this id refers to an actual interned string.
    #[inline]
    pub fn is_string(self) -> bool {
        self != NOT_A_STRING_ID
    }
}

struct Entry {
    text: String,
    refs: u32,
}

#[derive(Default)]
struct Inner {
    by_text: HashMap<String, u32>,
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
}

/// Reference-counted intern pool. All methods take `&self`; the lock is
/// held at the narrowest possible scope.
pub struct StringPool {
    inner: RwLock<Inner>,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        // slot 0 is reserved for NOT_A_STRING_ID
        inner.entries.push(None);
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Intern `text`, creating it if needed, and take one reference.
    pub fn intern(&self, text: &str) -> StringId {
        let mut inner = self.inner.write().expect("string pool poisoned");
        if let Some(&slot) = inner.by_text.get(text) {
            if let Some(entry) = inner.entries[slot as usize].as_mut() {
                entry.refs += 1;
            }
            return StringId(slot);
        }
        let entry = Entry {
            text: text.to_string(),
            refs: 1,
        };
        let slot = match inner.free.pop() {
            Some(slot) => {
                inner.entries[slot as usize] = Some(entry);
                slot
            }
            None => {
                inner.entries.push(Some(entry));
                (inner.entries.len() - 1) as u32
            }
        };
        inner.by_text.insert(text.to_string(), slot);
        StringId(slot)
    }

    /// Take an additional reference on an already-held id.
    pub fn acquire(&self, id: StringId) -> StringId {
        if !id.is_string() {
            return NOT_A_STRING_ID;
        }
        let mut inner = self.inner.write().expect("string pool poisoned");
        if let Some(entry) = inner.entries[id.0 as usize].as_mut() {
            entry.refs += 1;
        }
        id
    }

    /// Release one reference; frees the entry when the count reaches zero.
    pub fn release(&self, id: StringId) {
        if !id.is_string() {
            return;
        }
        let mut inner = self.inner.write().expect("string pool poisoned");
        let freed = match inner.entries[id.0 as usize].as_mut() {
            Some(entry) => {
                entry.refs -= 1;
                if entry.refs == 0 {
                    Some(entry.text.clone())
                } else {
                    None
                }
            }
            None => None,
        };
        if let Some(text) = freed {
            inner.by_text.remove(&text);
            inner.entries[id.0 as usize] = None;
            inner.free.push(id.0);
        }
    }

    /// Resolve an id to its text. Returns `None` for the null sentinel or a
    /// stale id.
    pub fn resolve(&self, id: StringId) -> Option<String> {
        if !id.is_string() {
            return None;
        }
        let inner = self.inner.read().expect("string pool poisoned");
        inner.entries[id.0 as usize]
            .as_ref()
            .map(|e| e.text.clone())
    }

    /// Resolve an id, substituting the empty string for null/stale ids.
    pub fn resolve_or_empty(&self, id: StringId) -> String {
        self.resolve(id).unwrap_or_default()
    }

    /// Return the id for `text` without creating it or taking a reference.
    /// Yields `NOT_A_STRING_ID` when the string was never interned.
    pub fn id_if_present(&self, text: &str) -> StringId {
        let inner = self.inner.read().expect("string pool poisoned");
        inner
            .by_text
            .get(text)
            .map(|&slot| StringId(slot))
            .unwrap_or(NOT_A_STRING_ID)
    }

    /// Current reference count, for tests and integrity checks.
    pub fn ref_count(&self, id: StringId) -> u32 {
        if !id.is_string() {
            return 0;
        }
        let inner = self.inner.read().expect("string pool poisoned");
        inner.entries[id.0 as usize]
            .as_ref()
            .map(|e| e.refs)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_resolve_round_trip() {
        let pool = StringPool::new();
        let id = pool.intern("hello");
        assert!(id.is_string());
        assert_eq!(pool.resolve(id).as_deref(), Some("hello"));
    }

    #[test]
    fn test_same_text_same_id() {
        let pool = StringPool::new();
        let a = pool.intern("x");
        let b = pool.intern("x");
        assert_eq!(a, b);
        assert_eq!(pool.ref_count(a), 2);
    }

    #[test]
    fn test_release_frees_and_reuses_slot() {
        let pool = StringPool::new();
        let a = pool.intern("gone");
        pool.release(a);
        assert_eq!(pool.resolve(a), None);
        assert_eq!(pool.id_if_present("gone"), NOT_A_STRING_ID);

        let b = pool.intern("next");
        // freed slot is recycled
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn test_id_if_present_takes_no_reference() {
        let pool = StringPool::new();
        let id = pool.intern("probe");
        let probe = pool.id_if_present("probe");
        assert_eq!(id, probe);
        assert_eq!(pool.ref_count(id), 1);
    }

    #[test]
    fn test_null_sentinel_is_inert() {
        let pool = StringPool::new();
        pool.release(NOT_A_STRING_ID);
        pool.release(NOT_A_STRING_ID);
        assert_eq!(pool.resolve(NOT_A_STRING_ID), None);
        assert_eq!(pool.acquire(NOT_A_STRING_ID), NOT_A_STRING_ID);
    }
}
