//! Entity identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an account, group or extended target.
///
/// Format: 3-char prefix + 6 base36 chars = 9 chars total.
/// Example: "AAAAAAAAB"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap an id read from storage or supplied by a caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const COUNTER_LEN: usize = 6;

/// Allocates entity ids in sequence.
///
/// The allocator only ever moves forward; the last id handed out is
/// persisted so a restart continues where it left off.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    prefix: String,
    counter: u64,
}

impl IdAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    /// Allocate the next id.
    pub fn next_id(&mut self) -> EntityId {
        self.counter += 1;
        EntityId(format!("{}{}", self.prefix, base36_encode_6(self.counter)))
    }

    /// The most recently allocated id, if any.
    pub fn last_id(&self) -> Option<EntityId> {
        (self.counter > 0)
            .then(|| EntityId(format!("{}{}", self.prefix, base36_encode_6(self.counter))))
    }

    /// Resume from a persisted id. Ids that do not decode are ignored.
    pub fn resume_from(&mut self, last: &str) {
        if last.len() < COUNTER_LEN {
            return;
        }
        let (_, tail) = last.split_at(last.len() - COUNTER_LEN);
        if let Some(n) = base36_decode(tail)
            && n > self.counter
        {
            self.counter = n;
        }
    }
}

/// Encode a number as a 6-character base36 string.
fn base36_encode_6(mut n: u64) -> String {
    let mut result = [b'A'; COUNTER_LEN];

    for i in (0..COUNTER_LEN).rev() {
        result[i] = CHARS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&result).into_owned()
}

fn base36_decode(s: &str) -> Option<u64> {
    s.bytes().try_fold(0u64, |acc, b| {
        let digit = CHARS.iter().position(|&c| c == b)? as u64;
        Some(acc * 36 + digit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_in_sequence() {
        let mut ids = IdAllocator::new("AAA");
        assert_eq!(ids.last_id(), None);
        assert_eq!(ids.next_id().as_str(), "AAAAAAAAB");
        assert_eq!(ids.next_id().as_str(), "AAAAAAAAC");
        assert_eq!(ids.last_id().map(|id| id.to_string()), Some("AAAAAAAAC".into()));
    }

    #[test]
    fn encodes_base36() {
        assert_eq!(base36_encode_6(0), "AAAAAA");
        assert_eq!(base36_encode_6(35), "AAAAA9");
        assert_eq!(base36_encode_6(36), "AAAABA");
        assert_eq!(base36_decode("AAAABA"), Some(36));
        assert_eq!(base36_decode("AA-ABA"), None);
    }

    #[test]
    fn resumes_after_persisted_id() {
        let mut ids = IdAllocator::new("AAA");
        ids.resume_from("AAAAAAAB9");
        assert_eq!(ids.next_id().as_str(), "AAAAAAACA");

        // never moves backwards
        ids.resume_from("AAAAAAAAB");
        assert_eq!(ids.next_id().as_str(), "AAAAAAACB");
    }
}
