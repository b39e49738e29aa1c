//! Cursor and versioned-value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly increasing version stamp for one remote value.
///
/// Assigned by the responder on every write. Clients treat it as opaque and
/// only ever hand it back in a [`GetRequest`]. The value `0` is the sentinel
/// for "no prior observation": no store ever assigns it, so a request at
/// cursor 0 is always answered immediately.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Cursor(u64);

impl Cursor {
    /// Create a new Cursor with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this Cursor.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The "no prior observation" sentinel.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Whether this is the sentinel cursor.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({})", self.0)
    }
}

/// A get-with-cursor request.
///
/// The responder answers only once it holds a value whose cursor is
/// strictly greater than `cursor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GetRequest {
    /// Return the first value with a cursor greater than this one.
    pub cursor: Cursor,
}

impl GetRequest {
    /// Request the next value after `cursor`.
    pub fn after(cursor: Cursor) -> Self {
        Self { cursor }
    }

    /// Request the current value, whatever its cursor.
    pub fn latest() -> Self {
        Self {
            cursor: Cursor::zero(),
        }
    }
}

/// A value together with the cursor it was written at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The value.
    pub value: T,
    /// The cursor assigned when `value` was written.
    pub cursor: Cursor,
}

impl<T> Versioned<T> {
    /// Pair a value with its cursor.
    pub fn new(value: T, cursor: Cursor) -> Self {
        Self { value, cursor }
    }

    /// Whether this value satisfies a request made at `threshold`.
    pub fn is_newer_than(&self, threshold: Cursor) -> bool {
        self.cursor > threshold
    }

    /// Transform the value, keeping the cursor.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            value: f(self.value),
            cursor: self.cursor,
        }
    }
}
