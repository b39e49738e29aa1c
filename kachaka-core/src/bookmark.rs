//! Consumer-local cursor bookmarks.
//!
//! Each consumption path (a listener loop, a value stream) owns one
//! bookmark. It starts at the sentinel cursor so the first poll returns the
//! current value immediately, and only ever moves forward: a responder that
//! answers with a cursor that is not strictly greater than the one asked for
//! has broken the protocol, and following it would starve the consumer.

use kachaka_types::Cursor;
use thiserror::Error;

/// A response cursor did not advance past the bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cursor did not advance: bookmark at {bookmark}, responder returned {observed}")]
pub struct CursorRegression {
    /// Where the bookmark was.
    pub bookmark: Cursor,
    /// What the responder returned.
    pub observed: Cursor,
}

/// Tracks how far one consumer has progressed through a store's updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bookmark {
    cursor: Cursor,
}

impl Bookmark {
    /// Create a bookmark at the sentinel cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bookmark at a specific cursor.
    ///
    /// This is useful when resuming from a cursor obtained elsewhere.
    pub fn at(cursor: Cursor) -> Self {
        Self { cursor }
    }

    /// The cursor to poll with next.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Record an observed cursor.
    ///
    /// Fails without moving if `observed` is not strictly greater than the
    /// current bookmark.
    pub fn advance(&mut self, observed: Cursor) -> Result<(), CursorRegression> {
        if observed <= self.cursor {
            return Err(CursorRegression {
                bookmark: self.cursor,
                observed,
            });
        }
        self.cursor = observed;
        Ok(())
    }

    /// Go back to the sentinel cursor.
    pub fn reset(&mut self) {
        self.cursor = Cursor::zero();
    }
}
