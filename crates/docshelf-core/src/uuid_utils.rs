//! UUID v7 utilities for time-ordered identifiers.
//!
//! Every document, folder, fragment and event id is a UUIDv7, so ids sort by
//! creation time and the newest-first listings can order by id.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use docshelf_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// // IDs generated later will be lexicographically greater
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}
