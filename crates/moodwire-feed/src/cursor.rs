//! Offset-cursor arithmetic for the `searchPosts` endpoint.
//!
//! The endpoint's cursor is a decimal count of results already consumed,
//! which is what lets the collector fan out: worker `i` of a round starts at
//! `round_base + i × page_size` without having walked the pages in between.
//! An empty cursor means the start of the result set.

/// Parses a stored cursor into a result offset.
///
/// Returns `None` for anything that is not a plain decimal number — a
/// corrupt cursor must surface, not silently restart pagination at zero.
#[must_use]
pub fn cursor_offset(cursor: &str) -> Option<u64> {
    if cursor.is_empty() {
        return Some(0);
    }
    cursor.parse::<u64>().ok()
}

/// Renders an offset as the cursor parameter for a request.
///
/// Offset zero maps to `None`: the first page is requested without a cursor.
#[must_use]
pub fn offset_to_cursor(offset: u64) -> Option<String> {
    if offset == 0 {
        None
    } else {
        Some(offset.to_string())
    }
}

/// The stored representation of an offset (what goes back into the run record).
#[must_use]
pub fn offset_to_stored(offset: u64) -> String {
    offset.to_string()
}
