//! Formatting helpers shared across the data model.

use std::fmt;

/// Wraps a `Display` value so it can be used wherever a `Debug` impl is expected.
///
/// Several types (e.g. block and transaction hashes) print the same compact
/// hex form for both `Debug` and `Display`; this avoids duplicating the
/// formatting logic.
pub struct DisplayToDebug<T>(pub T);

impl<T: fmt::Display> fmt::Debug for DisplayToDebug<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
