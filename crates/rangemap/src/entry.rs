use crate::address::{Address, Size};

/// One stored range: `[start, start+size)` mapped to `label`, optionally
/// carrying the start of the corresponding range in a parallel domain.
///
/// Mirrors spec.md §3's `{ start, size, label, other_start }`, with
/// `other_start = NO_TRANSLATION` modeled as `None` rather than a sentinel
/// (see `rangemap_core::address::Size` for the analogous choice on sizes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub start: Address,
    pub size: Size,
    pub label: Box<str>,
    pub other_start: Option<Address>,
}

impl Entry {
    pub fn new(start: Address, size: Size, label: impl Into<Box<str>>) -> Self {
        Self {
            start,
            size,
            label: label.into(),
            other_start: None,
        }
    }

    pub fn with_translation(
        start: Address,
        size: Size,
        label: impl Into<Box<str>>,
        other_start: Address,
    ) -> Self {
        Self {
            start,
            size,
            label: label.into(),
            other_start: Some(other_start),
        }
    }

    /// `None` for unknown-size entries: their extent depends on the
    /// neighbor that follows them in the map.
    pub fn known_end(&self) -> Option<Address> {
        self.size.checked_end(self.start)
    }

    pub fn contains(&self, addr: Address) -> bool {
        match self.known_end() {
            Some(end) => addr >= self.start && addr < end,
            None => addr >= self.start,
        }
    }

    /// Translates `addr` (which must lie within this entry) into the
    /// parallel domain: `addr - start + other_start`.
    pub fn translate(&self, addr: Address) -> Option<Address> {
        self.other_start
            .map(|other| addr - self.start + other)
    }
}

/// A fallback label is any label whose first character is `[`
/// (e.g. `[Unmapped]`, `[None]`, `[ELF Headers]`).
pub fn is_fallback_label(label: &str) -> bool {
    label.starts_with('[')
}

/// A short fallback is a fallback label on a range of at most 16 bytes,
/// treated as probable padding during compression.
pub fn is_short_fallback(label: &str, size: Size) -> bool {
    is_fallback_label(label) && matches!(size, Size::Known(n) if n <= 16)
}
