use crate::address::{Address, Size};
use crate::entry::{is_fallback_label, is_short_fallback, Entry};
use crate::error::{RangeMapError, Result};

/// An ordered, non-overlapping map from integer intervals to labels.
///
/// Entries are kept in a `Vec` sorted by `start`, mirroring the teacher
/// `rle` crate's `Vec`-backed `AppendRle` pattern but generalized from an
/// append-only log to a map that can also insert in the middle (gap-filling
/// during `add_dual_range`) and look up by address.
#[derive(Clone, Debug, Default)]
pub struct RangeMap {
    entries: Vec<Entry>,
}

impl RangeMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The address at which `entries[idx]` stops claiming bytes: its own
    /// known end, or (for an unknown-size entry) the start of whatever
    /// follows it, or `Address::MAX` if it's the last entry.
    pub(crate) fn effective_end(&self, idx: usize) -> Address {
        match self.entries[idx].known_end() {
            Some(end) => end,
            None => self
                .entries
                .get(idx + 1)
                .map(|e| e.start)
                .unwrap_or(Address::MAX),
        }
    }

    /// Index of the first entry whose effective end is strictly greater
    /// than `addr` — i.e. the first entry that could contain or follow
    /// `addr`. Entries before this index end at or before `addr`.
    fn cursor_at(&self, addr: Address) -> usize {
        // partition_point requires a monotone predicate; effective_end is
        // monotonically non-decreasing across sorted, non-overlapping entries.
        let mut lo = 0usize;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.effective_end(mid) <= addr {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn contains_at(&self, idx: usize, addr: Address) -> bool {
        let e = &self.entries[idx];
        addr >= e.start && addr < self.effective_end(idx)
    }

    // ---- public queries -------------------------------------------------

    pub fn translate(&self, addr: Address) -> Option<Address> {
        let idx = self.cursor_at(addr);
        if idx < self.entries.len() && self.contains_at(idx, addr) {
            self.entries[idx].translate(addr)
        } else {
            None
        }
    }

    pub fn try_get_label(&self, addr: Address) -> Option<&str> {
        let idx = self.cursor_at(addr);
        if idx < self.entries.len() && self.contains_at(idx, addr) {
            Some(&self.entries[idx].label)
        } else {
            None
        }
    }

    /// Label for `[addr, addr+size)`, only if the whole range is covered
    /// and every covered entry carries the same label.
    pub fn try_get_label_for_range(&self, addr: Address, size: u64) -> Option<&str> {
        if size == 0 {
            return self.try_get_label(addr);
        }
        if !self.covers_range(addr, size) {
            return None;
        }
        let end = addr.checked_add(size)?;
        let mut label: Option<&str> = None;
        let mut cur = addr;
        let mut idx = self.cursor_at(addr);
        while cur < end {
            let e = &self.entries[idx];
            match label {
                None => label = Some(&e.label),
                Some(l) if l == &*e.label => {}
                Some(_) => return None,
            }
            cur = self.effective_end(idx);
            idx += 1;
        }
        label
    }

    /// Only matches an entry whose `start` is exactly `addr`.
    pub fn try_get_size(&self, addr: Address) -> Option<Size> {
        self.entries
            .binary_search_by_key(&addr, |e| e.start)
            .ok()
            .map(|idx| self.entries[idx].size)
    }

    pub fn covers_range(&self, addr: Address, size: u64) -> bool {
        if size == 0 {
            return true;
        }
        let Some(end) = addr.checked_add(size) else {
            return false;
        };
        let mut cur = addr;
        let mut idx = self.cursor_at(addr);
        while cur < end {
            if idx >= self.entries.len() || !self.contains_at(idx, cur) {
                return false;
            }
            cur = self.effective_end(idx);
            idx += 1;
        }
        true
    }

    pub fn get_max_address(&self) -> Address {
        self.entries
            .iter()
            .map(|e| e.known_end().unwrap_or(e.start))
            .max()
            .unwrap_or(0)
    }

    pub fn for_each_range(&self, mut f: impl FnMut(&Entry)) {
        for e in &self.entries {
            f(e);
        }
    }

    pub fn for_each_range_with_start(&self, start: Address, mut f: impl FnMut(&Entry)) {
        let idx = self
            .entries
            .partition_point(|e| e.start < start);
        for e in &self.entries[idx..] {
            f(e);
        }
    }

    // ---- mutation ---------------------------------------------------------

    pub fn add_range(&mut self, start: Address, size: Size, label: &str) -> Result<()> {
        self.add_dual_range(start, size, None, label)
    }

    pub fn add_dual_range(
        &mut self,
        start: Address,
        size: Size,
        other_start: Option<Address>,
        label: &str,
    ) -> Result<()> {
        if let Size::Known(0) = size {
            return Ok(());
        }
        let end = match size {
            Size::Known(n) => Some(start.checked_add(n).ok_or_else(|| {
                RangeMapError::new("RangeMap::add_dual_range", "range overflows address space")
            })?),
            Size::Unknown => None,
        };

        let cursor = self.cursor_at(start);

        let Some(end) = end else {
            // size == UNKNOWN
            if cursor < self.entries.len() && self.contains_at(cursor, start) {
                self.maybe_set_label(cursor, start, Size::Unknown);
            } else {
                self.entries
                    .insert(cursor, Entry::new(start, Size::Unknown, label));
                if let Some(other) = other_start {
                    self.entries[cursor].other_start = Some(other);
                }
            }
            return Ok(());
        };

        let mut cur = start;
        let mut idx = cursor;
        while cur < end {
            if idx < self.entries.len() && self.contains_at(idx, cur) {
                let overlap_end = end.min(self.effective_end(idx));
                self.maybe_set_label(idx, cur, Size::Known(overlap_end - cur));
                cur = overlap_end;
                if cur >= self.effective_end(idx) {
                    idx += 1;
                }
            } else {
                let gap_end = if idx < self.entries.len() {
                    end.min(self.entries[idx].start)
                } else {
                    end
                };
                let piece_other = other_start.map(|o| o + (cur - start));
                let mut new_entry = Entry::new(cur, Size::Known(gap_end - cur), label);
                new_entry.other_start = piece_other;
                self.entries.insert(idx, new_entry);
                idx += 1;
                cur = gap_end;
            }
        }
        Ok(())
    }

    /// First-writer-wins: only an `Unknown`-sized entry whose new overlap
    /// starts exactly at its own start and supplies a known size gets its
    /// size shrunk. Every other overlap is left untouched (spec.md §4.1
    /// "MaybeSetLabel").
    fn maybe_set_label(&mut self, idx: usize, addr: Address, incoming_size: Size) {
        let shrink_to = match (self.entries[idx].size, incoming_size) {
            (Size::Unknown, Size::Known(n)) if addr == self.entries[idx].start => {
                let distance = self
                    .entries
                    .get(idx + 1)
                    .map(|e| e.start - self.entries[idx].start)
                    .unwrap_or(u64::MAX);
                Some(n.min(distance))
            }
            _ => None,
        };
        if let Some(n) = shrink_to {
            self.entries[idx].size = Size::Known(n);
        }
    }

    /// Walks entries of `translator` intersecting `[addr, addr+size)`; for
    /// each, inserts the clipped sub-range into `self` (and into `other`
    /// when the translator entry carries a translation). Returns whether
    /// the union of clipped sub-intervals equals `size`.
    pub fn add_range_with_translation(
        &mut self,
        addr: Address,
        size: u64,
        label: &str,
        translator: &RangeMap,
        other: &mut RangeMap,
    ) -> Result<bool> {
        if size == 0 {
            return Ok(true);
        }
        let end = addr.checked_add(size).ok_or_else(|| {
            RangeMapError::new(
                "RangeMap::add_range_with_translation",
                "range overflows address space",
            )
        })?;

        let mut covered = 0u64;
        let mut idx = translator.cursor_at(addr);
        let mut cur = addr;
        while cur < end && idx < translator.entries.len() {
            let e = &translator.entries[idx];
            if e.start >= end {
                break;
            }
            let overlap_start = cur.max(e.start);
            let overlap_end = end.min(translator.effective_end(idx));
            if overlap_start >= overlap_end {
                idx += 1;
                continue;
            }
            let clipped = overlap_end - overlap_start;
            self.add_dual_range(
                overlap_start,
                Size::Known(clipped),
                e.translate(overlap_start),
                label,
            )?;
            if let Some(other_addr) = e.translate(overlap_start) {
                other.add_dual_range(other_addr, Size::Known(clipped), Some(overlap_start), label)?;
            }
            covered += clipped;
            cur = overlap_end;
            if cur >= translator.effective_end(idx) {
                idx += 1;
            }
        }
        Ok(covered == size)
    }

    /// Merges consecutive entries whose labels match, or whose later entry
    /// is a short fallback immediately following a non-fallback label
    /// (absorbed as probable padding). See spec.md §4.1 "compress".
    pub fn compress(&mut self) {
        if self.entries.len() < 2 {
            return;
        }
        let mut compressed: Vec<Entry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let merge = match compressed.last() {
                Some(prev) => {
                    let adjacent = prev.known_end() == Some(entry.start);
                    adjacent
                        && (prev.label == entry.label
                            || (!is_fallback_label(&prev.label)
                                && is_short_fallback(&entry.label, entry.size)))
                }
                None => false,
            };
            if merge {
                let prev = compressed.last_mut().unwrap();
                prev.size = match (prev.size, entry.size) {
                    (Size::Known(a), Size::Known(b)) => Size::Known(a + b),
                    _ => Size::Unknown,
                };
            } else {
                compressed.push(entry);
            }
        }
        self.entries = compressed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_range_no_overlap() {
        let mut m = RangeMap::new();
        m.add_range(0, Size::Known(10), "a").unwrap();
        m.add_range(10, Size::Known(10), "b").unwrap();
        assert_eq!(m.try_get_label(5), Some("a"));
        assert_eq!(m.try_get_label(15), Some("b"));
        assert_eq!(m.get_max_address(), 20);
    }

    #[test]
    fn zero_size_is_noop() {
        let mut m = RangeMap::new();
        m.add_range(0, Size::Known(0), "a").unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn first_writer_wins_on_overlap() {
        let mut m = RangeMap::new();
        m.add_range(0, Size::Known(10), "real").unwrap();
        m.add_range(0, Size::Known(10), "fallback").unwrap();
        assert_eq!(m.try_get_label(5), Some("real"));
    }

    #[test]
    fn unknown_size_shrinks_on_next_insert() {
        let mut m = RangeMap::new();
        m.add_range(0, Size::Unknown, "sym").unwrap();
        m.add_range(10, Size::Known(5), "next").unwrap();
        assert_eq!(m.try_get_size(0), Some(Size::Known(10)));
    }

    #[test]
    fn unknown_size_shrinks_to_min_of_new_size_and_next_entry() {
        let mut m = RangeMap::new();
        m.add_range(100, Size::Known(10), "next").unwrap();
        m.add_range(0, Size::Unknown, "sym").unwrap();
        // now resolve sym's size with something bigger than the gap to `next`
        m.add_range(0, Size::Known(1000), "sym-again").unwrap();
        assert_eq!(m.try_get_size(0), Some(Size::Known(100)));
        assert_eq!(m.try_get_label(0), Some("sym"));
    }

    #[test]
    fn overflow_rejected() {
        let mut m = RangeMap::new();
        let err = m.add_range(u64::MAX - 1, Size::Known(10), "x");
        assert!(err.is_err());
    }

    #[test]
    fn compress_merges_identical_labels() {
        let mut m = RangeMap::new();
        m.add_range(0, Size::Known(5), "x").unwrap();
        m.add_range(5, Size::Known(5), "x").unwrap();
        m.compress();
        assert_eq!(m.len(), 1);
        assert_eq!(m.try_get_size(0), Some(Size::Known(10)));
    }

    #[test]
    fn compress_absorbs_short_fallback_into_preceding_real_label() {
        let mut m = RangeMap::new();
        m.add_range(0, Size::Known(100), "real").unwrap();
        m.add_range(100, Size::Known(4), "[Unmapped]").unwrap();
        m.compress();
        assert_eq!(m.len(), 1);
        assert_eq!(m.try_get_label(101), Some("real"));
    }

    #[test]
    fn compress_does_not_absorb_long_fallback() {
        let mut m = RangeMap::new();
        m.add_range(0, Size::Known(100), "real").unwrap();
        m.add_range(100, Size::Known(64), "[Unmapped]").unwrap();
        m.compress();
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn dual_range_translation_round_trips() {
        let mut vm = RangeMap::new();
        let mut file = RangeMap::new();
        vm.add_dual_range(0x1000, Size::Known(16), Some(0x200), "seg")
            .unwrap();
        file.add_dual_range(0x200, Size::Known(16), Some(0x1000), "seg")
            .unwrap();
        for k in 0..16u64 {
            assert_eq!(vm.translate(0x1000 + k), Some(0x200 + k));
            assert_eq!(file.translate(0x200 + k), Some(0x1000 + k));
        }
    }

    #[test]
    fn add_range_with_translation_reports_full_coverage() {
        let mut translator_vm = RangeMap::new();
        let mut translator_file = RangeMap::new();
        translator_vm
            .add_dual_range(0, Size::Known(100), Some(1000), "seg")
            .unwrap();
        translator_file
            .add_dual_range(1000, Size::Known(100), Some(0), "seg")
            .unwrap();

        let mut self_map = RangeMap::new();
        let mut other_map = RangeMap::new();
        let full = self_map
            .add_range_with_translation(0, 50, "sym", &translator_vm, &mut other_map)
            .unwrap();
        assert!(full);
        assert_eq!(other_map.try_get_label(1000), Some("sym"));

        let partial = self_map
            .add_range_with_translation(90, 50, "tail", &translator_vm, &mut other_map)
            .unwrap();
        assert!(!partial); // only [90,100) of translator is covered
    }

    #[test]
    fn covers_range_detects_gaps() {
        let mut m = RangeMap::new();
        m.add_range(0, Size::Known(10), "a").unwrap();
        m.add_range(20, Size::Known(10), "b").unwrap();
        assert!(m.covers_range(0, 10));
        assert!(!m.covers_range(0, 20));
        assert!(m.covers_range(20, 10));
    }
}
