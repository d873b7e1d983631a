//! Hierarchical size-attribution tree (spec.md §4.3 "Rollup").
//!
//! Built from an N-way lockstep walk over the per-source `DualMap`s: every
//! input range contributes one row per level, nested the way `-d` stacks
//! data sources. Percentages, sort/truncate/`[N Others]` collapse, and
//! diff-mode subtraction all act on this tree after it's built.

use std::collections::HashMap;

use rangemap_core::{lockstep_walk, RangeMap};
use regex::Regex;

use crate::dualmap::DualMap;
use crate::error::Result;

/// One level of the rollup: rows keyed by label, in first-seen order so
/// sort can be stable before it's applied.
#[derive(Clone, Debug, Default)]
pub struct Rollup {
    pub rows: Vec<RollupRow>,
    pub vm_total: u64,
    pub file_total: u64,
}

#[derive(Clone, Debug)]
pub struct RollupRow {
    pub label: String,
    pub vm_size: i64,
    pub file_size: i64,
    pub children: Option<Rollup>,
    /// Diff-mode annotation: `[NEW]`, `[DEL]`, or unset for unchanged/normal rows.
    pub diff_status: Option<DiffStatus>,
}

/// `-s vm|file|both` sort key (spec.md §6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SortKey {
    Vm,
    File,
    Both,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vm" => Some(Self::Vm),
            "file" => Some(Self::File),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiffStatus {
    New,
    Deleted,
}

/// Adds `size` to the row named `labels[0]` at `level`, recursing into
/// that row's children for `labels[1..]` so one lockstep-walk callback
/// contributes to every nested level at once.
fn insert_chain(level: &mut Rollup, labels: &[Option<&str>], size: u64, vm: bool) {
    let label = labels.first().copied().flatten().unwrap_or("[none]").to_string();
    let idx = match level.rows.iter().position(|r| r.label == label) {
        Some(i) => i,
        None => {
            level.rows.push(RollupRow {
                label,
                vm_size: 0,
                file_size: 0,
                children: None,
                diff_status: None,
            });
            level.rows.len() - 1
        }
    };
    let row = &mut level.rows[idx];
    if vm {
        row.vm_size += size as i64;
    } else {
        row.file_size += size as i64;
    }
    if labels.len() > 1 {
        let children = row.children.get_or_insert_with(Rollup::default);
        insert_chain(children, &labels[1..], size, vm);
    }
}

/// Recomputes `vm_total`/`file_total` at every level from its own rows.
fn finalize_totals(level: &mut Rollup) {
    level.vm_total = level.rows.iter().map(|r| r.vm_size.max(0) as u64).sum();
    level.file_total = level.rows.iter().map(|r| r.file_size.max(0) as u64).sum();
    for row in &mut level.rows {
        if let Some(children) = &mut row.children {
            finalize_totals(children);
        }
    }
}

impl Rollup {
    /// Builds the full nested tree for one domain: `base` is the
    /// authoritative map every `sources` range must fall within (the
    /// lockstep walk's `maps[0]`), and `sources` is the per-data-source
    /// list in the order `-d` named them. Row nesting mirrors the
    /// source order — `sources[0]`'s label is the top-level row,
    /// `sources[1]`'s label (if any) becomes its child row, and so on
    /// (spec.md §4.3 "Tree construction").
    pub fn build_level(base: &DualMap, sources: &[&DualMap], vm: bool) -> Result<Rollup> {
        let base_map: &RangeMap = if vm { &base.vm_map } else { &base.file_map };
        let mut range_maps: Vec<&RangeMap> = Vec::with_capacity(sources.len() + 1);
        range_maps.push(base_map);
        for source in sources {
            range_maps.push(if vm { &source.vm_map } else { &source.file_map });
        }

        let mut root = Rollup::default();
        lockstep_walk(&range_maps, |labels, start, end| {
            let sz = end.saturating_sub(start);
            if sz > 0 {
                insert_chain(&mut root, &labels[1..], sz, vm);
            }
            Ok(())
        })?;
        finalize_totals(&mut root);
        Ok(root)
    }

    /// Merges a file-domain tree into the same rows a vm-domain tree
    /// already produced, by label, recursing into matching children so
    /// nested levels get file sizes too (spec.md §4.3).
    pub fn merge_file_level(&mut self, file_level: &Rollup) {
        for row in &file_level.rows {
            match self.rows.iter_mut().find(|r| r.label == row.label) {
                Some(existing) => {
                    existing.file_size = row.file_size;
                    match (&mut existing.children, &row.children) {
                        (Some(ec), Some(rc)) => ec.merge_file_level(rc),
                        (None, Some(rc)) => existing.children = Some(rc.clone()),
                        _ => {}
                    }
                }
                None => self.rows.push(row.clone()),
            }
        }
        self.file_total = file_level.file_total;
    }

    /// Descending sort by vm_size (ties broken by file_size), as `bloaty`
    /// prints by default.
    pub fn sort_by_size(&mut self) {
        self.sort_by_key(SortKey::Vm);
    }

    /// Descending sort by the given key (spec.md §6 `-s vm|file|both`),
    /// ties broken by the other size so ordering stays total.
    pub fn sort_by_key(&mut self, key: SortKey) {
        self.rows.sort_by(|a, b| match key {
            SortKey::Vm => b
                .vm_size
                .cmp(&a.vm_size)
                .then_with(|| b.file_size.cmp(&a.file_size)),
            SortKey::File => b
                .file_size
                .cmp(&a.file_size)
                .then_with(|| b.vm_size.cmp(&a.vm_size)),
            SortKey::Both => b
                .vm_size
                .max(b.file_size)
                .cmp(&a.vm_size.max(a.file_size))
                .then_with(|| b.vm_size.cmp(&a.vm_size)),
        });
        for row in &mut self.rows {
            if let Some(children) = &mut row.children {
                children.sort_by_key(key);
            }
        }
    }

    /// Keeps the top `n` rows and collapses the rest into a single
    /// `[N Others]` row (spec.md §4.4), at every level.
    pub fn truncate(&mut self, n: usize) {
        if self.rows.len() > n {
            let rest = self.rows.split_off(n);
            let count = rest.len();
            let vm_size: i64 = rest.iter().map(|r| r.vm_size).sum();
            let file_size: i64 = rest.iter().map(|r| r.file_size).sum();
            self.rows.push(RollupRow {
                label: format!("[{count} Others]"),
                vm_size,
                file_size,
                children: None,
                diff_status: None,
            });
        }
        for row in &mut self.rows {
            if let Some(children) = &mut row.children {
                children.truncate(n);
            }
        }
    }

    /// Drops rows whose label doesn't match `pattern`, recomputing
    /// filtered totals (spec.md §6 `--source-filter`).
    pub fn apply_source_filter(&mut self, pattern: &Regex) {
        self.rows.retain(|r| pattern.is_match(&r.label));
        self.vm_total = self.rows.iter().map(|r| r.vm_size.max(0) as u64).sum();
        self.file_total = self.rows.iter().map(|r| r.file_size.max(0) as u64).sum();
        for row in &mut self.rows {
            if let Some(children) = &mut row.children {
                children.apply_source_filter(pattern);
            }
        }
    }

    /// Subtracts `baseline` from `self` row-by-row (matched by label),
    /// producing `[NEW]`/`[DEL]` rows for labels present on only one
    /// side, grounded on the teacher `rle` crate's subtract primitive
    /// generalized from run-subtraction to a by-label diff (spec.md §6
    /// `--diff`).
    pub fn diff_against(&self, baseline: &Rollup) -> Rollup {
        let mut by_label: HashMap<&str, &RollupRow> =
            baseline.rows.iter().map(|r| (r.label.as_str(), r)).collect();
        let mut rows = Vec::new();

        for row in &self.rows {
            match by_label.remove(row.label.as_str()) {
                Some(base_row) => {
                    let vm_delta = row.vm_size - base_row.vm_size;
                    let file_delta = row.file_size - base_row.file_size;
                    let children = match (&row.children, &base_row.children) {
                        (Some(a), Some(b)) => Some(a.diff_against(b)),
                        (Some(a), None) => Some(a.clone()),
                        _ => None,
                    };
                    rows.push(RollupRow {
                        label: row.label.clone(),
                        vm_size: vm_delta,
                        file_size: file_delta,
                        children,
                        diff_status: None,
                    });
                }
                None => rows.push(RollupRow {
                    label: row.label.clone(),
                    vm_size: row.vm_size,
                    file_size: row.file_size,
                    children: row.children.clone(),
                    diff_status: Some(DiffStatus::New),
                }),
            }
        }
        for (label, base_row) in by_label {
            rows.push(RollupRow {
                label: label.to_string(),
                vm_size: -base_row.vm_size,
                file_size: -base_row.file_size,
                children: base_row.children.clone(),
                diff_status: Some(DiffStatus::Deleted),
            });
        }

        let vm_total = self.vm_total as i64 - baseline.vm_total as i64;
        let file_total = self.file_total as i64 - baseline.file_total as i64;
        Rollup {
            rows,
            vm_total: vm_total.unsigned_abs(),
            file_total: file_total.unsigned_abs(),
        }
    }

    pub fn vm_percent(&self, row: &RollupRow) -> f64 {
        if self.vm_total == 0 {
            0.0
        } else {
            row.vm_size as f64 / self.vm_total as f64 * 100.0
        }
    }

    pub fn file_percent(&self, row: &RollupRow) -> f64 {
        if self.file_total == 0 {
            0.0
        } else {
            row.file_size as f64 / self.file_total as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangemap_core::Size;

    fn map_with(entries: &[(u64, u64, &str)]) -> DualMap {
        let mut m = DualMap::new();
        for (start, size, label) in entries {
            m.vm_map.add_range(*start, Size::Known(*size), label).unwrap();
        }
        m
    }

    #[test]
    fn build_level_sums_by_label() {
        let m = map_with(&[(0, 10, ".text"), (10, 5, ".text"), (15, 8, ".data")]);
        let rollup = Rollup::build_level(&m, &[&m], true).unwrap();
        assert_eq!(rollup.vm_total, 23);
        let text = rollup.rows.iter().find(|r| r.label == ".text").unwrap();
        assert_eq!(text.vm_size, 15);
    }

    #[test]
    fn build_level_nests_second_source_under_first() {
        let segments = map_with(&[(0, 20, "LOAD#1")]);
        let symbols = map_with(&[(0, 12, "foo"), (12, 8, "bar")]);
        let rollup = Rollup::build_level(&segments, &[&segments, &symbols], true).unwrap();
        let seg_row = rollup.rows.iter().find(|r| r.label == "LOAD#1").unwrap();
        assert_eq!(seg_row.vm_size, 20);
        let children = seg_row.children.as_ref().expect("nested children");
        assert_eq!(children.rows.len(), 2);
        let foo = children.rows.iter().find(|r| r.label == "foo").unwrap();
        assert_eq!(foo.vm_size, 12);
    }

    #[test]
    fn truncate_collapses_into_others_row() {
        let m = map_with(&[(0, 10, "a"), (10, 10, "b"), (20, 10, "c"), (30, 10, "d")]);
        let mut rollup = Rollup::build_level(&m, &[&m], true).unwrap();
        rollup.sort_by_size();
        rollup.truncate(2);
        assert_eq!(rollup.rows.len(), 3);
        assert_eq!(rollup.rows[2].label, "[2 Others]");
    }

    #[test]
    fn diff_marks_new_and_deleted_rows() {
        let base = map_with(&[(0, 10, "a"), (10, 10, "b")]);
        let now = map_with(&[(0, 10, "a"), (20, 10, "c")]);
        let base_roll = Rollup::build_level(&base, &[&base], true).unwrap();
        let now_roll = Rollup::build_level(&now, &[&now], true).unwrap();
        let diff = now_roll.diff_against(&base_roll);

        let a = diff.rows.iter().find(|r| r.label == "a").unwrap();
        assert_eq!(a.vm_size, 0);
        assert!(a.diff_status.is_none());

        let b = diff.rows.iter().find(|r| r.label == "b").unwrap();
        assert_eq!(b.diff_status, Some(DiffStatus::Deleted));
        assert_eq!(b.vm_size, -10);

        let c = diff.rows.iter().find(|r| r.label == "c").unwrap();
        assert_eq!(c.diff_status, Some(DiffStatus::New));
        assert_eq!(c.vm_size, 10);
    }

    #[test]
    fn source_filter_keeps_only_matching_rows() {
        let m = map_with(&[(0, 10, ".text"), (10, 10, ".debug_info")]);
        let mut rollup = Rollup::build_level(&m, &[&m], true).unwrap();
        let pattern = Regex::new(r"^\.text$").unwrap();
        rollup.apply_source_filter(&pattern);
        assert_eq!(rollup.rows.len(), 1);
        assert_eq!(rollup.vm_total, 10);
    }
}
