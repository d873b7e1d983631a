//! N-way lockstep walk over a set of range maps, the core of the Rollup
//! engine's "merge N DualMaps along the address axis" operation
//! (spec.md §4.3). Generalizes the teacher `rle` crate's pairwise
//! `rle_zip`/`rle_zip3` (zip two or three run-length iterators, handing the
//! caller the overlap of whichever runs are shortest) into an N-way walk
//! that additionally treats `maps[0]` as authoritative: every other map's
//! range must lie within the extent `maps[0]` has already claimed.

use crate::address::Address;
use crate::error::{RangeMapError, Result};
use crate::map::RangeMap;

/// Walks `maps` in lockstep along the address axis. For each maximal
/// sub-interval `[start, end)` over which every map's label selection is
/// stable, calls `emit(labels, start, end)` where `labels[i]` is:
/// - the label of `maps[i]`'s entry at this position, if one covers it;
/// - `None` if `maps[i]` (for `i > 0`) has a gap here.
///
/// `maps[0]` (the base map) must fully cover every byte the other maps
/// claim; violating that is a semantic error (spec.md §4.3 step 1/2).
pub fn lockstep_walk<'a>(
    maps: &[&'a RangeMap],
    mut emit: impl FnMut(&[Option<&'a str>], Address, Address) -> Result<()>,
) -> Result<()> {
    let n = maps.len();
    if n == 0 {
        return Ok(());
    }
    let mut idx = vec![0usize; n];

    loop {
        if idx[0] >= maps[0].len() {
            for i in 1..n {
                if idx[i] < maps[i].len() {
                    return Err(RangeMapError::new(
                        "lockstep_walk",
                        "range extends beyond base map",
                    ));
                }
            }
            return Ok(());
        }

        let current = maps[0].entries()[idx[0]].start;
        let mut labels: Vec<Option<&str>> = Vec::with_capacity(n);
        labels.push(Some(&maps[0].entries()[idx[0]].label));

        for i in 1..n {
            if idx[i] >= maps[i].len() {
                labels.push(None);
                continue;
            }
            let e = &maps[i].entries()[idx[i]];
            if e.start == current {
                labels.push(Some(&e.label));
            } else if e.start > current {
                labels.push(None);
            } else {
                return Err(RangeMapError::new(
                    "lockstep_walk",
                    "range starts before base map",
                ));
            }
        }

        let mut next_break = maps[0].effective_end(idx[0]);
        for i in 1..n {
            if idx[i] >= maps[i].len() {
                continue;
            }
            let e = &maps[i].entries()[idx[i]];
            if e.start == current {
                next_break = next_break.min(maps[i].effective_end(idx[i]));
            } else if e.start > current {
                next_break = next_break.min(e.start);
            }
        }

        emit(&labels, current, next_break)?;

        if maps[0].effective_end(idx[0]) == next_break {
            idx[0] += 1;
        }
        for i in 1..n {
            if idx[i] >= maps[i].len() {
                continue;
            }
            let e = &maps[i].entries()[idx[i]];
            if e.start == current && maps[i].effective_end(idx[i]) == next_break {
                idx[i] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Size;

    #[test]
    fn two_map_walk_reports_gaps_as_none() {
        let mut base = RangeMap::new();
        base.add_range(0, Size::Known(30), "all").unwrap();
        let mut secondary = RangeMap::new();
        secondary.add_range(10, Size::Known(10), "mid").unwrap();

        let maps: Vec<&RangeMap> = vec![&base, &secondary];
        let mut events = Vec::new();
        lockstep_walk(&maps, |labels, start, end| {
            events.push((labels.to_vec(), start, end));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            events,
            vec![
                (vec![Some("all"), None], 0, 10),
                (vec![Some("all"), Some("mid")], 10, 20),
                (vec![Some("all"), None], 20, 30),
            ]
        );
    }

    #[test]
    fn secondary_extending_past_base_is_an_error() {
        let mut base = RangeMap::new();
        base.add_range(0, Size::Known(10), "all").unwrap();
        let mut secondary = RangeMap::new();
        secondary.add_range(0, Size::Known(20), "oops").unwrap();

        let maps: Vec<&RangeMap> = vec![&base, &secondary];
        let result = lockstep_walk(&maps, |_, _, _| Ok(()));
        assert!(result.is_err());
    }
}
