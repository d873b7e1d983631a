use rangemap_core::{Address, RangeMap, Size};

use crate::error::Result;

/// A paired `RangeMap` over the file-offset domain and the VM-address
/// domain (spec.md §3 "DualMap"). The base `DualMap` defines the
/// file⇄VM correspondence for one input file; every other `DualMap`
/// translates against it.
#[derive(Clone, Debug, Default)]
pub struct DualMap {
    pub vm_map: RangeMap,
    pub file_map: RangeMap,
}

impl DualMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base-map population: splits `[vmaddr, vmaddr+vmsize)` and
    /// `[fileoff, fileoff+filesize)` into their common dual-mapped prefix
    /// plus whatever VM-only (BSS-like) or file-only (debug-only) tail
    /// remains, per spec.md §4.2.
    pub fn add_range(
        &mut self,
        label: &str,
        vmaddr: Option<Address>,
        vmsize: u64,
        fileoff: Option<Address>,
        filesize: u64,
    ) -> Result<()> {
        match (vmaddr, fileoff) {
            (Some(va), Some(fo)) => {
                let common = vmsize.min(filesize);
                if common > 0 {
                    self.vm_map.add_dual_range(va, Size::Known(common), Some(fo), label)?;
                    self.file_map.add_dual_range(fo, Size::Known(common), Some(va), label)?;
                }
                if vmsize > common {
                    self.vm_map.add_range(va + common, Size::Known(vmsize - common), label)?;
                }
                if filesize > common {
                    self.file_map.add_range(fo + common, Size::Known(filesize - common), label)?;
                }
            }
            (Some(va), None) => {
                if vmsize > 0 {
                    self.vm_map.add_range(va, Size::Known(vmsize), label)?;
                }
            }
            (None, Some(fo)) => {
                if filesize > 0 {
                    self.file_map.add_range(fo, Size::Known(filesize), label)?;
                }
            }
            (None, None) => {}
        }
        Ok(())
    }

    pub fn compress(&mut self) {
        self.vm_map.compress();
        self.file_map.compress();
    }

    /// Sweeps whatever real segments/sections didn't claim in the file
    /// domain: `[0, header_end)` becomes `header_label`, and anything
    /// still uncovered up to `total_size` becomes `unmapped_label`
    /// (spec.md §4.4 "front-end contracts" — every base map must fully
    /// cover `[0, filesize)`). `RangeMap::add_range` only inserts into
    /// gaps, so bytes a real section already claimed are left alone.
    pub fn fill_unmapped_file_gaps(
        &mut self,
        total_size: u64,
        header_end: u64,
        header_label: &str,
        unmapped_label: &str,
    ) -> Result<()> {
        if header_end > 0 {
            self.file_map.add_range(0, Size::Known(header_end.min(total_size)), header_label)?;
        }
        if total_size > 0 {
            self.file_map.add_range(0, Size::Known(total_size), unmapped_label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_range_round_trips_file_and_vm() {
        let mut m = DualMap::new();
        m.add_range("seg", Some(0x1000), 20, Some(0x100), 20).unwrap();
        for k in 0..20u64 {
            assert_eq!(m.vm_map.translate(0x1000 + k), Some(0x100 + k));
            assert_eq!(m.file_map.translate(0x100 + k), Some(0x1000 + k));
        }
    }

    #[test]
    fn bss_like_tail_is_vm_only() {
        let mut m = DualMap::new();
        m.add_range(".bss", Some(0x2000), 16, Some(0x200), 4).unwrap();
        assert_eq!(m.vm_map.try_get_label(0x2000), Some(".bss"));
        assert_eq!(m.vm_map.try_get_label(0x2000 + 8), Some(".bss"));
        assert!(m.vm_map.translate(0x2000 + 8).is_none());
        assert_eq!(m.file_map.try_get_size(0x200), Some(Size::Known(4)));
    }

    #[test]
    fn debug_only_tail_is_file_only() {
        let mut m = DualMap::new();
        m.add_range(".debug_info", None, 0, Some(0x500), 32).unwrap();
        assert!(m.vm_map.is_empty());
        assert_eq!(m.file_map.try_get_size(0x500), Some(Size::Known(32)));
    }
}
