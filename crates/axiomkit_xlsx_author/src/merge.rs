//! Single-pass run-length merge tracking.
//!
//! One tracker lives for one write pass. Each observed row either grows the
//! pending run of its column or flushes it; only runs spanning two or more rows
//! become merged regions. Equal values separated by a different value are
//! never merged together.

use std::collections::BTreeMap;

use crate::spec::{EnumCellValue, SpecMergedRegion};

#[derive(Debug, Clone, PartialEq)]
struct SpecMergeRun {
    value: EnumCellValue,
    row_from: usize,
    row_to: usize,
}

impl SpecMergeRun {
    fn start(value: EnumCellValue, row: usize) -> Self {
        Self {
            value,
            row_from: row,
            row_to: row,
        }
    }

    fn derive_region(&self, col: usize) -> Option<SpecMergedRegion> {
        (self.row_to > self.row_from).then_some(SpecMergedRegion {
            row_from: self.row_from,
            row_to: self.row_to,
            col_from: col,
            col_to: col,
        })
    }
}

/// Per-column run trackers for one write pass.
#[derive(Debug, Default)]
pub struct MergeTracker {
    dict_runs: BTreeMap<usize, SpecMergeRun>,
}

impl MergeTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the comparison key of `col` at `row`.
    ///
    /// Returns the region to merge when a run closes: on a key change (the
    /// pending run is flushed before the new one starts), or on the last row
    /// of the pass while a run is still growing.
    pub fn observe(
        &mut self,
        col: usize,
        key: EnumCellValue,
        row: usize,
        if_last: bool,
    ) -> Option<SpecMergedRegion> {
        let Some(run) = self.dict_runs.get_mut(&col) else {
            self.dict_runs.insert(col, SpecMergeRun::start(key, row));
            return None;
        };

        if run.value == key {
            run.row_to = row;
            if if_last {
                let region = run.derive_region(col);
                *run = SpecMergeRun::start(key, row);
                return region;
            }
            return None;
        }

        let region = run.derive_region(col);
        *run = SpecMergeRun::start(key, row);
        region
    }

    /// Number of columns currently tracked.
    pub fn column_count(&self) -> usize {
        self.dict_runs.len()
    }
}
