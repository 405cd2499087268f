//! Cursor navigation: a pointer plus a pivot marking the far corner of the
//! last write.
//!
//! `move_right`/`move_down` step past the pivot rather than the pointer, so a
//! write spanning several rows or columns is never overlapped by the next
//! sequential write.

use crate::spec::{SheetError, SpecCellCoord};
use crate::util::{offset_cell_coord, parse_cell_address, validate_cell_coord};

/// Pointer/pivot pair driving sequential authoring commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Navigator {
    pointer: SpecCellCoord,
    pivot: SpecCellCoord,
}

impl Navigator {
    /// Navigator at `A1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write/read position.
    pub fn pointer(&self) -> SpecCellCoord {
        self.pointer
    }

    /// Bottom-right-most cell touched by the last write.
    pub fn pivot(&self) -> SpecCellCoord {
        self.pivot
    }

    /// Jump to `(row, col)` and reset the pivot.
    pub fn go_to(&mut self, row: i64, col: i64) -> Result<SpecCellCoord, SheetError> {
        if row < 0 || col < 0 {
            return Err(SheetError::InvalidCoordinate(format!(
                "negative coordinate ({row}, {col})"
            )));
        }
        let coord = validate_cell_coord(row as usize, col as usize)?;
        self.set(coord);
        Ok(coord)
    }

    /// Jump to an A1-style address and reset the pivot.
    pub fn go_to_address(&mut self, address: &str) -> Result<SpecCellCoord, SheetError> {
        let coord = parse_cell_address(address)?;
        self.set(coord);
        Ok(coord)
    }

    /// Step one column past the pointer or the pivot, whichever is further right.
    pub fn move_right(&mut self) -> Result<SpecCellCoord, SheetError> {
        self.move_right_by(1)
    }

    /// `move_right` once, then `n - 1` plain columns. `n == 0` is a no-op.
    pub fn move_right_by(&mut self, n: usize) -> Result<SpecCellCoord, SheetError> {
        if n == 0 {
            return Ok(self.pointer);
        }
        let n_col_far = usize::max(self.pointer.col, self.pivot.col);
        let coord = offset_cell_coord(SpecCellCoord::new(self.pointer.row, n_col_far), 0, n)?;
        self.set(coord);
        Ok(coord)
    }

    /// Step one row past the pointer or the pivot, whichever is further down.
    pub fn move_down(&mut self) -> Result<SpecCellCoord, SheetError> {
        self.move_down_by(1)
    }

    /// `move_down` once, then `n - 1` plain rows. `n == 0` is a no-op.
    pub fn move_down_by(&mut self, n: usize) -> Result<SpecCellCoord, SheetError> {
        if n == 0 {
            return Ok(self.pointer);
        }
        let n_row_far = usize::max(self.pointer.row, self.pivot.row);
        let coord = offset_cell_coord(SpecCellCoord::new(n_row_far, self.pointer.col), n, 0)?;
        self.set(coord);
        Ok(coord)
    }

    /// Jump to column 0 of `row_next_unused`.
    pub fn enter(&mut self, row_next_unused: usize) -> Result<SpecCellCoord, SheetError> {
        let coord = validate_cell_coord(row_next_unused, 0)?;
        self.set(coord);
        Ok(coord)
    }

    /// `enter` then `n - 1` more rows. `n == 0` is a no-op.
    pub fn enter_by(&mut self, row_next_unused: usize, n: usize) -> Result<SpecCellCoord, SheetError> {
        if n == 0 {
            return Ok(self.pointer);
        }
        let coord = offset_cell_coord(SpecCellCoord::new(row_next_unused, 0), n - 1, 0)?;
        self.set(coord);
        Ok(coord)
    }

    /// Advance the pivot over a `row_span` x `col_span` write anchored at the pointer.
    pub fn extend_pivot(&mut self, row_span: usize, col_span: usize) -> Result<(), SheetError> {
        self.pivot = offset_cell_coord(
            self.pointer,
            row_span.saturating_sub(1),
            col_span.saturating_sub(1),
        )?;
        Ok(())
    }

    /// Place the pointer at `origin` and the pivot at `corner` (block writes).
    pub(crate) fn set_block(&mut self, origin: SpecCellCoord, corner: SpecCellCoord) {
        self.pointer = origin;
        self.pivot = SpecCellCoord::new(
            usize::max(origin.row, corner.row),
            usize::max(origin.col, corner.col),
        );
    }

    fn set(&mut self, coord: SpecCellCoord) {
        self.pointer = coord;
        self.pivot = coord;
    }
}
