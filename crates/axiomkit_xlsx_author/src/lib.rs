//! `axiomkit_xlsx_author` v1:
//! Declarative XLSX authoring kernel.
//!
//! Architecture:
//! - `conf`     : constants and default presets
//! - `spec`     : specs/models/options
//! - `util`     : pure helper functions
//! - `pointer`  : cursor/pivot navigation
//! - `style`    : fragment layering and identity-keyed style cache
//! - `document` : in-memory workbook backed by `rust_xlsxwriter`/`calamine`
//! - `mapping`  : field registry, column builder and sheet template
//! - `flatten`  : nested one-to-many row flattening
//! - `merge`    : run-length merge tracking
//! - `writer`   : writer session and sheet cursor
//! - `reader`   : read-back into typed records
pub mod conf;
pub mod document;
pub mod flatten;
pub mod mapping;
pub mod merge;
pub mod pointer;
pub mod reader;
pub mod spec;
pub mod style;
pub mod util;
pub mod writer;

pub use conf::{
    C_COLUMN_TITLE_PREFIX, C_DATE_PATTERN_DEFAULT, N_BORDER_LINE_MAX, N_FONT_SIZE_MAX,
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
    derive_default_author_fragments, derive_default_author_options, derive_default_author_styles,
};
pub use document::{SheetDocument, XlsxDocument};
pub use flatten::{ExpandFn, FlatRow, RowFlattener, SpecFlattenOutcome, derive_expand_fn};
pub use mapping::{
    ColumnBuilder, CompiledTemplate, FieldRegistry, FromCellValue, SheetRecord, SheetTemplate,
};
pub use merge::MergeTracker;
pub use pointer::Navigator;
pub use reader::read_records;
pub use spec::{
    EnumAutofitColumnsRule, EnumBorderPosition, EnumCellType, EnumCellValue, EnumFailureKind,
    EnumHorizontalAlign, EnumVerticalAlign, SheetError, SheetId, SpecAuthorOptions,
    SpecAutofitCellsPolicy, SpecBorderSide, SpecCellCoord, SpecCellFailure, SpecCellRead,
    SpecCellStyle, SpecDefaultStyles, SpecMergedRegion, SpecReadOutcome, SpecStyleAttrs,
    SpecWriteReport, StyleHandle, StyleId,
};
pub use style::{StyleCache, StyleRenderer, layer, layer_all};
pub use util::{derive_cell_address, parse_cell_address, sanitize_sheet_name};
pub use writer::{SheetCursor, SpecCellContent, XlsxWriter};
