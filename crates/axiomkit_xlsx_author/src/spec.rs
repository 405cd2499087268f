//! Shared authoring specification models: values, style fragments, options,
//! reports and errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region CellValueSpecification

/// Normalized cell value moving between records, the engine and the document.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EnumCellValue {
    /// Missing/blank value.
    #[default]
    None,
    /// Text value.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Boolean(bool),
    /// Date/time value, rendered with a date number format.
    Date(NaiveDateTime),
    /// Formula text without the leading `=`. Stored, never evaluated.
    Formula(String),
}

impl EnumCellValue {
    /// Whether the value is blank.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether the value is a date.
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Plain display text used for headers and width estimation.
    pub fn to_display_text(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Text(val) => val.clone(),
            Self::Number(val) => {
                if val.fract() == 0.0 && val.abs() < 1e15 {
                    format!("{}", *val as i64)
                } else {
                    val.to_string()
                }
            }
            Self::Boolean(val) => if *val { "TRUE" } else { "FALSE" }.to_string(),
            Self::Date(val) => val.format("%Y-%m-%d %H:%M:%S").to_string(),
            Self::Formula(val) => format!("={val}"),
        }
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&String> for EnumCellValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for EnumCellValue {
    fn from(value: f32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i64> for EnumCellValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for EnumCellValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u32> for EnumCellValue {
    fn from(value: u32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u64> for EnumCellValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for EnumCellValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for EnumCellValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<NaiveDateTime> for EnumCellValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDate> for EnumCellValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value.and_time(chrono::NaiveTime::MIN))
    }
}

impl<V: Into<EnumCellValue>> From<Option<V>> for EnumCellValue {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

/// Declared cell-type tag reported by the document when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCellType {
    /// Text cell.
    Text,
    /// Numeric cell (dates included).
    Numeric,
    /// Boolean cell.
    Boolean,
    /// Formula cell.
    Formula,
    /// Empty cell.
    Blank,
}

/// One cell as read back from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecCellRead {
    /// Declared cell type.
    pub cell_type: EnumCellType,
    /// Typed value.
    pub value: EnumCellValue,
}

impl SpecCellRead {
    /// Blank cell.
    pub fn blank() -> Self {
        Self {
            cell_type: EnumCellType::Blank,
            value: EnumCellValue::None,
        }
    }

    /// Derive the declared type tag from a value.
    pub fn from_value(value: EnumCellValue) -> Self {
        let cell_type = match &value {
            EnumCellValue::None => EnumCellType::Blank,
            EnumCellValue::Text(_) => EnumCellType::Text,
            EnumCellValue::Number(_) | EnumCellValue::Date(_) => EnumCellType::Numeric,
            EnumCellValue::Boolean(_) => EnumCellType::Boolean,
            EnumCellValue::Formula(_) => EnumCellType::Formula,
        };
        Self { cell_type, value }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CoordinateSpecification

/// Zero-based cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SpecCellCoord {
    /// Zero-based row index.
    pub row: usize,
    /// Zero-based column index.
    pub col: usize,
}

impl SpecCellCoord {
    /// Build a coordinate.
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Inclusive rectangular merged region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecMergedRegion {
    /// First row (inclusive).
    pub row_from: usize,
    /// Last row (inclusive).
    pub row_to: usize,
    /// First column (inclusive).
    pub col_from: usize,
    /// Last column (inclusive).
    pub col_to: usize,
}

impl SpecMergedRegion {
    /// Whether the region covers `(row, col)`.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.row_from..=self.row_to).contains(&row) && (self.col_from..=self.col_to).contains(&col)
    }

    /// Whether the region is a single cell.
    pub fn is_single_cell(&self) -> bool {
        self.row_from == self.row_to && self.col_from == self.col_to
    }
}

/// Opaque sheet handle issued by a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SheetId(pub usize);

/// Opaque rendered-style handle issued by a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleHandle(pub usize);

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StyleSpecification

/// Horizontal alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumHorizontalAlign {
    /// General (numbers right, text left).
    General,
    /// Left.
    Left,
    /// Center.
    Center,
    /// Right.
    Right,
    /// Fill.
    Fill,
    /// Justify.
    Justify,
}

/// Vertical alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumVerticalAlign {
    /// Top.
    Top,
    /// Center.
    Center,
    /// Bottom.
    Bottom,
}

/// Which side of the cell a border applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumBorderPosition {
    /// Top edge.
    Top,
    /// Bottom edge.
    Bottom,
    /// Left edge.
    Left,
    /// Right edge.
    Right,
}

/// One border side: position, line style index and optional color.
///
/// Line style indices follow the xlsxwriter numbering (`0` none, `1` thin,
/// `2` medium, `5` thick, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecBorderSide {
    /// Edge.
    pub position: EnumBorderPosition,
    /// Line style index.
    pub line: i64,
    /// Border color in hex (`#RRGGBB`).
    pub color: Option<String>,
}

impl SpecBorderSide {
    /// Border side without explicit color.
    pub fn new(position: EnumBorderPosition, line: i64) -> Self {
        Self {
            position,
            line,
            color: None,
        }
    }

    /// Same four sides with one line style.
    pub fn all(line: i64) -> Vec<Self> {
        [
            EnumBorderPosition::Top,
            EnumBorderPosition::Bottom,
            EnumBorderPosition::Left,
            EnumBorderPosition::Right,
        ]
        .into_iter()
        .map(|position| Self::new(position, line))
        .collect()
    }
}

/// Sparse visual attributes. `None` means "inherit from the layer beneath".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecStyleAttrs {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,
    /// Single underline.
    pub underline: Option<bool>,

    /// Marks the style as a date style.
    pub date: Option<bool>,
    /// Date number format pattern, used when `date` is set.
    pub date_pattern: Option<String>,
    /// Generic number format code.
    pub num_format: Option<String>,

    /// Font color in hex.
    pub font_color: Option<String>,
    /// Background fill color in hex.
    pub bg_color: Option<String>,

    /// Horizontal alignment.
    pub align: Option<EnumHorizontalAlign>,
    /// Vertical alignment.
    pub valign: Option<EnumVerticalAlign>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Ordered border sides. Replaced wholesale when layered.
    pub borders: Option<Vec<SpecBorderSide>>,
}

impl SpecStyleAttrs {
    /// Whether no attribute is specified.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Identity token of a style fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleId(u64);

impl StyleId {
    fn next() -> Self {
        static N_STYLE_ID_NEXT: AtomicU64 = AtomicU64::new(1);
        Self(N_STYLE_ID_NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw token value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Immutable style fragment.
///
/// Every constructor and `with_*` helper issues a fresh [`StyleId`]; `clone`
/// keeps the identity because it refers to the same fragment.
#[derive(Debug, Clone)]
pub struct SpecCellStyle {
    id: StyleId,
    attrs: Arc<SpecStyleAttrs>,
}

impl SpecCellStyle {
    /// Create a fragment with a fresh identity.
    pub fn new(attrs: SpecStyleAttrs) -> Self {
        Self {
            id: StyleId::next(),
            attrs: Arc::new(attrs),
        }
    }

    /// Identity token used as cache key.
    pub fn id(&self) -> StyleId {
        self.id
    }

    /// Attribute bag.
    pub fn attrs(&self) -> &SpecStyleAttrs {
        &self.attrs
    }

    /// Return a new fragment by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecStyleAttrs) -> Self {
        Self::new(crate::style::layer(&self.attrs, &patch))
    }

    /// New fragment with bold font.
    pub fn with_bold(&self) -> Self {
        self.with_(SpecStyleAttrs {
            bold: Some(true),
            ..Default::default()
        })
    }

    /// New fragment with background color.
    pub fn with_bg_color(&self, color: &str) -> Self {
        self.with_(SpecStyleAttrs {
            bg_color: Some(color.to_string()),
            ..Default::default()
        })
    }

    /// New fragment marked as date style with `pattern`.
    pub fn with_date_pattern(&self, pattern: &str) -> Self {
        self.with_(SpecStyleAttrs {
            date: Some(true),
            date_pattern: Some(pattern.to_string()),
            ..Default::default()
        })
    }

    /// Whether the fragment marks itself as a date style.
    pub fn is_date(&self) -> bool {
        self.attrs.date.unwrap_or(false)
    }
}

impl From<SpecStyleAttrs> for SpecCellStyle {
    fn from(attrs: SpecStyleAttrs) -> Self {
        Self::new(attrs)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Infer width from header cells only.
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells (default).
    #[default]
    All,
}

/// Autofit policy used when a template enables auto-size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::All,
            height_body_inferred_max: Some(20_000),
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Session-wide authoring options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAuthorOptions {
    /// Autofit policy for templates with auto-size enabled.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Pattern of the built-in date style.
    pub date_pattern_default: String,
    /// Mark anchor cells of value-merged runs as wrapped.
    pub if_wrap_merged_anchor: bool,
}

impl Default for SpecAuthorOptions {
    fn default() -> Self {
        Self {
            policy_autofit: SpecAutofitCellsPolicy::default(),
            date_pattern_default: crate::conf::C_DATE_PATTERN_DEFAULT.to_string(),
            if_wrap_merged_anchor: true,
        }
    }
}

/// Session-wide style fragments used where a template leaves a style unset.
#[derive(Debug, Clone)]
pub struct SpecDefaultStyles {
    /// Header row fragment.
    pub header: SpecCellStyle,
    /// Base fragment of data cells.
    pub data: SpecCellStyle,
    /// Metadata row fragment.
    pub metadata: SpecCellStyle,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Non-fatal failure kinds isolated to one cell, field or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumFailureKind {
    /// Named field did not resolve on the record type.
    UnresolvedField,
    /// Value extraction or conditional style function failed.
    ExtractionFailure,
    /// Expandable field yielded no collection.
    FlattenTypeMismatch,
    /// Cell value could not be converted into the field type.
    ConversionFailure,
}

/// One isolated failure.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecCellFailure {
    /// Failure kind.
    pub kind: EnumFailureKind,
    /// Sheet row, when tied to a cell.
    pub row: Option<usize>,
    /// Sheet column, when tied to a cell.
    pub col: Option<usize>,
    /// Column title or field name.
    pub column: String,
    /// User-facing error text.
    pub message: String,
}

/// Per-write call report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecWriteReport {
    /// Sheet the call wrote to.
    pub sheet_name: String,
    /// First written cell.
    pub origin: SpecCellCoord,
    /// Number of data rows written (flattened leaf rows).
    pub rows_written: usize,
    /// Merged regions requested by the merge tracker.
    pub merges: Vec<SpecMergedRegion>,
    /// Isolated per-cell failures.
    pub failures: Vec<SpecCellFailure>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecWriteReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }

    /// Record one isolated failure.
    pub fn fail(&mut self, failure: SpecCellFailure) {
        self.failures.push(failure);
    }
}

/// Result of reading typed records from a sheet.
#[derive(Debug, Clone)]
pub struct SpecReadOutcome<T> {
    /// Records in sheet row order.
    pub records: Vec<T>,
    /// Isolated per-cell conversion failures.
    pub failures: Vec<SpecCellFailure>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Structural failures that abort the current call.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Negative, unparsable, or out-of-range coordinate.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
    /// The document rejected a composed style.
    #[error("Style render error: {0}")]
    StyleRender(String),
    /// The template cannot be compiled.
    #[error("Malformed template: {0}")]
    MalformedTemplate(String),
    /// Sheet lookup failed.
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),
    /// Write attempted after `close()`.
    #[error("Cannot write after close().")]
    Closed,
    /// Container write failure.
    #[error("XLSX write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
    /// Container read failure.
    #[error("XLSX read error: {0}")]
    XlsxRead(#[from] calamine::XlsxError),
    /// IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
