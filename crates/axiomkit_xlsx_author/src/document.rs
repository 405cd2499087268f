//! Format collaborator seam and its in-memory XLSX implementation.
//!
//! The engine only talks to [`SheetDocument`]. [`XlsxDocument`] keeps sheets
//! in memory (so cells can be revisited, restyled and read back) and hands the
//! container encoding to `rust_xlsxwriter` on save and `calamine` on load.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{
    Color, Format, FormatAlign, FormatBorder, FormatUnderline, Workbook, Worksheet,
};

use crate::conf::{N_BORDER_LINE_MAX, N_FONT_SIZE_MAX};
use crate::spec::{
    EnumBorderPosition, EnumCellValue, EnumHorizontalAlign, EnumVerticalAlign, SheetError,
    SheetId, SpecCellRead, SpecMergedRegion, SpecStyleAttrs, StyleHandle,
};
use crate::style::StyleRenderer;
use crate::util::{
    cast_col_num, cast_row_num, convert_datetime_to_excel_serial,
    convert_excel_serial_to_datetime, sanitize_sheet_name,
};

/// Minimum contract the authoring engine needs from a spreadsheet document.
///
/// Rows and cells are created on first write; coordinates are zero-based.
pub trait SheetDocument: StyleRenderer {
    /// Return the sheet called `name`, creating it when missing.
    fn get_or_create_sheet(&mut self, name: &str) -> Result<SheetId, SheetError>;
    /// Look up a sheet by name.
    fn sheet_by_name(&self, name: &str) -> Option<SheetId>;
    /// Look up a sheet by zero-based position.
    fn sheet_by_index(&self, index: usize) -> Option<SheetId>;
    /// Display name of a sheet.
    fn sheet_name(&self, sheet: SheetId) -> Option<&str>;
    /// Set a cell value, creating row and cell when missing.
    fn set_cell_value(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
        value: EnumCellValue,
    ) -> Result<(), SheetError>;
    /// Attach a rendered style to a cell.
    fn set_cell_style(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
        style: StyleHandle,
    ) -> Result<(), SheetError>;
    /// Force text wrapping on a cell on top of its style.
    fn set_cell_wrap(&mut self, sheet: SheetId, row: usize, col: usize) -> Result<(), SheetError>;
    /// Register a merged region.
    fn add_merged_region(
        &mut self,
        sheet: SheetId,
        region: SpecMergedRegion,
    ) -> Result<(), SheetError>;
    /// Set a column width in character units.
    fn set_column_width(&mut self, sheet: SheetId, col: usize, width: f64)
    -> Result<(), SheetError>;
    /// Read a cell with its declared type tag.
    fn read_cell(&self, sheet: SheetId, row: usize, col: usize) -> SpecCellRead;
    /// Largest row index holding a cell, if any.
    fn last_row_index(&self, sheet: SheetId) -> Option<usize>;
    /// Merged regions registered on a sheet.
    fn merged_regions(&self, sheet: SheetId) -> &[SpecMergedRegion];
}

////////////////////////////////////////////////////////////////////////////////
// #region InMemoryModel

#[derive(Debug, Clone, Default, PartialEq)]
struct SpecCellData {
    value: EnumCellValue,
    style: Option<StyleHandle>,
    if_wrap: bool,
}

#[derive(Debug, Clone, Default)]
struct SpecSheetData {
    name: String,
    dict_rows: BTreeMap<usize, BTreeMap<usize, SpecCellData>>,
    l_merges: Vec<SpecMergedRegion>,
    dict_col_widths: BTreeMap<usize, f64>,
}

impl SpecSheetData {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn cell_mut(&mut self, row: usize, col: usize) -> &mut SpecCellData {
        self.dict_rows.entry(row).or_default().entry(col).or_default()
    }

    fn cell(&self, row: usize, col: usize) -> Option<&SpecCellData> {
        self.dict_rows.get(&row)?.get(&col)
    }
}

/// In-memory XLSX document.
#[derive(Debug, Default)]
pub struct XlsxDocument {
    l_sheets: Vec<SpecSheetData>,
    l_formats: Vec<Format>,
    l_style_attrs: Vec<SpecStyleAttrs>,
}

impl XlsxDocument {
    /// Empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load values and formulas from an XLSX file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let mut workbook: Xlsx<_> = open_workbook(path.as_ref())?;
        let document = Self::from_calamine(&mut workbook)?;
        tracing::debug!(
            target: "xlsx",
            path = %path.as_ref().display(),
            sheets = document.l_sheets.len(),
            "document_loaded"
        );
        Ok(document)
    }

    /// Load values and formulas from XLSX bytes.
    pub fn from_buffer(bytes: &[u8]) -> Result<Self, SheetError> {
        let mut workbook = Xlsx::new(Cursor::new(bytes.to_vec()))?;
        Self::from_calamine(&mut workbook)
    }

    /// Number of sheets.
    pub fn sheet_count(&self) -> usize {
        self.l_sheets.len()
    }

    /// Number of rendered styles.
    pub fn style_count(&self) -> usize {
        self.l_formats.len()
    }

    /// Attribute set a handle was rendered from.
    pub fn style_attrs(&self, handle: StyleHandle) -> Option<&SpecStyleAttrs> {
        self.l_style_attrs.get(handle.0)
    }

    /// Style handle attached to a cell.
    pub fn cell_style(&self, sheet: SheetId, row: usize, col: usize) -> Option<StyleHandle> {
        self.l_sheets.get(sheet.0)?.cell(row, col)?.style
    }

    /// Whether a cell is forced to wrap.
    pub fn cell_wraps(&self, sheet: SheetId, row: usize, col: usize) -> bool {
        self.l_sheets
            .get(sheet.0)
            .and_then(|data| data.cell(row, col))
            .is_some_and(|cell| cell.if_wrap)
    }

    /// Column width set on a sheet.
    pub fn column_width(&self, sheet: SheetId, col: usize) -> Option<f64> {
        self.l_sheets.get(sheet.0)?.dict_col_widths.get(&col).copied()
    }

    /// Encode and write the document to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SheetError> {
        let mut workbook = self.derive_workbook()?;
        workbook.save(path.as_ref())?;
        tracing::debug!(target: "xlsx", path = %path.as_ref().display(), "document_saved");
        Ok(())
    }

    /// Encode the document into XLSX bytes.
    pub fn save_to_buffer(&self) -> Result<Vec<u8>, SheetError> {
        let mut workbook = self.derive_workbook()?;
        Ok(workbook.save_to_buffer()?)
    }

    fn sheet_mut(&mut self, sheet: SheetId) -> Result<&mut SpecSheetData, SheetError> {
        self.l_sheets
            .get_mut(sheet.0)
            .ok_or_else(|| SheetError::SheetNotFound(format!("#{}", sheet.0)))
    }

    fn from_calamine<RS>(workbook: &mut Xlsx<RS>) -> Result<Self, SheetError>
    where
        RS: std::io::Read + std::io::Seek,
    {
        let mut document = Self::new();
        for sheet_name in workbook.sheet_names() {
            let sheet = document.get_or_create_sheet(&sheet_name)?;
            let range = workbook.worksheet_range(&sheet_name)?;
            let (n_row_start, n_col_start) = range.start().unwrap_or((0, 0));

            for (n_row_rel, row) in range.rows().enumerate() {
                for (n_col_rel, cell) in row.iter().enumerate() {
                    let value = derive_cell_value_from_data(cell);
                    if value.is_none() {
                        continue;
                    }
                    document.set_cell_value(
                        sheet,
                        n_row_start as usize + n_row_rel,
                        n_col_start as usize + n_col_rel,
                        value,
                    )?;
                }
            }

            if let Ok(range_formula) = workbook.worksheet_formula(&sheet_name) {
                let (n_row_start, n_col_start) = range_formula.start().unwrap_or((0, 0));
                for (n_row_rel, row) in range_formula.rows().enumerate() {
                    for (n_col_rel, formula) in row.iter().enumerate() {
                        if formula.is_empty() {
                            continue;
                        }
                        document.set_cell_value(
                            sheet,
                            n_row_start as usize + n_row_rel,
                            n_col_start as usize + n_col_rel,
                            EnumCellValue::Formula(
                                formula.strip_prefix('=').unwrap_or(formula).to_string(),
                            ),
                        )?;
                    }
                }
            }
        }
        Ok(document)
    }

    fn derive_workbook(&self) -> Result<Workbook, SheetError> {
        let mut workbook = Workbook::new();
        let fmt_default = Format::new();

        for data in &self.l_sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&data.name)?;

            for (n_col, n_width) in &data.dict_col_widths {
                worksheet.set_column_width(cast_col_num(*n_col)?, *n_width)?;
            }

            for region in data.l_merges.iter().filter(|region| !region.is_single_cell()) {
                let fmt_anchor = self.derive_cell_format(
                    data.cell(region.row_from, region.col_from),
                    &fmt_default,
                );
                worksheet.merge_range(
                    cast_row_num(region.row_from)?,
                    cast_col_num(region.col_from)?,
                    cast_row_num(region.row_to)?,
                    cast_col_num(region.col_to)?,
                    "",
                    &fmt_anchor,
                )?;
            }

            for (n_row, dict_cells) in &data.dict_rows {
                for (n_col, cell) in dict_cells {
                    let if_covered = data.l_merges.iter().any(|region| {
                        region.contains(*n_row, *n_col)
                            && !(region.row_from == *n_row && region.col_from == *n_col)
                    });
                    if if_covered {
                        continue;
                    }
                    let format = self.derive_cell_format(Some(cell), &fmt_default);
                    write_cell_with_format(worksheet, *n_row, *n_col, &cell.value, &format)?;
                }
            }
        }

        Ok(workbook)
    }

    fn derive_cell_format(&self, cell: Option<&SpecCellData>, fmt_default: &Format) -> Format {
        let Some(cell) = cell else {
            return fmt_default.clone();
        };
        let format = cell
            .style
            .and_then(|handle| self.l_formats.get(handle.0))
            .cloned()
            .unwrap_or_else(|| fmt_default.clone());
        if cell.if_wrap {
            format.set_text_wrap()
        } else {
            format
        }
    }
}

impl StyleRenderer for XlsxDocument {
    fn render_style(&mut self, attrs: &SpecStyleAttrs) -> Result<StyleHandle, SheetError> {
        let format = derive_rust_xlsx_format(attrs)?;
        self.l_formats.push(format);
        self.l_style_attrs.push(attrs.clone());
        Ok(StyleHandle(self.l_formats.len() - 1))
    }
}

impl SheetDocument for XlsxDocument {
    fn get_or_create_sheet(&mut self, name: &str) -> Result<SheetId, SheetError> {
        let c_name = sanitize_sheet_name(name, "_");
        if let Some(sheet) = self.sheet_by_name(&c_name) {
            return Ok(sheet);
        }
        self.l_sheets.push(SpecSheetData::new(c_name));
        Ok(SheetId(self.l_sheets.len() - 1))
    }

    fn sheet_by_name(&self, name: &str) -> Option<SheetId> {
        let c_name = sanitize_sheet_name(name, "_");
        self.l_sheets
            .iter()
            .position(|data| data.name.eq_ignore_ascii_case(&c_name))
            .map(SheetId)
    }

    fn sheet_by_index(&self, index: usize) -> Option<SheetId> {
        (index < self.l_sheets.len()).then_some(SheetId(index))
    }

    fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.l_sheets.get(sheet.0).map(|data| data.name.as_str())
    }

    fn set_cell_value(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
        value: EnumCellValue,
    ) -> Result<(), SheetError> {
        self.sheet_mut(sheet)?.cell_mut(row, col).value = value;
        Ok(())
    }

    fn set_cell_style(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
        style: StyleHandle,
    ) -> Result<(), SheetError> {
        if style.0 >= self.l_formats.len() {
            return Err(SheetError::StyleRender(format!(
                "unknown style handle {}",
                style.0
            )));
        }
        self.sheet_mut(sheet)?.cell_mut(row, col).style = Some(style);
        Ok(())
    }

    fn set_cell_wrap(&mut self, sheet: SheetId, row: usize, col: usize) -> Result<(), SheetError> {
        self.sheet_mut(sheet)?.cell_mut(row, col).if_wrap = true;
        Ok(())
    }

    fn add_merged_region(
        &mut self,
        sheet: SheetId,
        region: SpecMergedRegion,
    ) -> Result<(), SheetError> {
        if region.row_to < region.row_from || region.col_to < region.col_from {
            return Err(SheetError::InvalidCoordinate(format!(
                "inverted merged region {region:?}"
            )));
        }
        let data = self.sheet_mut(sheet)?;
        if let Some(other) = data.l_merges.iter().find(|other| {
            other.row_from <= region.row_to
                && region.row_from <= other.row_to
                && other.col_from <= region.col_to
                && region.col_from <= other.col_to
        }) {
            return Err(SheetError::InvalidCoordinate(format!(
                "merged region {region:?} overlaps {other:?}"
            )));
        }
        data.l_merges.push(region);
        Ok(())
    }

    fn set_column_width(
        &mut self,
        sheet: SheetId,
        col: usize,
        width: f64,
    ) -> Result<(), SheetError> {
        self.sheet_mut(sheet)?.dict_col_widths.insert(col, width);
        Ok(())
    }

    fn read_cell(&self, sheet: SheetId, row: usize, col: usize) -> SpecCellRead {
        self.l_sheets
            .get(sheet.0)
            .and_then(|data| data.cell(row, col))
            .map_or_else(SpecCellRead::blank, |cell| {
                SpecCellRead::from_value(cell.value.clone())
            })
    }

    fn last_row_index(&self, sheet: SheetId) -> Option<usize> {
        self.l_sheets
            .get(sheet.0)?
            .dict_rows
            .iter()
            .rev()
            .find(|(_, dict_cells)| dict_cells.values().any(|cell| !cell.value.is_none()))
            .map(|(n_row, _)| *n_row)
    }

    fn merged_regions(&self, sheet: SheetId) -> &[SpecMergedRegion] {
        self.l_sheets
            .get(sheet.0)
            .map(|data| data.l_merges.as_slice())
            .unwrap_or(&[])
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FormatConversion

fn derive_cell_value_from_data(cell: &Data) -> EnumCellValue {
    match cell {
        Data::Empty => EnumCellValue::None,
        Data::String(val) => EnumCellValue::Text(val.clone()),
        Data::Float(val) => EnumCellValue::Number(*val),
        Data::Int(val) => EnumCellValue::Number(*val as f64),
        Data::Bool(val) => EnumCellValue::Boolean(*val),
        Data::Error(err) => EnumCellValue::Text(format!("#{err:?}")),
        Data::DateTime(dt) => convert_excel_serial_to_datetime(dt.as_f64())
            .map_or(EnumCellValue::Number(dt.as_f64()), EnumCellValue::Date),
        Data::DateTimeIso(val) => EnumCellValue::Text(val.clone()),
        Data::DurationIso(val) => EnumCellValue::Text(val.clone()),
    }
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), SheetError> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::None => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::Text(val) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)?;
        }
        EnumCellValue::Number(val) => {
            worksheet.write_number_with_format(n_row, n_col, *val, format)?;
        }
        EnumCellValue::Boolean(val) => {
            worksheet.write_boolean_with_format(n_row, n_col, *val, format)?;
        }
        EnumCellValue::Date(val) => {
            worksheet.write_number_with_format(
                n_row,
                n_col,
                convert_datetime_to_excel_serial(val),
                format,
            )?;
        }
        EnumCellValue::Formula(val) => {
            worksheet.write_formula_with_format(n_row, n_col, val.as_str(), format)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(attrs: &SpecStyleAttrs) -> Result<Format, SheetError> {
    let mut format = Format::new();

    if let Some(val) = &attrs.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = attrs.font_size {
        if !(1..=N_FONT_SIZE_MAX).contains(&val) {
            return Err(SheetError::StyleRender(format!(
                "font_size must be in 1..={N_FONT_SIZE_MAX}, got {val}"
            )));
        }
        format = format.set_font_size(val as f64);
    }
    if attrs.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if attrs.italic.unwrap_or(false) {
        format = format.set_italic();
    }
    if attrs.underline.unwrap_or(false) {
        format = format.set_underline(FormatUnderline::Single);
    }

    if attrs.date.unwrap_or(false) {
        if let Some(val) = attrs.date_pattern.as_ref().or(attrs.num_format.as_ref()) {
            format = format.set_num_format(val.clone());
        }
    } else if let Some(val) = &attrs.num_format {
        format = format.set_num_format(val.clone());
    }

    if let Some(val) = &attrs.font_color {
        format = format.set_font_color(parse_hex_color(val)?);
    }
    if let Some(val) = &attrs.bg_color {
        format = format.set_background_color(parse_hex_color(val)?);
    }

    if let Some(val) = attrs.align {
        format = format.set_align(match val {
            EnumHorizontalAlign::General => FormatAlign::General,
            EnumHorizontalAlign::Left => FormatAlign::Left,
            EnumHorizontalAlign::Center => FormatAlign::Center,
            EnumHorizontalAlign::Right => FormatAlign::Right,
            EnumHorizontalAlign::Fill => FormatAlign::Fill,
            EnumHorizontalAlign::Justify => FormatAlign::Justify,
        });
    }
    if let Some(val) = attrs.valign {
        format = format.set_align(match val {
            EnumVerticalAlign::Top => FormatAlign::Top,
            EnumVerticalAlign::Center => FormatAlign::VerticalCenter,
            EnumVerticalAlign::Bottom => FormatAlign::Bottom,
        });
    }
    if attrs.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    for side in attrs.borders.iter().flatten() {
        let border = derive_format_border(side.line)?;
        format = match side.position {
            EnumBorderPosition::Top => format.set_border_top(border),
            EnumBorderPosition::Bottom => format.set_border_bottom(border),
            EnumBorderPosition::Left => format.set_border_left(border),
            EnumBorderPosition::Right => format.set_border_right(border),
        };
        if let Some(c_color) = &side.color {
            let color = parse_hex_color(c_color)?;
            format = match side.position {
                EnumBorderPosition::Top => format.set_border_top_color(color),
                EnumBorderPosition::Bottom => format.set_border_bottom_color(color),
                EnumBorderPosition::Left => format.set_border_left_color(color),
                EnumBorderPosition::Right => format.set_border_right_color(color),
            };
        }
    }

    Ok(format)
}

fn parse_hex_color(hex: &str) -> Result<Color, SheetError> {
    let c_hex = hex.trim().trim_start_matches('#');
    if c_hex.len() != 6 {
        return Err(SheetError::StyleRender(format!(
            "color must be #RRGGBB, got {hex:?}"
        )));
    }
    u32::from_str_radix(c_hex, 16)
        .map(Color::RGB)
        .map_err(|_| SheetError::StyleRender(format!("color must be #RRGGBB, got {hex:?}")))
}

fn derive_format_border(border: i64) -> Result<FormatBorder, SheetError> {
    Ok(match border {
        0 => FormatBorder::None,
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        8 => FormatBorder::MediumDashed,
        9 => FormatBorder::DashDot,
        10 => FormatBorder::MediumDashDot,
        11 => FormatBorder::DashDotDot,
        12 => FormatBorder::MediumDashDotDot,
        13 => FormatBorder::SlantDashDot,
        _ => {
            return Err(SheetError::StyleRender(format!(
                "border line must be in 0..={N_BORDER_LINE_MAX}, got {border}"
            )));
        }
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
