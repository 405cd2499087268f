//! Authoring session: per-sheet cursors, free-form cell writes and the
//! write-records-through-template pass.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, derive_default_author_fragments, derive_default_author_options,
};
use crate::document::{SheetDocument, XlsxDocument};
use crate::flatten::RowFlattener;
use crate::mapping::SheetTemplate;
use crate::merge::MergeTracker;
use crate::pointer::Navigator;
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumFailureKind, SheetError, SheetId,
    SpecAuthorOptions, SpecCellCoord, SpecCellFailure, SpecCellStyle, SpecDefaultStyles,
    SpecMergedRegion, SpecWriteReport, StyleHandle, StyleId,
};
use crate::style::{StyleCache, StyleRenderer, layer, layer_all};
use crate::util::{
    derive_autofit_width, estimate_unicode_string_width, offset_cell_coord, sanitize_sheet_name,
    validate_cell_coord, validate_policy_autofit,
};

/// One free-form cell write.
#[derive(Debug, Clone, Default)]
pub struct SpecCellContent {
    /// Cell value.
    pub value: EnumCellValue,
    /// Style fragments, layered left to right.
    pub styles: Vec<SpecCellStyle>,
    /// Rows covered from the pointer (`0` counts as `1`).
    pub row_span: usize,
    /// Columns covered from the pointer (`0` counts as `1`).
    pub col_span: usize,
}

impl SpecCellContent {
    /// Single unstyled cell.
    pub fn new(value: impl Into<EnumCellValue>) -> Self {
        Self {
            value: value.into(),
            styles: Vec::new(),
            row_span: 1,
            col_span: 1,
        }
    }

    /// Layer one more style fragment.
    pub fn styled(mut self, style: &SpecCellStyle) -> Self {
        self.styles.push(style.clone());
        self
    }

    /// Cover `row_span` x `col_span` cells with one merged region.
    pub fn span(mut self, row_span: usize, col_span: usize) -> Self {
        self.row_span = row_span;
        self.col_span = col_span;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SpecSheetState {
    navigator: Navigator,
    n_row_next_unused: usize,
}

/// Stateful authoring session over one document.
///
/// File-backed sessions ([`XlsxWriter::create`]) buffer everything in memory
/// until [`XlsxWriter::close`] is called.
pub struct XlsxWriter<D: SheetDocument = XlsxDocument> {
    document: D,
    cache: StyleCache,
    options: SpecAuthorOptions,
    styles_default: SpecDefaultStyles,
    style_date: SpecCellStyle,
    dict_sheet_states: HashMap<SheetId, SpecSheetState>,
    l_reports: Vec<SpecWriteReport>,
    path_file_out: Option<PathBuf>,
    if_closed: bool,
}

impl XlsxWriter<XlsxDocument> {
    /// Session bound to an output path.
    pub fn create(path_file_out: impl Into<PathBuf>) -> Self {
        let mut writer = Self::with_document(XlsxDocument::new());
        writer.path_file_out = Some(path_file_out.into());
        writer
    }

    /// Save the document to the output path. Idempotent.
    pub fn close(&mut self) -> Result<(), SheetError> {
        if self.if_closed {
            return Ok(());
        }
        if let Some(path_file_out) = &self.path_file_out {
            self.document.save(path_file_out).inspect_err(|err| {
                tracing::error!(target: "xlsx", %err, "document_save_failed");
            })?;
        }
        self.if_closed = true;
        Ok(())
    }
}

impl<D: SheetDocument> XlsxWriter<D> {
    /// Session over any document implementing the collaborator contract.
    pub fn with_document(document: D) -> Self {
        let options = derive_default_author_options();
        let styles_default = derive_default_author_fragments();
        Self {
            document,
            cache: StyleCache::new(),
            style_date: derive_date_style(&styles_default, &options),
            styles_default,
            options,
            dict_sheet_states: HashMap::new(),
            l_reports: Vec::new(),
            path_file_out: None,
            if_closed: false,
        }
    }

    /// Replace the session options.
    pub fn with_options(mut self, options: SpecAuthorOptions) -> Result<Self, SheetError> {
        validate_policy_autofit(&options.policy_autofit)?;
        self.style_date = derive_date_style(&self.styles_default, &options);
        self.options = options;
        Ok(self)
    }

    /// Underlying document.
    pub fn document(&self) -> &D {
        &self.document
    }

    /// Underlying document, mutable.
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    /// Consume the session and return the document.
    pub fn into_document(self) -> D {
        self.document
    }

    /// Output path of file-backed sessions.
    pub fn file_out(&self) -> Option<&Path> {
        self.path_file_out.as_deref()
    }

    /// Snapshot of per-call write reports.
    pub fn report(&self) -> Vec<SpecWriteReport> {
        self.l_reports.clone()
    }

    /// Style cache of this session.
    pub fn style_cache(&self) -> &StyleCache {
        &self.cache
    }

    /// Preset fragments used where a template leaves a style unset.
    pub fn default_styles(&self) -> &SpecDefaultStyles {
        &self.styles_default
    }

    /// Built-in date fragment applied to date values.
    pub fn date_style(&self) -> &SpecCellStyle {
        &self.style_date
    }

    /// Cursor over the sheet called `name`, created when missing.
    pub fn sheet(&mut self, name: &str) -> Result<SheetCursor<'_, D>, SheetError> {
        self.ensure_open()?;
        let sheet = self.document.get_or_create_sheet(name)?;
        if !self.dict_sheet_states.contains_key(&sheet) {
            let n_row_next_unused = self.document.last_row_index(sheet).map_or(0, |n_row| n_row + 1);
            self.dict_sheet_states.insert(
                sheet,
                SpecSheetState {
                    navigator: Navigator::new(),
                    n_row_next_unused,
                },
            );
            tracing::debug!(target: "xlsx", sheet = name, n_row_next_unused, "sheet_opened");
        }
        Ok(SheetCursor {
            writer: self,
            sheet,
        })
    }

    /// Cursor over a new sheet; the name gets a `__N` suffix when taken.
    pub fn new_sheet(&mut self, name: &str) -> Result<SheetCursor<'_, D>, SheetError> {
        self.ensure_open()?;
        let sheet_name_unique = self.derive_unique_sheet_name(&sanitize_sheet_name(name, "_"));
        self.sheet(&sheet_name_unique)
    }

    fn ensure_open(&self) -> Result<(), SheetError> {
        if self.if_closed {
            return Err(SheetError::Closed);
        }
        Ok(())
    }

    fn derive_unique_sheet_name(&self, name: &str) -> String {
        if self.document.sheet_by_name(name).is_none() {
            return name.to_string();
        }

        let base_name: String = name
            .chars()
            .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
            .collect();

        let mut n_idx = 2usize;
        loop {
            let candidate: String = format!("{base_name}__{n_idx}")
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX)
                .collect();
            if self.document.sheet_by_name(&candidate).is_none() {
                return candidate;
            }
            n_idx += 1;
        }
    }

    /// Compose the style of one cell.
    ///
    /// Date values need a date number format. Without explicit fragments they
    /// get the session date style through the cache. An explicit composition
    /// whose last `date` flag is set is used as is; any other explicit
    /// composition is layered with the date fragment and rendered outside the
    /// cache, memoized in `dict_date_adhoc` by fragment identities.
    fn resolve_cell_style(
        &mut self,
        fragments: &[Option<&SpecCellStyle>],
        if_explicit: bool,
        value: &EnumCellValue,
        dict_date_adhoc: &mut HashMap<Vec<StyleId>, StyleHandle>,
    ) -> Result<Option<StyleHandle>, SheetError> {
        if !value.is_date() {
            return self.cache.compose(&mut self.document, fragments);
        }
        if !if_explicit {
            return self
                .cache
                .compose(&mut self.document, &[Some(&self.style_date)]);
        }

        let if_date_style = fragments
            .iter()
            .flatten()
            .rev()
            .find_map(|fragment| fragment.attrs().date)
            .unwrap_or(false);
        if if_date_style {
            return self.cache.compose(&mut self.document, fragments);
        }

        let l_ids: Vec<StyleId> = fragments
            .iter()
            .flatten()
            .map(|fragment| fragment.id())
            .collect();
        if let Some(handle_adhoc) = dict_date_adhoc.get(&l_ids) {
            return Ok(Some(*handle_adhoc));
        }
        let attrs = layer(&layer_all(fragments.iter().copied()), self.style_date.attrs());
        let handle_adhoc = self.document.render_style(&attrs).inspect_err(|err| {
            tracing::error!(target: "xlsx", %err, "style_render_failed");
        })?;
        dict_date_adhoc.insert(l_ids, handle_adhoc);
        Ok(Some(handle_adhoc))
    }
}

fn derive_date_style(
    styles_default: &SpecDefaultStyles,
    options: &SpecAuthorOptions,
) -> SpecCellStyle {
    styles_default.data.with_date_pattern(&options.date_pattern_default)
}

/// Cursor over one sheet of a session.
pub struct SheetCursor<'w, D: SheetDocument = XlsxDocument> {
    writer: &'w mut XlsxWriter<D>,
    sheet: SheetId,
}

impl<D: SheetDocument> SheetCursor<'_, D> {
    /// Sheet handle.
    pub fn sheet_id(&self) -> SheetId {
        self.sheet
    }

    /// Sheet name.
    pub fn name(&self) -> &str {
        self.writer
            .document
            .sheet_name(self.sheet)
            .unwrap_or_default()
    }

    /// Current pointer.
    pub fn pointer(&self) -> SpecCellCoord {
        self.state().navigator.pointer()
    }

    /// Far corner of the last write.
    pub fn pivot(&self) -> SpecCellCoord {
        self.state().navigator.pivot()
    }

    /// One past the largest row written on this sheet.
    pub fn next_unused_row(&self) -> usize {
        self.state().n_row_next_unused
    }

    /// Jump to `(row, col)`.
    pub fn go_to(&mut self, row: i64, col: i64) -> Result<SpecCellCoord, SheetError> {
        self.state_mut().navigator.go_to(row, col)
    }

    /// Jump to an A1-style address.
    pub fn go_to_address(&mut self, address: &str) -> Result<SpecCellCoord, SheetError> {
        self.state_mut().navigator.go_to_address(address)
    }

    /// Step right past the last write.
    pub fn move_right(&mut self) -> Result<SpecCellCoord, SheetError> {
        self.state_mut().navigator.move_right()
    }

    /// Step right past the last write, then `n - 1` more columns.
    pub fn move_right_by(&mut self, n: usize) -> Result<SpecCellCoord, SheetError> {
        self.state_mut().navigator.move_right_by(n)
    }

    /// Step down past the last write.
    pub fn move_down(&mut self) -> Result<SpecCellCoord, SheetError> {
        self.state_mut().navigator.move_down()
    }

    /// Step down past the last write, then `n - 1` more rows.
    pub fn move_down_by(&mut self, n: usize) -> Result<SpecCellCoord, SheetError> {
        self.state_mut().navigator.move_down_by(n)
    }

    /// Jump to column `0` of the next unused row.
    pub fn enter(&mut self) -> Result<SpecCellCoord, SheetError> {
        let state = self.state_mut();
        state.navigator.enter(state.n_row_next_unused)
    }

    /// `enter`, then `n - 1` more rows.
    pub fn enter_by(&mut self, n: usize) -> Result<SpecCellCoord, SheetError> {
        let state = self.state_mut();
        state.navigator.enter_by(state.n_row_next_unused, n)
    }

    /// Write one value at the pointer.
    pub fn write_value(&mut self, value: impl Into<EnumCellValue>) -> Result<SpecCellCoord, SheetError> {
        self.write_cell(SpecCellContent::new(value))
    }

    /// Write one cell at the pointer and extend the pivot over its span.
    ///
    /// Spans larger than one cell register a merged region.
    pub fn write_cell(&mut self, content: SpecCellContent) -> Result<SpecCellCoord, SheetError> {
        self.writer.ensure_open()?;
        let coord = self.pointer();
        let n_row_span = usize::max(1, content.row_span);
        let n_col_span = usize::max(1, content.col_span);
        let corner = offset_cell_coord(coord, n_row_span - 1, n_col_span - 1)?;

        let l_fragments: Vec<Option<&SpecCellStyle>> = content.styles.iter().map(Some).collect();
        let handle = self.writer.resolve_cell_style(
            &l_fragments,
            !l_fragments.is_empty(),
            &content.value,
            &mut HashMap::new(),
        )?;
        self.write_plain(coord.row, coord.col, content.value, handle)?;

        if corner != coord {
            self.writer.document.add_merged_region(
                self.sheet,
                SpecMergedRegion {
                    row_from: coord.row,
                    row_to: corner.row,
                    col_from: coord.col,
                    col_to: corner.col,
                },
            )?;
        }

        let state = self.state_mut();
        state.navigator.extend_pivot(n_row_span, n_col_span)?;
        state.n_row_next_unused = usize::max(state.n_row_next_unused, corner.row + 1);
        Ok(coord)
    }

    /// Write `records` through `template` as one block.
    ///
    /// The block starts at the template anchor, or at the pointer when the
    /// template has none. Afterwards the pointer is at the block origin and the
    /// pivot at its bottom-right corner. Per-cell failures are collected in the
    /// returned report; structural failures abort the call.
    pub fn write_records<T: 'static>(
        &mut self,
        records: &[T],
        template: &SheetTemplate<T>,
    ) -> Result<SpecWriteReport, SheetError> {
        self.writer.ensure_open()?;
        let compiled = template.compile()?;
        let policy_autofit = self.writer.options.policy_autofit.clone();
        let if_wrap_merged_anchor = self.writer.options.if_wrap_merged_anchor;

        let origin = match template.derive_start_at()? {
            Some(coord) => coord,
            None => self.pointer(),
        };
        let mut report = SpecWriteReport {
            sheet_name: self.name().to_string(),
            origin,
            ..Default::default()
        };
        report.warnings.extend(compiled.warnings().iter().cloned());
        for name in compiled.unresolved_fields() {
            report.fail(SpecCellFailure {
                kind: EnumFailureKind::UnresolvedField,
                row: None,
                col: None,
                column: name.clone(),
                message: format!("Field `{name}` is not registered; column dropped."),
            });
        }

        let n_cols = compiled.l_columns.len();
        if n_cols == 0 {
            tracing::warn!(target: "xlsx", sheet = %report.sheet_name, "template_without_columns");
            report.warn("Template has no columns; nothing written.");
            self.writer.l_reports.push(report.clone());
            return Ok(report);
        }
        offset_cell_coord(origin, 0, n_cols - 1)?;

        let mut n_row = origin.row;
        let mut l_width_header = vec![0usize; n_cols];
        let mut l_width_body = vec![0usize; n_cols];

        let style_metadata = template
            .style_metadata
            .clone()
            .unwrap_or_else(|| self.writer.styles_default.metadata.clone());
        let style_header = template
            .style_header
            .clone()
            .unwrap_or_else(|| self.writer.styles_default.header.clone());
        let style_data = template
            .style_data
            .clone()
            .unwrap_or_else(|| self.writer.styles_default.data.clone());

        if template.if_metadata_row {
            let handle = self
                .writer
                .cache
                .compose(&mut self.writer.document, &[Some(&style_metadata)])?;
            for (n_idx, col) in compiled.l_columns.iter().enumerate() {
                self.write_plain(n_row, origin.col + n_idx, col.key.clone().into(), handle)?;
            }
            n_row += 1;
        }

        if template.if_header {
            validate_cell_coord(n_row, origin.col)?;
            let handle = self
                .writer
                .cache
                .compose(&mut self.writer.document, &[Some(&style_header)])?;
            for (n_idx, col) in compiled.l_columns.iter().enumerate() {
                l_width_header[n_idx] = estimate_unicode_string_width(&col.title);
                self.write_plain(n_row, origin.col + n_idx, col.title.clone().into(), handle)?;
            }
            n_row += 1;
        }

        let n_rows_autofit_max = policy_autofit.height_body_inferred_max.unwrap_or(usize::MAX);
        let mut n_rows_written = 0usize;
        let mut tracker = MergeTracker::new();
        let mut dict_date_adhoc = HashMap::new();
        let mut l_flatten_failures: Vec<(usize, usize)> = Vec::new();
        let mut flattener = RowFlattener::new(&compiled.l_levels);

        let mut iter_rows = records
            .iter()
            .enumerate()
            .flat_map(|(n_record, record)| {
                let outcome = flattener.flatten(record);
                for n_depth in outcome.l_mismatch_depths {
                    l_flatten_failures.push((n_record, n_depth));
                }
                outcome.rows
            })
            .peekable();

        while let Some(row) = iter_rows.next() {
            let if_last = iter_rows.peek().is_none();
            validate_cell_coord(n_row, origin.col)?;

            for (n_idx, col) in compiled.l_columns.iter().enumerate() {
                let n_col = origin.col + n_idx;
                let Some(element) = row.element(col.depth) else {
                    continue;
                };

                let value = match (col.value)(element) {
                    Ok(value) => value,
                    Err(message) => {
                        tracing::warn!(target: "xlsx", row = n_row, col = n_col, %message, "cell_extraction_failed");
                        report.fail(SpecCellFailure {
                            kind: EnumFailureKind::ExtractionFailure,
                            row: Some(n_row),
                            col: Some(n_col),
                            column: col.title.clone(),
                            message,
                        });
                        EnumCellValue::None
                    }
                };
                let style_by = match &col.style_by {
                    None => None,
                    Some(style_by) => match style_by(element) {
                        Ok(style) => style,
                        Err(message) => {
                            tracing::warn!(target: "xlsx", row = n_row, col = n_col, %message, "cell_style_failed");
                            report.fail(SpecCellFailure {
                                kind: EnumFailureKind::ExtractionFailure,
                                row: Some(n_row),
                                col: Some(n_col),
                                column: col.title.clone(),
                                message,
                            });
                            None
                        }
                    },
                };

                let if_explicit =
                    template.style_data.is_some() || col.style.is_some() || style_by.is_some();
                let handle = self.writer.resolve_cell_style(
                    &[Some(&style_data), col.style.as_ref(), style_by.as_ref()],
                    if_explicit,
                    &value,
                    &mut dict_date_adhoc,
                )?;

                if let Some(key) = col.derive_merge_key(element, &value)
                    && let Some(region) = tracker.observe(n_col, key, n_row, if_last)
                {
                    self.writer.document.add_merged_region(self.sheet, region)?;
                    if if_wrap_merged_anchor {
                        self.writer
                            .document
                            .set_cell_wrap(self.sheet, region.row_from, region.col_from)?;
                    }
                    report.merges.push(region);
                }

                if template.if_auto_size && n_rows_written < n_rows_autofit_max {
                    l_width_body[n_idx] = usize::max(
                        l_width_body[n_idx],
                        estimate_unicode_string_width(&value.to_display_text()),
                    );
                }
                self.write_plain(n_row, n_col, value, handle)?;
            }

            n_rows_written += 1;
            n_row += 1;
        }
        drop(iter_rows);

        for (n_record, n_depth) in l_flatten_failures {
            tracing::warn!(target: "xlsx", record = n_record, depth = n_depth, "row_expansion_mismatch");
            report.fail(SpecCellFailure {
                kind: EnumFailureKind::FlattenTypeMismatch,
                row: None,
                col: None,
                column: format!("level {n_depth}"),
                message: format!(
                    "Record {n_record}: expansion at depth {n_depth} yielded no collection."
                ),
            });
        }

        for (n_idx, col) in compiled.l_columns.iter().enumerate() {
            let n_col = origin.col + n_idx;
            if let Some(n_width) = col.width {
                self.writer.document.set_column_width(self.sheet, n_col, n_width)?;
            } else if template.if_auto_size {
                let n_width_recorded = match policy_autofit.rule_columns {
                    EnumAutofitColumnsRule::Header => l_width_header[n_idx],
                    EnumAutofitColumnsRule::Body => l_width_body[n_idx],
                    EnumAutofitColumnsRule::All => {
                        usize::max(l_width_header[n_idx], l_width_body[n_idx])
                    }
                };
                self.writer.document.set_column_width(
                    self.sheet,
                    n_col,
                    derive_autofit_width(n_width_recorded, &policy_autofit),
                )?;
            }
        }

        let corner = SpecCellCoord::new(
            usize::max(origin.row, n_row.saturating_sub(1)),
            origin.col + n_cols - 1,
        );
        let state = self.state_mut();
        state.navigator.set_block(origin, corner);
        if n_row > origin.row {
            state.n_row_next_unused = usize::max(state.n_row_next_unused, n_row);
        }

        report.rows_written = n_rows_written;
        tracing::debug!(
            target: "xlsx",
            sheet = %report.sheet_name,
            rows = n_rows_written,
            merges = report.merges.len(),
            failures = report.failures.len(),
            "records_written"
        );
        self.writer.l_reports.push(report.clone());
        Ok(report)
    }

    fn write_plain(
        &mut self,
        row: usize,
        col: usize,
        value: EnumCellValue,
        handle: Option<StyleHandle>,
    ) -> Result<(), SheetError> {
        let document = &mut self.writer.document;
        if !value.is_none() {
            document.set_cell_value(self.sheet, row, col, value)?;
        }
        if let Some(handle) = handle {
            document.set_cell_style(self.sheet, row, col, handle)?;
        }
        Ok(())
    }

    fn state(&self) -> SpecSheetState {
        self.writer
            .dict_sheet_states
            .get(&self.sheet)
            .copied()
            .unwrap_or_default()
    }

    fn state_mut(&mut self) -> &mut SpecSheetState {
        self.writer.dict_sheet_states.entry(self.sheet).or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::mapping::{FieldRegistry, SheetRecord};
    use crate::spec::{SpecCellRead, SpecStyleAttrs};

    #[derive(Debug, Clone, Default)]
    struct Product {
        name: String,
        quantity: i64,
        brand: String,
        category_id: Option<i64>,
        category_name: String,
    }

    impl SheetRecord for Product {
        fn field_registry() -> FieldRegistry<Self> {
            FieldRegistry::new()
                .field("name", |p: &Product| p.name.clone())
                .field("quantity", |p: &Product| p.quantity)
                .field("brand", |p: &Product| p.brand.clone())
                .field("categoryName", |p: &Product| p.category_name.clone())
        }
    }

    fn derive_products() -> Vec<Product> {
        let rows = [
            ("Tucson", "Hyundai", 1, "SUV"),
            ("Elantra", "Hyundai", 3, "Sedan"),
            ("Civic", "Honda", 4, "Compact"),
            ("Corolla", "Toyota", 5, "Compact"),
            ("Model 3", "Tesla", 6, "Electric"),
            ("Ranger", "Ford", 2, "Truck"),
            ("Hilux", "Toyota", 2, "Truck"),
            ("Golf", "VW", 7, "Hatch"),
        ];
        rows.iter()
            .enumerate()
            .map(|(n_idx, (name, brand, category_id, category_name))| Product {
                name: name.to_string(),
                quantity: n_idx as i64 + 1,
                brand: brand.to_string(),
                category_id: Some(*category_id),
                category_name: category_name.to_string(),
            })
            .collect()
    }

    fn derive_product_template() -> SheetTemplate<Product> {
        SheetTemplate::<Product>::new()
            .include_fields(["name", "quantity"])
            .column(|c| c.field("brand").merge_on_value())
            .column(|c| {
                c.field("categoryName")
                    .title("Category")
                    .merge_on_id(|p: &Product| p.category_id)
            })
    }

    #[test]
    fn test_write_records_merges_two_runs() {
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let report = {
            let mut cursor = writer.sheet("Products").unwrap();
            cursor
                .write_records(&derive_products(), &derive_product_template())
                .unwrap()
        };

        assert_eq!(report.rows_written, 8);
        assert!(report.failures.is_empty());
        assert_eq!(
            report.merges,
            vec![
                SpecMergedRegion {
                    row_from: 1,
                    row_to: 2,
                    col_from: 2,
                    col_to: 2,
                },
                SpecMergedRegion {
                    row_from: 6,
                    row_to: 7,
                    col_from: 3,
                    col_to: 3,
                },
            ]
        );

        let document = writer.document();
        let sheet = document.sheet_by_name("Products").unwrap();
        assert_eq!(document.merged_regions(sheet).len(), 2);
        assert!(document.cell_wraps(sheet, 1, 2));
        assert!(document.cell_wraps(sheet, 6, 3));
        assert_eq!(
            document.read_cell(sheet, 0, 3),
            SpecCellRead::from_value("Category".into())
        );
        assert_eq!(
            document.read_cell(sheet, 8, 1).value,
            EnumCellValue::Number(8.0)
        );
    }

    #[test]
    fn test_block_leaves_pointer_at_origin_and_pivot_at_corner() {
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let mut cursor = writer.sheet("S").unwrap();
        cursor.go_to_address("B3").unwrap();
        cursor
            .write_records(&derive_products()[..3], &derive_product_template())
            .unwrap();

        assert_eq!(cursor.pointer(), SpecCellCoord::new(2, 1));
        assert_eq!(cursor.pivot(), SpecCellCoord::new(5, 4));
        assert_eq!(cursor.next_unused_row(), 6);
        assert_eq!(cursor.move_right().unwrap(), SpecCellCoord::new(2, 5));
        assert_eq!(cursor.enter().unwrap(), SpecCellCoord::new(6, 0));
    }

    #[test]
    fn test_write_cell_span_registers_merge_and_moves_past() {
        let style_title = SpecCellStyle::new(SpecStyleAttrs {
            bold: Some(true),
            ..Default::default()
        });
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let mut cursor = writer.sheet("S").unwrap();
        cursor
            .write_cell(SpecCellContent::new("Report").styled(&style_title).span(2, 3))
            .unwrap();
        assert_eq!(cursor.move_right().unwrap(), SpecCellCoord::new(0, 3));
        cursor.write_value(42).unwrap();
        assert_eq!(cursor.enter().unwrap(), SpecCellCoord::new(2, 0));

        let sheet = cursor.sheet_id();
        let document = writer.document();
        assert_eq!(
            document.merged_regions(sheet),
            &[SpecMergedRegion {
                row_from: 0,
                row_to: 1,
                col_from: 0,
                col_to: 2,
            }]
        );
        assert!(document.cell_style(sheet, 0, 0).is_some());
        assert_eq!(document.cell_style(sheet, 0, 3), None);
    }

    #[test]
    fn test_date_values_get_date_styles() {
        #[derive(Debug, Clone)]
        struct Event {
            when: NaiveDate,
        }
        impl SheetRecord for Event {
            fn field_registry() -> FieldRegistry<Self> {
                FieldRegistry::new().field("when", |e: &Event| e.when)
            }
        }

        let style_bold = SpecCellStyle::new(SpecStyleAttrs {
            bold: Some(true),
            ..Default::default()
        });
        let template = SheetTemplate::<Event>::new()
            .with_header(false)
            .include_fields(["when"])
            .column({
                let style_bold = style_bold.clone();
                move |c| c.field("when").title("When (bold)").style(style_bold)
            })
            .column({
                let style_bold = style_bold.clone();
                move |c| c.value(|_: &Event| "label").style(style_bold)
            });
        let l_events = vec![
            Event {
                when: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            },
            Event {
                when: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            },
        ];

        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let sheet = {
            let mut cursor = writer.sheet("Dates").unwrap();
            cursor.write_records(&l_events, &template).unwrap();
            cursor.sheet_id()
        };
        let document = writer.document();

        let h_plain_date = document.cell_style(sheet, 0, 0).unwrap();
        assert_eq!(
            writer.style_cache().lookup(&[writer.date_style().id()]),
            Some(h_plain_date)
        );
        let attrs_plain_date = document.style_attrs(h_plain_date).unwrap();
        assert_eq!(attrs_plain_date.date, Some(true));
        assert_eq!(attrs_plain_date.date_pattern.as_deref(), Some("yyyy-mm-dd"));

        let h_bold_date = document.cell_style(sheet, 0, 1).unwrap();
        let h_bold = document.cell_style(sheet, 0, 2).unwrap();
        assert_ne!(h_bold_date, h_bold);
        assert_eq!(
            writer
                .style_cache()
                .lookup(&[writer.default_styles().data.id(), style_bold.id()]),
            Some(h_bold)
        );
        assert_eq!(document.style_attrs(h_bold).unwrap().date, None);
        let attrs_bold_date = document.style_attrs(h_bold_date).unwrap();
        assert_eq!(attrs_bold_date.bold, Some(true));
        assert_eq!(attrs_bold_date.date, Some(true));
        assert_eq!(document.cell_style(sheet, 1, 1), Some(h_bold_date));
    }

    #[test]
    fn test_explicit_date_style_skips_the_cache() {
        #[derive(Debug, Clone)]
        struct Event {
            when: NaiveDate,
        }
        impl SheetRecord for Event {
            fn field_registry() -> FieldRegistry<Self> {
                FieldRegistry::new().field("when", |e: &Event| e.when)
            }
        }

        let style_bold = SpecCellStyle::new(SpecStyleAttrs::default()).with_bold();
        let template = SheetTemplate::<Event>::new().with_header(false).column({
            let style_bold = style_bold.clone();
            move |c| c.field("when").style(style_bold)
        });
        let l_events: Vec<Event> = (1..=3)
            .map(|n_day| Event {
                when: NaiveDate::from_ymd_opt(2024, 2, n_day).unwrap(),
            })
            .collect();

        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let sheet = {
            let mut cursor = writer.sheet("Dates").unwrap();
            cursor.write_records(&l_events, &template).unwrap();
            cursor.sheet_id()
        };

        let id_data = writer.default_styles().data.id();
        assert_eq!(writer.style_cache().lookup(&[id_data, style_bold.id()]), None);
        assert_eq!(writer.style_cache().rendered_count(), 0);
        let document = writer.document();
        let h_date = document.cell_style(sheet, 0, 0).unwrap();
        assert_eq!(document.cell_style(sheet, 2, 0), Some(h_date));
        let attrs = document.style_attrs(h_date).unwrap();
        assert_eq!(attrs.bold, Some(true));
        assert_eq!(attrs.date, Some(true));
        assert!(!style_bold.is_date());
        assert!(writer.date_style().is_date());
    }

    #[test]
    fn test_default_presets_apply_when_template_leaves_styles_unset() {
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let sheet = {
            let mut cursor = writer.sheet("S").unwrap();
            cursor
                .write_records(
                    &derive_products()[..2],
                    &SheetTemplate::<Product>::new()
                        .include_fields(["name"])
                        .with_metadata_row(true),
                )
                .unwrap();
            cursor.sheet_id()
        };
        let document = writer.document();

        let h_metadata = document.cell_style(sheet, 0, 0).unwrap();
        assert_eq!(document.style_attrs(h_metadata).unwrap().italic, Some(true));
        let h_header = document.cell_style(sheet, 1, 0).unwrap();
        let attrs_header = document.style_attrs(h_header).unwrap();
        assert_eq!(attrs_header.bold, Some(true));
        assert_eq!(
            writer.style_cache().lookup(&[writer.default_styles().header.id()]),
            Some(h_header)
        );
        let h_data = document.cell_style(sheet, 2, 0).unwrap();
        assert_eq!(document.style_attrs(h_data).unwrap().bold, None);
        assert_eq!(document.cell_style(sheet, 3, 0), Some(h_data));

        let style_header = SpecCellStyle::new(SpecStyleAttrs::default()).with_bg_color("#FFFF00");
        let sheet_custom = {
            let mut cursor = writer.sheet("Custom").unwrap();
            cursor
                .write_records(
                    &derive_products()[..1],
                    &SheetTemplate::<Product>::new()
                        .include_fields(["name"])
                        .header_style(style_header),
                )
                .unwrap();
            cursor.sheet_id()
        };
        let document = writer.document();
        let attrs_custom = document
            .style_attrs(document.cell_style(sheet_custom, 0, 0).unwrap())
            .unwrap();
        assert_eq!(attrs_custom.bold, None);
        assert_eq!(attrs_custom.bg_color.as_deref(), Some("#FFFF00"));
    }

    #[test]
    fn test_write_cell_huge_span_is_rejected() {
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let mut cursor = writer.sheet("S").unwrap();
        cursor.go_to(3, 0).unwrap();
        assert!(matches!(
            cursor.write_cell(SpecCellContent::new("x").span(usize::MAX, 1)),
            Err(SheetError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            cursor.write_cell(SpecCellContent::new("x").span(1, usize::MAX)),
            Err(SheetError::InvalidCoordinate(_))
        ));
        assert_eq!(cursor.pointer(), SpecCellCoord::new(3, 0));
        assert_eq!(cursor.pivot(), SpecCellCoord::new(3, 0));
        let sheet = cursor.sheet_id();
        assert_eq!(writer.document().read_cell(sheet, 3, 0), SpecCellRead::blank());
    }

    #[test]
    fn test_extraction_failures_are_isolated() {
        let template = SheetTemplate::<Product>::new()
            .include_fields(["name"])
            .column(|c| {
                c.title("Ratio").try_value(|p: &Product| match p.quantity {
                    2 => Err("bad quantity".to_string()),
                    n => Ok(100.0 / n as f64),
                })
            })
            .include_fields(["missing"]);
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let mut cursor = writer.sheet("S").unwrap();
        let report = cursor
            .write_records(&derive_products()[..3], &template)
            .unwrap();

        assert_eq!(report.rows_written, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].kind, EnumFailureKind::UnresolvedField);
        assert_eq!(report.failures[0].column, "missing");
        assert_eq!(report.failures[0].row, None);
        assert_eq!(report.failures[1].kind, EnumFailureKind::ExtractionFailure);
        assert_eq!(report.failures[1].row, Some(2));
        assert_eq!(report.failures[1].column, "Ratio");
        assert_eq!(report.warnings.len(), 1);

        let sheet = cursor.sheet_id();
        let document = writer.document();
        assert_eq!(document.read_cell(sheet, 2, 1), SpecCellRead::blank());
        assert_eq!(
            document.read_cell(sheet, 3, 1).value,
            EnumCellValue::Number(100.0 / 3.0)
        );
        assert_eq!(writer.report().len(), 1);
    }

    #[test]
    fn test_expanded_rows_and_mismatches() {
        #[derive(Debug, Clone)]
        struct Order {
            code: &'static str,
            l_lines: Option<Vec<Line>>,
        }
        #[derive(Debug, Clone)]
        struct Line {
            sku: &'static str,
        }
        impl SheetRecord for Order {
            fn field_registry() -> FieldRegistry<Self> {
                FieldRegistry::new().field("code", |o: &Order| o.code)
            }
        }
        impl SheetRecord for Line {
            fn field_registry() -> FieldRegistry<Self> {
                FieldRegistry::new().field("sku", |l: &Line| l.sku)
            }
        }

        let template = SheetTemplate::<Order>::new()
            .column(|c| c.field("code").merge_on_value())
            .expand_rows(|o: &Order| o.l_lines.clone(), |nested| nested.include_fields(["sku"]));
        let l_orders = vec![
            Order {
                code: "A",
                l_lines: Some(vec![Line { sku: "a1" }, Line { sku: "a2" }]),
            },
            Order {
                code: "B",
                l_lines: None,
            },
            Order {
                code: "C",
                l_lines: Some(vec![]),
            },
            Order {
                code: "D",
                l_lines: Some(vec![Line { sku: "d1" }]),
            },
        ];

        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let mut cursor = writer.sheet("Orders").unwrap();
        let report = cursor.write_records(&l_orders, &template).unwrap();

        assert_eq!(report.rows_written, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, EnumFailureKind::FlattenTypeMismatch);
        assert_eq!(
            report.merges,
            vec![SpecMergedRegion {
                row_from: 1,
                row_to: 2,
                col_from: 0,
                col_to: 0,
            }]
        );
        let sheet = cursor.sheet_id();
        let document = writer.document();
        assert_eq!(document.read_cell(sheet, 2, 1).value, "a2".into());
        assert_eq!(document.read_cell(sheet, 3, 0).value, "D".into());
    }

    #[test]
    fn test_two_level_expansion_reads_each_depth() {
        #[derive(Debug, Clone)]
        struct Order {
            code: &'static str,
            l_lines: Vec<Line>,
        }
        #[derive(Debug, Clone)]
        struct Line {
            sku: &'static str,
            l_lots: Vec<Lot>,
        }
        #[derive(Debug, Clone)]
        struct Lot {
            lot: String,
        }
        impl SheetRecord for Order {
            fn field_registry() -> FieldRegistry<Self> {
                FieldRegistry::new().field("code", |o: &Order| o.code)
            }
        }
        impl SheetRecord for Line {
            fn field_registry() -> FieldRegistry<Self> {
                FieldRegistry::new().field("sku", |l: &Line| l.sku)
            }
        }
        impl SheetRecord for Lot {
            fn field_registry() -> FieldRegistry<Self> {
                FieldRegistry::new().field("lot", |l: &Lot| l.lot.clone())
            }
        }

        let derive_lots =
            |sku: &str| -> Vec<Lot> { (1..=3).map(|n| Lot { lot: format!("{sku}-{n}") }).collect() };
        let l_orders = vec![Order {
            code: "O-1",
            l_lines: vec![
                Line {
                    sku: "L1",
                    l_lots: derive_lots("L1"),
                },
                Line {
                    sku: "L2",
                    l_lots: derive_lots("L2"),
                },
            ],
        }];
        let template = SheetTemplate::<Order>::new().include_fields(["code"]).expand_rows(
            |o: &Order| Some(o.l_lines.clone()),
            |lines| {
                lines
                    .include_fields(["sku"])
                    .expand_rows(|l: &Line| Some(l.l_lots.clone()), |lots| lots.include_fields(["lot"]))
            },
        );

        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let mut cursor = writer.sheet("Lots").unwrap();
        let report = cursor.write_records(&l_orders, &template).unwrap();
        assert_eq!(report.rows_written, 6);
        assert!(report.failures.is_empty());
        assert_eq!(cursor.pivot(), SpecCellCoord::new(6, 2));

        let sheet = cursor.sheet_id();
        let document = writer.document();
        let l_lots: Vec<EnumCellValue> = (1..=6)
            .map(|n_row| document.read_cell(sheet, n_row, 2).value)
            .collect();
        let l_lots_expected: Vec<EnumCellValue> = ["L1-1", "L1-2", "L1-3", "L2-1", "L2-2", "L2-3"]
            .iter()
            .map(|lot| (*lot).into())
            .collect();
        assert_eq!(l_lots, l_lots_expected);
        assert_eq!(document.read_cell(sheet, 3, 1).value, "L1".into());
        assert_eq!(document.read_cell(sheet, 4, 1).value, "L2".into());
        assert_eq!(document.read_cell(sheet, 6, 0).value, "O-1".into());
    }

    #[test]
    fn test_document_mut_rows_are_respected_by_new_cursors() {
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        assert_eq!(writer.file_out(), None);
        let sheet = writer.document_mut().get_or_create_sheet("Pre").unwrap();
        writer
            .document_mut()
            .set_cell_value(sheet, 2, 0, "seed".into())
            .unwrap();
        let mut cursor = writer.sheet("Pre").unwrap();
        assert_eq!(cursor.next_unused_row(), 3);
        assert_eq!(cursor.enter().unwrap(), SpecCellCoord::new(3, 0));
    }

    #[test]
    fn test_auto_size_and_fixed_widths() {
        let template = SheetTemplate::<Product>::new()
            .include_fields(["name"])
            .column(|c| c.field("brand").width(30.0))
            .with_auto_size(true);
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let sheet = {
            let mut cursor = writer.sheet("S").unwrap();
            cursor.write_records(&derive_products(), &template).unwrap();
            cursor.sheet_id()
        };
        assert_eq!(writer.document().column_width(sheet, 0), Some(9.0));
        assert_eq!(writer.document().column_width(sheet, 1), Some(30.0));
    }

    #[test]
    fn test_style_render_failure_aborts_the_call() {
        let style_bad = SpecCellStyle::new(SpecStyleAttrs {
            bg_color: Some("not-a-color".to_string()),
            ..Default::default()
        });
        let template = SheetTemplate::<Product>::new().header_style(style_bad).include_fields(["name"]);
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let mut cursor = writer.sheet("S").unwrap();
        assert!(matches!(
            cursor.write_records(&derive_products(), &template),
            Err(SheetError::StyleRender(_))
        ));
    }

    #[test]
    fn test_invalid_start_is_rejected() {
        let template = SheetTemplate::<Product>::new()
            .include_fields(["name"])
            .start_at(-1, 0);
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        let mut cursor = writer.sheet("S").unwrap();
        assert!(matches!(
            cursor.write_records(&derive_products(), &template),
            Err(SheetError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_new_sheet_names_are_unique() {
        let mut writer = XlsxWriter::with_document(XlsxDocument::new());
        writer.sheet("Data").unwrap();
        let name_second = writer.new_sheet("Data").unwrap().name().to_string();
        let name_third = writer.new_sheet("Data").unwrap().name().to_string();
        assert_eq!(name_second, "Data__2");
        assert_eq!(name_third, "Data__3");
    }

    #[test]
    fn test_close_saves_once_and_blocks_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut writer = XlsxWriter::create(&path);
        assert_eq!(writer.file_out(), Some(path.as_path()));
        writer
            .sheet("Products")
            .unwrap()
            .write_records(&derive_products(), &derive_product_template())
            .unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(path.exists());
        assert!(matches!(writer.sheet("Products"), Err(SheetError::Closed)));

        let loaded = XlsxDocument::open(&path).unwrap();
        let sheet = loaded.sheet_by_name("Products").unwrap();
        assert_eq!(loaded.read_cell(sheet, 1, 0).value, "Tucson".into());
        assert_eq!(loaded.read_cell(sheet, 2, 2).value, EnumCellValue::None);
    }
}
