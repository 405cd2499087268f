//! Read sheet rows back into typed records through a template.

use std::any::Any;
use std::collections::HashMap;

use crate::document::SheetDocument;
use crate::mapping::SheetTemplate;
use crate::spec::{
    EnumCellType, EnumCellValue, EnumFailureKind, SheetError, SpecCellCoord, SpecCellFailure,
    SpecReadOutcome,
};

/// Read the rows of `sheet_name` into records of `T`.
///
/// The block is located the way `write_records` lays it out: template anchor
/// (or `A1`), then the optional metadata and header rows. With a metadata row,
/// columns are matched by field key; otherwise by position. Blank rows are
/// skipped, blank cells keep the record default, and cells that do not convert
/// are reported without dropping the record. Columns of expanded levels are
/// not read back.
pub fn read_records<T, D>(
    document: &D,
    sheet_name: &str,
    template: &SheetTemplate<T>,
) -> Result<SpecReadOutcome<T>, SheetError>
where
    T: Default + 'static,
    D: SheetDocument + ?Sized,
{
    let sheet = document
        .sheet_by_name(sheet_name)
        .ok_or_else(|| SheetError::SheetNotFound(sheet_name.to_string()))?;
    let compiled = template.compile()?;
    let origin = template
        .derive_start_at()?
        .unwrap_or(SpecCellCoord::new(0, 0));

    let mut outcome = SpecReadOutcome {
        records: Vec::new(),
        failures: Vec::new(),
        warnings: compiled.warnings().to_vec(),
    };
    for name in compiled.unresolved_fields() {
        outcome.failures.push(SpecCellFailure {
            kind: EnumFailureKind::UnresolvedField,
            row: None,
            col: None,
            column: name.clone(),
            message: format!("Field `{name}` is not registered; column dropped."),
        });
    }
    if compiled.level_count() > 0 {
        outcome
            .warnings
            .push("Columns of expanded rows are not read back.".to_string());
    }

    let mut n_row = origin.row;
    let dict_col_by_key: Option<HashMap<String, usize>> = if template.if_metadata_row {
        let mut dict_col_by_key = HashMap::new();
        let mut n_col = origin.col;
        loop {
            let cell = document.read_cell(sheet, n_row, n_col);
            let EnumCellValue::Text(key) = cell.value else {
                break;
            };
            dict_col_by_key.entry(key).or_insert(n_col);
            n_col += 1;
        }
        n_row += 1;
        Some(dict_col_by_key)
    } else {
        None
    };
    if template.if_header {
        n_row += 1;
    }

    let mut l_targets = Vec::new();
    for (n_idx, col) in compiled.l_columns.iter().enumerate() {
        if col.depth != 0 {
            continue;
        }
        let Some(setter) = &col.setter else {
            tracing::debug!(target: "xlsx", column = %col.key, "column_without_setter_skipped");
            continue;
        };
        let n_col = match &dict_col_by_key {
            None => origin.col + n_idx,
            Some(dict_col_by_key) => match dict_col_by_key.get(&col.key) {
                Some(n_col) => *n_col,
                None => {
                    tracing::warn!(target: "xlsx", column = %col.key, "metadata_key_missing");
                    outcome
                        .warnings
                        .push(format!("Metadata row has no key {:?}.", col.key));
                    continue;
                }
            },
        };
        l_targets.push((n_col, col.title.as_str(), setter));
    }

    let Some(n_row_last) = document.last_row_index(sheet) else {
        return Ok(outcome);
    };
    for n_row_cur in n_row..=n_row_last {
        let l_cells: Vec<_> = l_targets
            .iter()
            .map(|(n_col, _, _)| document.read_cell(sheet, n_row_cur, *n_col))
            .collect();
        if l_cells
            .iter()
            .all(|cell| cell.cell_type == EnumCellType::Blank)
        {
            continue;
        }

        let mut record = T::default();
        let record_any: &mut (dyn Any + 'static) = &mut record;
        for ((n_col, title, setter), cell) in l_targets.iter().zip(l_cells) {
            if cell.cell_type == EnumCellType::Blank {
                continue;
            }
            if let Err(message) = setter(&mut *record_any, &cell.value) {
                tracing::warn!(target: "xlsx", row = n_row_cur, col = *n_col, %message, "cell_conversion_failed");
                outcome.failures.push(SpecCellFailure {
                    kind: EnumFailureKind::ConversionFailure,
                    row: Some(n_row_cur),
                    col: Some(*n_col),
                    column: title.to_string(),
                    message,
                });
            }
        }
        outcome.records.push(record);
    }

    tracing::debug!(
        target: "xlsx",
        sheet = sheet_name,
        records = outcome.records.len(),
        failures = outcome.failures.len(),
        "records_read"
    );
    Ok(outcome)
}
