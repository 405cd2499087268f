//! Stateless helper utilities used by the authoring engine.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::conf::{
    C_COLUMN_TITLE_PREFIX, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
    TUP_EXCEL_ILLEGAL,
};
use crate::spec::{SheetError, SpecAutofitCellsPolicy, SpecCellCoord};

////////////////////////////////////////////////////////////////////////////////
// #region AddressParsing

/// Parse an A1-style address (`"B3"`, `"$AA$10"`) into a zero-based coordinate.
pub fn parse_cell_address(address: &str) -> Result<SpecCellCoord, SheetError> {
    let c_address = address.trim().replace('$', "").to_ascii_uppercase();
    let n_split = c_address
        .find(|chr: char| chr.is_ascii_digit())
        .ok_or_else(|| SheetError::InvalidCoordinate(format!("Missing row in {address:?}")))?;
    let (c_col, c_row) = c_address.split_at(n_split);

    if c_col.is_empty() || !c_col.chars().all(|chr| chr.is_ascii_uppercase()) {
        return Err(SheetError::InvalidCoordinate(format!(
            "Missing or invalid column in {address:?}"
        )));
    }
    if !c_row.chars().all(|chr| chr.is_ascii_digit()) {
        return Err(SheetError::InvalidCoordinate(format!(
            "Invalid row in {address:?}"
        )));
    }

    let mut n_col = 0usize;
    for chr in c_col.chars() {
        n_col = n_col
            .checked_mul(26)
            .and_then(|val| val.checked_add(chr as usize - 'A' as usize + 1))
            .ok_or_else(|| SheetError::InvalidCoordinate(format!("Column overflow in {address:?}")))?;
    }
    let n_row: usize = c_row
        .parse()
        .map_err(|_| SheetError::InvalidCoordinate(format!("Invalid row in {address:?}")))?;
    if n_row == 0 {
        return Err(SheetError::InvalidCoordinate(format!(
            "Row numbers start at 1: {address:?}"
        )));
    }

    validate_cell_coord(n_row - 1, n_col - 1)
}

/// Check a coordinate against Excel limits.
pub fn validate_cell_coord(row: usize, col: usize) -> Result<SpecCellCoord, SheetError> {
    if row >= N_NROWS_EXCEL_MAX {
        return Err(SheetError::InvalidCoordinate(format!(
            "row {row} exceeds Excel limit {N_NROWS_EXCEL_MAX}"
        )));
    }
    if col >= N_NCOLS_EXCEL_MAX {
        return Err(SheetError::InvalidCoordinate(format!(
            "column {col} exceeds Excel limit {N_NCOLS_EXCEL_MAX}"
        )));
    }
    Ok(SpecCellCoord::new(row, col))
}

/// Offset `coord` by `n_rows` x `n_cols` and check the result against Excel limits.
pub fn offset_cell_coord(
    coord: SpecCellCoord,
    n_rows: usize,
    n_cols: usize,
) -> Result<SpecCellCoord, SheetError> {
    let n_row = coord.row.checked_add(n_rows).ok_or_else(|| {
        SheetError::InvalidCoordinate(format!("row offset {n_rows} overflows from {}", coord.row))
    })?;
    let n_col = coord.col.checked_add(n_cols).ok_or_else(|| {
        SheetError::InvalidCoordinate(format!("column offset {n_cols} overflows from {}", coord.col))
    })?;
    validate_cell_coord(n_row, n_col)
}

/// Convert a zero-based column index into letters (`0 -> A`, `26 -> AA`).
pub fn derive_column_letters(col: usize) -> String {
    let mut v_chars = Vec::new();
    let mut n_rest = col + 1;
    while n_rest > 0 {
        let n_rem = (n_rest - 1) % 26;
        v_chars.push((b'A' + n_rem as u8) as char);
        n_rest = (n_rest - 1) / 26;
    }
    v_chars.iter().rev().collect()
}

/// Render a zero-based coordinate as A1 address.
pub fn derive_cell_address(coord: SpecCellCoord) -> String {
    format!("{}{}", derive_column_letters(coord.col), coord.row + 1)
}

/// Convert row index into xlsxwriter row number.
pub fn cast_row_num(value: usize) -> Result<u32, SheetError> {
    u32::try_from(value).map_err(|_| SheetError::InvalidCoordinate(format!("row index overflow: {value}")))
}

/// Convert column index into xlsxwriter column number.
pub fn cast_col_num(value: usize) -> Result<u16, SheetError> {
    u16::try_from(value)
        .map_err(|_| SheetError::InvalidCoordinate(format!("column index overflow: {value}")))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TitleAndSheetNames

/// Turn a field name into a display title (`category_name`, `categoryName` -> `Category Name`).
pub fn humanize_field_name(name: &str) -> String {
    let mut l_words: Vec<String> = Vec::new();
    let mut c_word = String::new();
    let mut chr_prev: Option<char> = None;

    for chr in name.chars() {
        if chr == '_' || chr == '-' || chr == '.' || chr.is_whitespace() {
            if !c_word.is_empty() {
                l_words.push(std::mem::take(&mut c_word));
            }
        } else if chr.is_uppercase() && chr_prev.is_some_and(|val| val.is_lowercase() || val.is_ascii_digit()) {
            if !c_word.is_empty() {
                l_words.push(std::mem::take(&mut c_word));
            }
            c_word.push(chr);
        } else {
            c_word.push(chr);
        }
        chr_prev = Some(chr);
    }
    if !c_word.is_empty() {
        l_words.push(c_word);
    }

    l_words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(chr_first) => chr_first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title for a transform-only column at 1-based `position`.
pub fn derive_column_title(position_1based: usize) -> String {
    format!("{C_COLUMN_TITLE_PREFIX} {position_1based}")
}

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DatesAndWidths

fn derive_excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_time(chrono::NaiveTime::MIN)
}

/// Convert a datetime into an Excel 1900-system serial number.
pub fn convert_datetime_to_excel_serial(value: &NaiveDateTime) -> f64 {
    let delta = *value - derive_excel_epoch();
    delta.num_milliseconds() as f64 / 86_400_000.0
}

/// Convert an Excel 1900-system serial number into a datetime.
///
/// Returns `None` for serials outside chrono's range.
pub fn convert_excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let n_millis = (serial * 86_400_000.0).round() as i64;
    derive_excel_epoch().checked_add_signed(TimeDelta::try_milliseconds(n_millis)?)
}

/// Estimate displayed width units for one text value.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

/// Clamp a recorded width with autofit policy bounds and padding.
pub fn derive_autofit_width(width_recorded: usize, policy: &SpecAutofitCellsPolicy) -> f64 {
    let n_min = usize::max(1, policy.width_cell_min);
    let n_max = usize::min(255, usize::max(n_min, policy.width_cell_max));
    usize::min(n_max, usize::max(n_min, width_recorded + policy.width_cell_padding)) as f64
}

/// Validate autofit policy bounds.
pub fn validate_policy_autofit(policy_autofit: &SpecAutofitCellsPolicy) -> Result<(), SheetError> {
    if policy_autofit.width_cell_min == 0 {
        return Err(SheetError::MalformedTemplate(
            "policy_autofit.width_cell_min must be >= 1.".to_string(),
        ));
    }
    if policy_autofit.width_cell_max < policy_autofit.width_cell_min {
        return Err(SheetError::MalformedTemplate(
            "policy_autofit.width_cell_max must be >= policy_autofit.width_cell_min.".to_string(),
        ));
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_address() {
        assert_eq!(parse_cell_address("A1").unwrap(), SpecCellCoord::new(0, 0));
        assert_eq!(parse_cell_address("b3").unwrap(), SpecCellCoord::new(2, 1));
        assert_eq!(parse_cell_address("$AA$10").unwrap(), SpecCellCoord::new(9, 26));
        for c_bad in ["", "A", "12", "A0", "A-1", "1A", "A1B"] {
            assert!(
                matches!(parse_cell_address(c_bad), Err(SheetError::InvalidCoordinate(_))),
                "{c_bad:?} should be rejected"
            );
        }
        assert!(parse_cell_address("XFE1").is_err());
    }

    #[test]
    fn test_offset_cell_coord_rejects_overflow() {
        let coord = SpecCellCoord::new(3, 2);
        assert_eq!(offset_cell_coord(coord, 1, 2).unwrap(), SpecCellCoord::new(4, 4));
        assert!(matches!(
            offset_cell_coord(coord, usize::MAX, 0),
            Err(SheetError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            offset_cell_coord(coord, 0, usize::MAX),
            Err(SheetError::InvalidCoordinate(_))
        ));
        assert!(offset_cell_coord(coord, N_NROWS_EXCEL_MAX, 0).is_err());
    }

    #[test]
    fn test_column_letters_round_trip_with_address() {
        for n_col in [0, 25, 26, 51, 52, 701, 702, 16_383] {
            let c_addr = derive_cell_address(SpecCellCoord::new(4, n_col));
            assert_eq!(parse_cell_address(&c_addr).unwrap(), SpecCellCoord::new(4, n_col));
        }
        assert_eq!(derive_column_letters(27), "AB");
    }

    #[test]
    fn test_humanize_field_name() {
        assert_eq!(humanize_field_name("category_name"), "Category Name");
        assert_eq!(humanize_field_name("categoryName"), "Category Name");
        assert_eq!(humanize_field_name("name"), "Name");
        assert_eq!(humanize_field_name("__id"), "Id");
        assert_eq!(derive_column_title(3), "Column 3");
    }

    #[test]
    fn test_excel_serial_conversion() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let n_serial = convert_datetime_to_excel_serial(&dt);
        assert!((n_serial - 45_292.5).abs() < 1e-9);
        assert_eq!(convert_excel_serial_to_datetime(n_serial), Some(dt));
        assert_eq!(convert_excel_serial_to_datetime(f64::NAN), None);
    }

    #[test]
    fn test_autofit_width_clamps() {
        let policy = SpecAutofitCellsPolicy::default();
        assert_eq!(derive_autofit_width(1, &policy), 8.0);
        assert_eq!(derive_autofit_width(20, &policy), 22.0);
        assert_eq!(derive_autofit_width(500, &policy), 60.0);
        assert_eq!(estimate_unicode_string_width("ab"), 2);
        assert_eq!(estimate_unicode_string_width("日本"), 3);
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("a/b:c", "_"), "a_b_c");
        assert_eq!(sanitize_sheet_name("   ", "_"), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40), "_").len(), 31);
    }
}
