//! XLSX constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{
    EnumHorizontalAlign, EnumVerticalAlign, SpecAuthorOptions, SpecBorderSide, SpecCellStyle,
    SpecDefaultStyles, SpecStyleAttrs,
};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];
/// Largest font size Excel accepts.
pub const N_FONT_SIZE_MAX: i64 = 409;
/// Largest border line style index understood by xlsxwriter.
pub const N_BORDER_LINE_MAX: i64 = 13;

/// Pattern of the built-in date style.
pub const C_DATE_PATTERN_DEFAULT: &str = "yyyy-mm-dd";
/// Title prefix synthesized for transform-only columns.
pub const C_COLUMN_TITLE_PREFIX: &str = "Column";

/// Build default named style presets used by [`crate::writer::XlsxWriter`] templates.
pub fn derive_default_author_styles() -> BTreeMap<String, SpecStyleAttrs> {
    let cfg_base_style = SpecStyleAttrs {
        font_name: Some("Calibri".to_string()),
        font_size: Some(11),
        valign: Some(EnumVerticalAlign::Center),
        ..Default::default()
    };

    let mut dict_style = BTreeMap::new();
    dict_style.insert("data".to_string(), cfg_base_style.clone());
    dict_style.insert(
        "header".to_string(),
        crate::style::layer(
            &cfg_base_style,
            &SpecStyleAttrs {
                bold: Some(true),
                align: Some(EnumHorizontalAlign::Center),
                borders: Some(SpecBorderSide::all(1)),
                ..Default::default()
            },
        ),
    );
    dict_style.insert(
        "metadata".to_string(),
        crate::style::layer(
            &cfg_base_style,
            &SpecStyleAttrs {
                italic: Some(true),
                font_color: Some("#808080".to_string()),
                ..Default::default()
            },
        ),
    );

    dict_style
}

/// Hoist the default presets into fragments owned by one writer session.
pub fn derive_default_author_fragments() -> SpecDefaultStyles {
    let mut dict_style = derive_default_author_styles();
    let mut take = |key: &str| SpecCellStyle::new(dict_style.remove(key).unwrap_or_default());
    SpecDefaultStyles {
        header: take("header"),
        data: take("data"),
        metadata: take("metadata"),
    }
}

/// Build default authoring options.
pub fn derive_default_author_options() -> SpecAuthorOptions {
    SpecAuthorOptions::default()
}
