//! Record accessors, column mappers and sheet templates.
//!
//! A record type registers its named fields once ([`SheetRecord`]). Templates
//! resolve names against that registry when they are built, then compile into
//! type-erased columns that read a fixed depth of a flattened row.

use std::any::Any;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime};

use crate::flatten::{ExpandFn, derive_expand_fn};
use crate::spec::{EnumCellValue, SheetError, SpecCellCoord, SpecCellStyle};
use crate::util::{
    convert_datetime_to_excel_serial, convert_excel_serial_to_datetime, derive_column_title,
    humanize_field_name, parse_cell_address, validate_cell_coord,
};

type GetterFn<T> = Rc<dyn Fn(&T) -> EnumCellValue>;
type SetterFn<T> = Rc<dyn Fn(&mut T, &EnumCellValue) -> Result<(), String>>;
type ValueFn<T> = Rc<dyn Fn(&T) -> Result<EnumCellValue, String>>;
type StyleFn<T> = Rc<dyn Fn(&T) -> Result<Option<SpecCellStyle>, String>>;
type KeyFn<T> = Rc<dyn Fn(&T) -> EnumCellValue>;

pub(crate) type ErasedValueFn = Box<dyn Fn(&(dyn Any + 'static)) -> Result<EnumCellValue, String>>;
pub(crate) type ErasedStyleFn =
    Box<dyn Fn(&(dyn Any + 'static)) -> Result<Option<SpecCellStyle>, String>>;
pub(crate) type ErasedKeyFn = Box<dyn Fn(&(dyn Any + 'static)) -> Option<EnumCellValue>>;
pub(crate) type ErasedSetterFn =
    Box<dyn Fn(&mut (dyn Any + 'static), &EnumCellValue) -> Result<(), String>>;

////////////////////////////////////////////////////////////////////////////////
// #region CellConversion

/// Typed conversion from a read-back cell value.
pub trait FromCellValue: Sized {
    /// Convert `value`, or describe why it cannot be converted.
    fn from_cell_value(value: &EnumCellValue) -> Result<Self, String>;
}

fn derive_conversion_error(value: &EnumCellValue, target: &str) -> String {
    format!("cannot convert {value:?} into {target}")
}

impl FromCellValue for String {
    fn from_cell_value(value: &EnumCellValue) -> Result<Self, String> {
        match value {
            EnumCellValue::Text(val) => Ok(val.clone()),
            EnumCellValue::None => Err(derive_conversion_error(value, "String")),
            _ => Ok(value.to_display_text()),
        }
    }
}

impl FromCellValue for f64 {
    fn from_cell_value(value: &EnumCellValue) -> Result<Self, String> {
        match value {
            EnumCellValue::Number(val) => Ok(*val),
            EnumCellValue::Date(val) => Ok(convert_datetime_to_excel_serial(val)),
            EnumCellValue::Text(val) => val
                .trim()
                .parse()
                .map_err(|_| derive_conversion_error(value, "f64")),
            _ => Err(derive_conversion_error(value, "f64")),
        }
    }
}

macro_rules! impl_from_cell_value_integer {
    ($($ty:ty),*) => {
        $(
            impl FromCellValue for $ty {
                fn from_cell_value(value: &EnumCellValue) -> Result<Self, String> {
                    match value {
                        EnumCellValue::Number(val)
                            if val.fract() == 0.0
                                && *val >= <$ty>::MIN as f64
                                && *val <= <$ty>::MAX as f64 =>
                        {
                            Ok(*val as $ty)
                        }
                        EnumCellValue::Text(val) => val
                            .trim()
                            .parse()
                            .map_err(|_| derive_conversion_error(value, stringify!($ty))),
                        _ => Err(derive_conversion_error(value, stringify!($ty))),
                    }
                }
            }
        )*
    };
}

impl_from_cell_value_integer!(i32, i64, u32, u64, usize);

impl FromCellValue for bool {
    fn from_cell_value(value: &EnumCellValue) -> Result<Self, String> {
        match value {
            EnumCellValue::Boolean(val) => Ok(*val),
            EnumCellValue::Number(val) if *val == 0.0 || *val == 1.0 => Ok(*val == 1.0),
            EnumCellValue::Text(val) => match val.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(derive_conversion_error(value, "bool")),
            },
            _ => Err(derive_conversion_error(value, "bool")),
        }
    }
}

impl FromCellValue for NaiveDateTime {
    fn from_cell_value(value: &EnumCellValue) -> Result<Self, String> {
        match value {
            EnumCellValue::Date(val) => Ok(*val),
            EnumCellValue::Number(val) => convert_excel_serial_to_datetime(*val)
                .ok_or_else(|| derive_conversion_error(value, "NaiveDateTime")),
            EnumCellValue::Text(val) => {
                let c_text = val.trim();
                NaiveDateTime::parse_from_str(c_text, "%Y-%m-%d %H:%M:%S")
                    .or_else(|_| {
                        NaiveDate::parse_from_str(c_text, "%Y-%m-%d")
                            .map(|date| date.and_time(chrono::NaiveTime::MIN))
                    })
                    .map_err(|_| derive_conversion_error(value, "NaiveDateTime"))
            }
            _ => Err(derive_conversion_error(value, "NaiveDateTime")),
        }
    }
}

impl FromCellValue for NaiveDate {
    fn from_cell_value(value: &EnumCellValue) -> Result<Self, String> {
        NaiveDateTime::from_cell_value(value)
            .map(|val| val.date())
            .map_err(|_| derive_conversion_error(value, "NaiveDate"))
    }
}

impl<V: FromCellValue> FromCellValue for Option<V> {
    fn from_cell_value(value: &EnumCellValue) -> Result<Self, String> {
        match value {
            EnumCellValue::None => Ok(None),
            _ => V::from_cell_value(value).map(Some),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FieldRegistry

struct SpecFieldAccessor<T> {
    name: String,
    get: GetterFn<T>,
    set: Option<SetterFn<T>>,
}

/// Named field accessors of one record type.
pub struct FieldRegistry<T> {
    l_fields: Vec<SpecFieldAccessor<T>>,
}

impl<T> Default for FieldRegistry<T> {
    fn default() -> Self {
        Self {
            l_fields: Vec::new(),
        }
    }
}

impl<T: 'static> FieldRegistry<T> {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read-only field. Re-registering a name replaces it.
    pub fn field<V>(mut self, name: &str, get: impl Fn(&T) -> V + 'static) -> Self
    where
        V: Into<EnumCellValue>,
    {
        self.insert(SpecFieldAccessor {
            name: name.to_string(),
            get: Rc::new(move |record: &T| -> EnumCellValue { get(record).into() }),
            set: None,
        });
        self
    }

    /// Register a field that can also be filled when reading records back.
    pub fn field_rw<V>(
        mut self,
        name: &str,
        get: impl Fn(&T) -> V + 'static,
        set: impl Fn(&mut T, V) + 'static,
    ) -> Self
    where
        V: Into<EnumCellValue> + FromCellValue,
    {
        self.insert(SpecFieldAccessor {
            name: name.to_string(),
            get: Rc::new(move |record: &T| -> EnumCellValue { get(record).into() }),
            set: Some(Rc::new(
                move |record: &mut T, value: &EnumCellValue| -> Result<(), String> {
                    set(record, V::from_cell_value(value)?);
                    Ok(())
                },
            )),
        });
        self
    }

    /// Whether `name` resolves.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Registered field names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.l_fields.iter().map(|field| field.name.as_str()).collect()
    }

    fn resolve(&self, name: &str) -> Option<&SpecFieldAccessor<T>> {
        self.l_fields.iter().find(|field| field.name == name)
    }

    fn insert(&mut self, accessor: SpecFieldAccessor<T>) {
        match self.l_fields.iter_mut().find(|field| field.name == accessor.name) {
            Some(field) => *field = accessor,
            None => self.l_fields.push(accessor),
        }
    }
}

/// Record type with a field registry built once per type.
pub trait SheetRecord: Sized + 'static {
    /// Named field accessors of this type.
    fn field_registry() -> FieldRegistry<Self>;
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnMapper

enum EnumMergeRule<T> {
    None,
    OnValue,
    OnId(KeyFn<T>),
}

/// Builder of one column mapper, used inside [`SheetTemplate::column`].
pub struct ColumnBuilder<T> {
    field: Option<String>,
    value: Option<ValueFn<T>>,
    title: Option<String>,
    style: Option<SpecCellStyle>,
    style_by: Option<StyleFn<T>>,
    merge: EnumMergeRule<T>,
    width: Option<f64>,
}

impl<T: 'static> ColumnBuilder<T> {
    fn new() -> Self {
        Self {
            field: None,
            value: None,
            title: None,
            style: None,
            style_by: None,
            merge: EnumMergeRule::None,
            width: None,
        }
    }

    /// Bind the column to a registered field.
    pub fn field(mut self, name: &str) -> Self {
        self.field = Some(name.to_string());
        self
    }

    /// Derive the cell value from the record.
    pub fn value<V>(mut self, value: impl Fn(&T) -> V + 'static) -> Self
    where
        V: Into<EnumCellValue>,
    {
        self.value = Some(Rc::new(
            move |record: &T| -> Result<EnumCellValue, String> { Ok(value(record).into()) },
        ));
        self
    }

    /// Derive the cell value with a function that may fail per record.
    ///
    /// A failure leaves the cell empty and is reported.
    pub fn try_value<V>(mut self, value: impl Fn(&T) -> Result<V, String> + 'static) -> Self
    where
        V: Into<EnumCellValue>,
    {
        self.value = Some(Rc::new(
            move |record: &T| -> Result<EnumCellValue, String> { value(record).map(Into::into) },
        ));
        self
    }

    /// Header title.
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Column style fragment, layered over the template data style.
    pub fn style(mut self, style: SpecCellStyle) -> Self {
        self.style = Some(style);
        self
    }

    /// Per-record style fragment, layered last.
    ///
    /// Return clones of hoisted fragments: the style cache keys by fragment
    /// identity, so building a new fragment per record renders a new style.
    pub fn style_by(mut self, style_by: impl Fn(&T) -> Option<SpecCellStyle> + 'static) -> Self {
        self.style_by = Some(Rc::new(
            move |record: &T| -> Result<Option<SpecCellStyle>, String> { Ok(style_by(record)) },
        ));
        self
    }

    /// Per-record style fragment from a function that may fail.
    pub fn try_style_by(
        mut self,
        style_by: impl Fn(&T) -> Result<Option<SpecCellStyle>, String> + 'static,
    ) -> Self {
        self.style_by = Some(Rc::new(style_by));
        self
    }

    /// Merge contiguous rows producing the same cell value.
    pub fn merge_on_value(mut self) -> Self {
        self.merge = EnumMergeRule::OnValue;
        self
    }

    /// Merge contiguous rows sharing the same id; blank ids fall back to the cell value.
    pub fn merge_on_id<V>(mut self, id: impl Fn(&T) -> V + 'static) -> Self
    where
        V: Into<EnumCellValue>,
    {
        self.merge = EnumMergeRule::OnId(Rc::new(move |record: &T| -> EnumCellValue {
            id(record).into()
        }));
        self
    }

    /// Fixed column width in character units.
    pub fn width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }
}

struct ColumnMapper<T> {
    field: Option<String>,
    title: String,
    value: ValueFn<T>,
    style: Option<SpecCellStyle>,
    style_by: Option<StyleFn<T>>,
    merge: EnumMergeRule<T>,
    width: Option<f64>,
    set: Option<SetterFn<T>>,
}

impl<T: 'static> ColumnMapper<T> {
    fn compile(&self, depth: usize) -> CompiledColumn {
        let value = Rc::clone(&self.value);
        let style_by = self.style_by.clone();
        let merge = match &self.merge {
            EnumMergeRule::None => EnumCompiledMerge::None,
            EnumMergeRule::OnValue => EnumCompiledMerge::OnValue,
            EnumMergeRule::OnId(key) => {
                let key = Rc::clone(key);
                EnumCompiledMerge::OnId(Box::new(move |element: &(dyn Any + 'static)| {
                    element.downcast_ref::<T>().map(|record| key(record))
                }))
            }
        };
        let setter = match (&self.set, depth) {
            (Some(set), 0) => {
                let set = Rc::clone(set);
                let setter: ErasedSetterFn = Box::new(
                    move |record: &mut (dyn Any + 'static), value: &EnumCellValue| {
                        let record = record
                            .downcast_mut::<T>()
                            .ok_or_else(|| "record type mismatch".to_string())?;
                        set(record, value)
                    },
                );
                Some(setter)
            }
            _ => None,
        };

        CompiledColumn {
            depth,
            key: self.field.clone().unwrap_or_else(|| self.title.clone()),
            title: self.title.clone(),
            value: Box::new(move |element: &(dyn Any + 'static)| {
                let record = element
                    .downcast_ref::<T>()
                    .ok_or_else(|| format!("element type mismatch at depth {depth}"))?;
                value(record)
            }),
            style: self.style.clone(),
            style_by: style_by.map(|style_by| {
                let style_by: ErasedStyleFn = Box::new(move |element: &(dyn Any + 'static)| {
                    let record = element
                        .downcast_ref::<T>()
                        .ok_or_else(|| format!("element type mismatch at depth {depth}"))?;
                    style_by(record)
                });
                style_by
            }),
            merge,
            width: self.width,
            setter,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Template

trait TemplateExpansion {
    fn compile_into(&self, depth: usize, compiled: &mut CompiledTemplate) -> Result<(), SheetError>;
}

struct SpecRowExpansion<T, U: 'static> {
    extract: Rc<dyn Fn(&T) -> Option<Vec<U>>>,
    nested: SheetTemplate<U>,
}

impl<T: 'static, U: 'static> TemplateExpansion for SpecRowExpansion<T, U> {
    fn compile_into(&self, depth: usize, compiled: &mut CompiledTemplate) -> Result<(), SheetError> {
        let extract = Rc::clone(&self.extract);
        compiled
            .l_levels
            .push(derive_expand_fn(move |record: &T| extract(record)));
        self.nested.compile_into(depth + 1, compiled)
    }
}

enum EnumTemplateEntry<T> {
    Column(ColumnMapper<T>),
    Expand(Box<dyn TemplateExpansion>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EnumStartAt {
    Coord(i64, i64),
    Address(String),
}

/// Declarative layout of a record collection in a sheet.
pub struct SheetTemplate<T: 'static> {
    registry: FieldRegistry<T>,
    l_entries: Vec<EnumTemplateEntry<T>>,
    l_warnings: Vec<String>,
    l_unresolved: Vec<String>,
    start_at: Option<EnumStartAt>,
    pub(crate) style_header: Option<SpecCellStyle>,
    pub(crate) style_data: Option<SpecCellStyle>,
    pub(crate) style_metadata: Option<SpecCellStyle>,
    pub(crate) if_header: bool,
    pub(crate) if_metadata_row: bool,
    pub(crate) if_auto_size: bool,
}

impl<T: SheetRecord> SheetTemplate<T> {
    /// Empty template over the registered fields of `T`.
    pub fn new() -> Self {
        Self::with_registry(T::field_registry())
    }
}

impl<T: SheetRecord> Default for SheetTemplate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> SheetTemplate<T> {
    /// Empty template over an explicit registry.
    pub fn with_registry(registry: FieldRegistry<T>) -> Self {
        Self {
            registry,
            l_entries: Vec::new(),
            l_warnings: Vec::new(),
            l_unresolved: Vec::new(),
            start_at: None,
            style_header: None,
            style_data: None,
            style_metadata: None,
            if_header: true,
            if_metadata_row: false,
            if_auto_size: false,
        }
    }

    /// Append one column per resolvable field not already mapped.
    pub fn include_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            if self.has_field_column(name) {
                continue;
            }
            let Some(accessor) = self.registry.resolve(name) else {
                self.warn_unresolved(name);
                continue;
            };
            let get = Rc::clone(&accessor.get);
            let mapper = ColumnMapper {
                field: Some(name.to_string()),
                title: humanize_field_name(name),
                value: Rc::new(move |record: &T| -> Result<EnumCellValue, String> {
                    Ok(get(record))
                }),
                style: None,
                style_by: None,
                merge: EnumMergeRule::None,
                width: None,
                set: accessor.set.clone(),
            };
            self.l_entries.push(EnumTemplateEntry::Column(mapper));
        }
        self
    }

    /// Append one column configured by `configure`.
    ///
    /// The column is kept only when it has a value function or a field that
    /// resolves on `T`.
    pub fn column(mut self, configure: impl FnOnce(ColumnBuilder<T>) -> ColumnBuilder<T>) -> Self {
        let builder = configure(ColumnBuilder::new());
        let accessor = builder
            .field
            .as_deref()
            .and_then(|name| self.registry.resolve(name));

        let value = match (&builder.value, accessor) {
            (Some(value), _) => Rc::clone(value),
            (None, Some(accessor)) => {
                let get = Rc::clone(&accessor.get);
                let value: ValueFn<T> =
                    Rc::new(move |record: &T| -> Result<EnumCellValue, String> { Ok(get(record)) });
                value
            }
            (None, None) => {
                let name = builder.field.clone().unwrap_or_default();
                self.warn_unresolved(&name);
                return self;
            }
        };
        let set = accessor.and_then(|accessor| accessor.set.clone());
        let title = builder.title.clone().unwrap_or_else(|| match &builder.field {
            Some(name) => humanize_field_name(name),
            None => derive_column_title(self.column_entry_count() + 1),
        });

        self.l_entries.push(EnumTemplateEntry::Column(ColumnMapper {
            field: builder.field,
            title,
            value,
            style: builder.style,
            style_by: builder.style_by,
            merge: builder.merge,
            width: builder.width,
            set,
        }));
        self
    }

    /// Expand each record into one row per element of a nested collection.
    ///
    /// Columns of `configure`'s template read the element; they are placed
    /// where the expansion is declared. Only one expansion per level compiles.
    pub fn expand_rows<U: SheetRecord>(
        mut self,
        extract: impl Fn(&T) -> Option<Vec<U>> + 'static,
        configure: impl FnOnce(SheetTemplate<U>) -> SheetTemplate<U>,
    ) -> Self {
        let nested = configure(SheetTemplate::<U>::new());
        self.l_entries
            .push(EnumTemplateEntry::Expand(Box::new(SpecRowExpansion {
                extract: Rc::new(extract),
                nested,
            })));
        self
    }

    /// Header row style.
    pub fn header_style(mut self, style: SpecCellStyle) -> Self {
        self.style_header = Some(style);
        self
    }

    /// Base style of every data cell.
    pub fn data_style(mut self, style: SpecCellStyle) -> Self {
        self.style_data = Some(style);
        self
    }

    /// Metadata row style.
    pub fn metadata_style(mut self, style: SpecCellStyle) -> Self {
        self.style_metadata = Some(style);
        self
    }

    /// Anchor the block at `(row, col)` instead of the cursor pointer.
    pub fn start_at(mut self, row: i64, col: i64) -> Self {
        self.start_at = Some(EnumStartAt::Coord(row, col));
        self
    }

    /// Anchor the block at an A1-style address.
    pub fn start_at_address(mut self, address: &str) -> Self {
        self.start_at = Some(EnumStartAt::Address(address.to_string()));
        self
    }

    /// Toggle the header row (on by default).
    pub fn with_header(mut self, if_header: bool) -> Self {
        self.if_header = if_header;
        self
    }

    /// Toggle the metadata row holding field keys (off by default).
    pub fn with_metadata_row(mut self, if_metadata_row: bool) -> Self {
        self.if_metadata_row = if_metadata_row;
        self
    }

    /// Toggle column auto-size (off by default).
    pub fn with_auto_size(mut self, if_auto_size: bool) -> Self {
        self.if_auto_size = if_auto_size;
        self
    }

    /// Warnings collected while building.
    pub fn warnings(&self) -> &[String] {
        &self.l_warnings
    }

    /// Field names whose columns were dropped because they do not resolve.
    pub fn unresolved_fields(&self) -> &[String] {
        &self.l_unresolved
    }

    /// Resolve the configured anchor, if any.
    pub(crate) fn derive_start_at(&self) -> Result<Option<SpecCellCoord>, SheetError> {
        match &self.start_at {
            None => Ok(None),
            Some(EnumStartAt::Address(address)) => parse_cell_address(address).map(Some),
            Some(EnumStartAt::Coord(row, col)) => {
                if *row < 0 || *col < 0 {
                    return Err(SheetError::InvalidCoordinate(format!(
                        "negative start ({row}, {col})"
                    )));
                }
                validate_cell_coord(*row as usize, *col as usize).map(Some)
            }
        }
    }

    /// Compile into type-erased columns and expansion levels.
    pub fn compile(&self) -> Result<CompiledTemplate, SheetError> {
        let mut compiled = CompiledTemplate {
            l_columns: Vec::new(),
            l_levels: Vec::new(),
            l_warnings: Vec::new(),
            l_unresolved: Vec::new(),
        };
        self.compile_into(0, &mut compiled)?;
        Ok(compiled)
    }

    fn compile_into(&self, depth: usize, compiled: &mut CompiledTemplate) -> Result<(), SheetError> {
        let n_expansions = self
            .l_entries
            .iter()
            .filter(|entry| matches!(entry, EnumTemplateEntry::Expand(_)))
            .count();
        if n_expansions > 1 {
            return Err(SheetError::MalformedTemplate(format!(
                "at most one row expansion per level, found {n_expansions} at depth {depth}"
            )));
        }

        compiled.l_warnings.extend(self.l_warnings.iter().cloned());
        compiled.l_unresolved.extend(self.l_unresolved.iter().cloned());
        for entry in &self.l_entries {
            match entry {
                EnumTemplateEntry::Column(mapper) => compiled.l_columns.push(mapper.compile(depth)),
                EnumTemplateEntry::Expand(expansion) => expansion.compile_into(depth, compiled)?,
            }
        }
        Ok(())
    }

    fn has_field_column(&self, name: &str) -> bool {
        self.l_entries.iter().any(|entry| match entry {
            EnumTemplateEntry::Column(mapper) => mapper.field.as_deref() == Some(name),
            EnumTemplateEntry::Expand(_) => false,
        })
    }

    fn column_entry_count(&self) -> usize {
        self.l_entries
            .iter()
            .filter(|entry| matches!(entry, EnumTemplateEntry::Column(_)))
            .count()
    }

    fn warn_unresolved(&mut self, name: &str) {
        tracing::warn!(target: "xlsx", field = name, "column_dropped_unresolved_field");
        self.l_warnings
            .push(format!("Dropped column: field {name:?} does not resolve."));
        self.l_unresolved.push(name.to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CompiledTemplate

pub(crate) enum EnumCompiledMerge {
    None,
    OnValue,
    OnId(ErasedKeyFn),
}

pub(crate) struct CompiledColumn {
    pub(crate) depth: usize,
    pub(crate) key: String,
    pub(crate) title: String,
    pub(crate) value: ErasedValueFn,
    pub(crate) style: Option<SpecCellStyle>,
    pub(crate) style_by: Option<ErasedStyleFn>,
    pub(crate) merge: EnumCompiledMerge,
    pub(crate) width: Option<f64>,
    pub(crate) setter: Option<ErasedSetterFn>,
}

impl CompiledColumn {
    /// Comparison key of the merge run, `None` when the column does not merge.
    pub(crate) fn derive_merge_key(
        &self,
        element: &(dyn Any + 'static),
        value: &EnumCellValue,
    ) -> Option<EnumCellValue> {
        match &self.merge {
            EnumCompiledMerge::None => None,
            EnumCompiledMerge::OnValue => Some(value.clone()),
            EnumCompiledMerge::OnId(key) => match key(element) {
                Some(id) if !id.is_none() => Some(id),
                _ => Some(value.clone()),
            },
        }
    }
}

/// Template compiled against flattened rows.
pub struct CompiledTemplate {
    pub(crate) l_columns: Vec<CompiledColumn>,
    pub(crate) l_levels: Vec<ExpandFn>,
    pub(crate) l_warnings: Vec<String>,
    pub(crate) l_unresolved: Vec<String>,
}

impl CompiledTemplate {
    /// Column titles in output order.
    pub fn titles(&self) -> Vec<&str> {
        self.l_columns.iter().map(|col| col.title.as_str()).collect()
    }

    /// Column keys (field names, or titles for transform-only columns).
    pub fn keys(&self) -> Vec<&str> {
        self.l_columns.iter().map(|col| col.key.as_str()).collect()
    }

    /// Depth each column reads from.
    pub fn depths(&self) -> Vec<usize> {
        self.l_columns.iter().map(|col| col.depth).collect()
    }

    /// Number of expansion levels.
    pub fn level_count(&self) -> usize {
        self.l_levels.len()
    }

    /// Warnings collected across nested templates.
    pub fn warnings(&self) -> &[String] {
        &self.l_warnings
    }

    /// Unresolved field names collected across nested templates.
    pub fn unresolved_fields(&self) -> &[String] {
        &self.l_unresolved
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
