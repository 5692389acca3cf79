//! Arrow column helpers shared by validation, standardization and the store.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, LargeStringArray, LargeStringDictionaryBuilder,
    StringArray, UInt32Array,
};
use arrow::compute::{cast, cast_with_options, take, CastOptions};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::schema::LogicalType;

/// View any array as large strings. Nulls stay null.
pub fn as_large_strings(array: &ArrayRef) -> Result<LargeStringArray, ArrowError> {
    let converted = cast(array, &DataType::LargeUtf8)?;
    converted
        .as_any()
        .downcast_ref::<LargeStringArray>()
        .cloned()
        .ok_or_else(|| ArrowError::CastError(format!("cannot view {} as strings", array.data_type())))
}

/// Values of a named column as owned strings, nulls mapped to `""`.
pub fn column_strings(batch: &RecordBatch, name: &str) -> Result<Vec<String>, ArrowError> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| ArrowError::SchemaError(format!("column `{name}` not found")))?;
    let strings = as_large_strings(column)?;
    Ok(strings
        .iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect())
}

/// Null count plus NaN count for floating point columns.
pub fn missing_count(array: &ArrayRef) -> usize {
    let nan = match array.data_type() {
        DataType::Float32 => array
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.iter().flatten().filter(|v| v.is_nan()).count())
            .unwrap_or(0),
        DataType::Float64 => array
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.iter().flatten().filter(|v| v.is_nan()).count())
            .unwrap_or(0),
        _ => 0,
    };
    array.null_count() + nan
}

/// Number of empty strings in a string-like column.
pub fn empty_string_count(array: &ArrayRef) -> Result<usize, ArrowError> {
    let is_string_like = matches!(
        array.data_type(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Dictionary(_, _)
    );
    if !is_string_like {
        return Ok(0);
    }
    let strings = as_large_strings(array)?;
    Ok(strings.iter().flatten().filter(|v| v.is_empty()).count())
}

/// Build a string-like column of the requested logical type.
pub fn string_column<'a, I>(values: I, dtype: LogicalType) -> ArrayRef
where
    I: IntoIterator<Item = &'a str>,
{
    match dtype {
        LogicalType::Categorical => {
            let mut builder = LargeStringDictionaryBuilder::<Int32Type>::new();
            for value in values {
                builder.append_value(value);
            }
            Arc::new(builder.finish())
        }
        LogicalType::String => Arc::new(values.into_iter().map(Some).collect::<StringArray>()),
        _ => Arc::new(
            values
                .into_iter()
                .map(Some)
                .collect::<LargeStringArray>(),
        ),
    }
}

/// Conform an optional source column to a logical type.
///
/// String-like targets fill nulls (and absent columns) with `fill`. Other targets are
/// cast strictly; when the cast fails the column falls back to large strings filled
/// with `fill`. Absent non-string columns become all-null columns of the target type.
pub fn conform_column(
    source: Option<&ArrayRef>,
    num_rows: usize,
    dtype: LogicalType,
    fill: &str,
) -> Result<ArrayRef, ArrowError> {
    if dtype.is_string_like() {
        return filled_strings(source, num_rows, fill, dtype);
    }

    let Some(source) = source else {
        return Ok(arrow::array::new_null_array(&dtype.data_type(), num_rows));
    };
    if source.data_type() == &dtype.data_type() {
        return Ok(Arc::clone(source));
    }

    let strict = CastOptions {
        safe: false,
        ..Default::default()
    };
    match cast_with_options(source, &dtype.data_type(), &strict) {
        Ok(converted) => Ok(converted),
        Err(e) => {
            log::debug!("Cast to {} failed ({}); keeping strings", dtype, e);
            filled_strings(Some(source), num_rows, fill, LogicalType::LargeString)
        }
    }
}

fn filled_strings(
    source: Option<&ArrayRef>,
    num_rows: usize,
    fill: &str,
    dtype: LogicalType,
) -> Result<ArrayRef, ArrowError> {
    match source {
        Some(source) => {
            let strings = as_large_strings(source)?;
            Ok(string_column(
                strings.iter().map(|value| value.unwrap_or(fill)),
                dtype,
            ))
        }
        None => Ok(string_column(std::iter::repeat(fill).take(num_rows), dtype)),
    }
}

/// Cast computed `f64` values to a numeric logical type. Out-of-range values become null.
pub fn numeric_column(values: Vec<f64>, dtype: LogicalType) -> Result<ArrayRef, ArrowError> {
    let array: ArrayRef = Arc::new(Float64Array::from(values));
    if dtype == LogicalType::Float32 || !dtype.is_numeric() {
        return cast(&array, &DataType::Float32);
    }
    cast(&array, &dtype.data_type())
}

/// Assemble a record batch from named columns, tolerating zero columns.
pub fn batch_from_columns(
    columns: Vec<(String, ArrayRef)>,
    num_rows: usize,
) -> Result<RecordBatch, ArrowError> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(name, array.data_type().clone(), true))
        .collect();
    let arrays = columns.into_iter().map(|(_, array)| array).collect();
    RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(num_rows)),
    )
}

/// Select rows by position, in the order given.
pub fn take_rows(batch: &RecordBatch, rows: &[usize]) -> Result<RecordBatch, ArrowError> {
    let indices = UInt32Array::from(rows.iter().map(|&r| r as u32).collect::<Vec<_>>());
    let columns = batch
        .columns()
        .iter()
        .map(|column| take(column.as_ref(), &indices, None))
        .collect::<Result<Vec<_>, _>>()?;
    RecordBatch::try_new_with_options(
        batch.schema(),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(rows.len())),
    )
}
