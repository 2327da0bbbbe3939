use arrow::{
    array::{
        new_null_array, ArrayRef, Float64Array, Int64Array, RecordBatch, RecordBatchOptions,
        StringArray,
    },
    compute::{cast, concat_batches},
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
};
use std::sync::Arc;

/// Named columns of one municipality's rows, in output order.
pub type Columns = Vec<(&'static str, ArrayRef)>;

pub fn text_array(mut values: Vec<Option<String>>, rows: usize) -> ArrayRef {
    values.resize(rows, None);
    Arc::new(StringArray::from(values))
}

/// Upstream arrays shorter than the time axis are padded with nulls.
pub fn float_array(mut values: Vec<Option<f64>>, rows: usize) -> ArrayRef {
    values.resize(rows, None);
    Arc::new(Float64Array::from(values))
}

pub fn int_array(mut values: Vec<Option<i64>>, rows: usize) -> ArrayRef {
    values.resize(rows, None);
    Arc::new(Int64Array::from(values))
}

pub fn empty_batch() -> RecordBatch {
    RecordBatch::new_empty(Arc::new(Schema::empty()))
}

/// Every column is nullable; upstream series carry gaps.
pub fn build_batch(rows: usize, columns: Columns) -> Result<RecordBatch, ArrowError> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let arrays = columns.into_iter().map(|(_, array)| array).collect();
    RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(rows)),
    )
}

/// Row-concatenates `batches` in iteration order, skipping empty ones.
/// The result carries the union of their columns ordered by position in
/// `order`; a batch lacking a column contributes nulls, and a column whose
/// type differs between batches is cast to text.
pub fn concat_aligned(batches: &[RecordBatch], order: &[&str]) -> Result<RecordBatch, ArrowError> {
    let batches: Vec<&RecordBatch> = batches.iter().filter(|b| b.num_rows() > 0).collect();

    let mut fields: Vec<Field> = vec![];
    for batch in &batches {
        for field in batch.schema_ref().fields() {
            match fields.iter_mut().find(|f| f.name() == field.name()) {
                Some(existing) if existing.data_type() != field.data_type() => {
                    *existing = Field::new(field.name(), DataType::Utf8, true);
                }
                Some(_) => {}
                None => fields.push(Field::new(field.name(), field.data_type().clone(), true)),
            }
        }
    }
    fields.sort_by_key(|f| {
        order
            .iter()
            .position(|name| *name == f.name().as_str())
            .unwrap_or(order.len())
    });
    let schema = Arc::new(Schema::new(fields));

    let aligned = batches
        .iter()
        .map(|batch| {
            let columns = schema
                .fields()
                .iter()
                .map(|field| match batch.column_by_name(field.name()) {
                    Some(column) if column.data_type() == field.data_type() => Ok(column.clone()),
                    Some(column) => cast(column, field.data_type()),
                    None => Ok(new_null_array(field.data_type(), batch.num_rows())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            RecordBatch::try_new(schema.clone(), columns)
        })
        .collect::<Result<Vec<_>, _>>()?;

    concat_batches(&schema, &aligned)
}

#[cfg(test)]
pub(crate) fn column_names(batch: &RecordBatch) -> Vec<&str> {
    batch
        .schema_ref()
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect()
}
