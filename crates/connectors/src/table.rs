use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use keiba_error::Result;

/// A fully materialized query result: named columns plus the rows as Arrow
/// record batches. The schema is kept separately so an empty result still
/// knows its columns.
///
/// Two tables are equal when they have the same schema and the same rows,
/// however those rows are split into batches.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(schema, Vec::new())
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    /// All rows in one batch, regardless of how they were chunked.
    pub fn to_single_batch(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// ASCII rendering for terminals and log lines.
    pub fn pretty(&self) -> Result<String> {
        if self.batches.is_empty() {
            // The pretty printer needs at least one batch to print headers
            let header_only = RecordBatch::new_empty(self.schema.clone());
            return Ok(arrow::util::pretty::pretty_format_batches(&[header_only])?.to_string());
        }
        Ok(arrow::util::pretty::pretty_format_batches(&self.batches)?.to_string())
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        if self.schema != other.schema || self.num_rows() != other.num_rows() {
            return false;
        }
        match (self.to_single_batch(), other.to_single_batch()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn track_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("code", DataType::Int32, true),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    fn batch(codes: Vec<i32>, names: Vec<&str>) -> RecordBatch {
        RecordBatch::try_new(
            track_schema(),
            vec![
                Arc::new(Int32Array::from(codes)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_counts_span_batches() {
        let table = Table::new(
            track_schema(),
            vec![batch(vec![1, 2], vec!["Sapporo", "Hakodate"]), batch(vec![5], vec!["Tokyo"])],
        );
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.column_names(), vec!["code", "name"]);
        assert!(!table.is_empty());

        let single = table.to_single_batch().unwrap();
        assert_eq!(single.num_rows(), 3);
    }

    #[test]
    fn test_equality_ignores_batch_boundaries() {
        let chunked = Table::new(
            track_schema(),
            vec![batch(vec![1, 2], vec!["Sapporo", "Hakodate"]), batch(vec![5], vec!["Tokyo"])],
        );
        let whole = Table::new(
            track_schema(),
            vec![batch(vec![1, 2, 5], vec!["Sapporo", "Hakodate", "Tokyo"])],
        );
        assert_eq!(chunked, whole);

        let reordered = Table::new(
            track_schema(),
            vec![batch(vec![5, 1, 2], vec!["Tokyo", "Sapporo", "Hakodate"])],
        );
        assert_ne!(whole, reordered);
        assert_eq!(Table::empty(track_schema()), Table::new(track_schema(), vec![]));
    }

    #[test]
    fn test_empty_table_keeps_columns() {
        let table = Table::empty(track_schema());
        assert!(table.is_empty());
        assert_eq!(table.column_names(), vec!["code", "name"]);

        let rendered = table.pretty().unwrap();
        assert!(rendered.contains("code"));
        assert!(rendered.contains("name"));
    }

    #[test]
    fn test_pretty_contains_values() {
        let table = Table::new(track_schema(), vec![batch(vec![5], vec!["Tokyo"])]);
        let rendered = table.pretty().unwrap();
        assert!(rendered.contains("Tokyo"));
        assert!(rendered.contains("| 5 "));
    }
}
