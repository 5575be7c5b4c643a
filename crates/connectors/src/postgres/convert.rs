//! PostgreSQL rows to Arrow record batches.

use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float32Builder, Float64Builder, Int16Builder,
    Int32Builder, Int64Builder, StringBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use keiba_error::{ErrorCode, ErrorContext, KeibaError, Result};
use std::sync::Arc;
use tokio_postgres::types::Type;
use tokio_postgres::{Column, Row};

use super::numeric::PgNumeric;

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const UTC: &str = "UTC";

/// Arrow type for a PostgreSQL column type, if it has one.
pub fn map_pg_type(ty: &Type) -> Option<DataType> {
    let dt = match *ty {
        Type::BOOL => DataType::Boolean,
        Type::INT2 => DataType::Int16,
        Type::INT4 => DataType::Int32,
        Type::INT8 => DataType::Int64,
        Type::FLOAT4 => DataType::Float32,
        Type::FLOAT8 | Type::NUMERIC => DataType::Float64,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => DataType::Utf8,
        Type::DATE => DataType::Date32,
        Type::TIMESTAMP => DataType::Timestamp(TimeUnit::Microsecond, None),
        Type::TIMESTAMPTZ => DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into())),
        _ => return None,
    };
    Some(dt)
}

/// Schema of a prepared statement's result columns. Every field is nullable.
pub fn schema_for(columns: &[Column]) -> Result<SchemaRef> {
    let fields = columns
        .iter()
        .map(|col| {
            map_pg_type(col.type_())
                .map(|dt| Field::new(col.name(), dt, true))
                .ok_or_else(|| unsupported_column(col))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

fn unsupported_column(col: &Column) -> KeibaError {
    KeibaError::new(
        ErrorCode::UnsupportedColumnType,
        format!(
            "Column '{}' has unsupported type '{}'",
            col.name(),
            col.type_().name()
        ),
    )
    .with_context(ErrorContext::Column {
        column: col.name().to_string(),
        pg_type: col.type_().name().to_string(),
    })
    .with_hint(format!("Cast it in the query, e.g. {}::text", col.name()))
}

enum ColumnBuilder {
    Bool(BooleanBuilder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Numeric(Float64Builder),
    Utf8(StringBuilder),
    Date32(Date32Builder),
    Timestamp(TimestampMicrosecondBuilder),
    TimestampTz(TimestampMicrosecondBuilder),
}

impl ColumnBuilder {
    fn for_type(ty: &Type, capacity: usize) -> Option<Self> {
        let builder = match *ty {
            Type::BOOL => Self::Bool(BooleanBuilder::with_capacity(capacity)),
            Type::INT2 => Self::Int16(Int16Builder::with_capacity(capacity)),
            Type::INT4 => Self::Int32(Int32Builder::with_capacity(capacity)),
            Type::INT8 => Self::Int64(Int64Builder::with_capacity(capacity)),
            Type::FLOAT4 => Self::Float32(Float32Builder::with_capacity(capacity)),
            Type::FLOAT8 => Self::Float64(Float64Builder::with_capacity(capacity)),
            Type::NUMERIC => Self::Numeric(Float64Builder::with_capacity(capacity)),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                Self::Utf8(StringBuilder::with_capacity(capacity, capacity * 16))
            }
            Type::DATE => Self::Date32(Date32Builder::with_capacity(capacity)),
            Type::TIMESTAMP => {
                Self::Timestamp(TimestampMicrosecondBuilder::with_capacity(capacity))
            }
            Type::TIMESTAMPTZ => Self::TimestampTz(
                TimestampMicrosecondBuilder::with_capacity(capacity).with_timezone(UTC),
            ),
            _ => return None,
        };
        Some(builder)
    }

    fn append(&mut self, row: &Row, idx: usize) -> Result<()> {
        match self {
            Self::Bool(b) => b.append_option(row.try_get::<_, Option<bool>>(idx)?),
            Self::Int16(b) => b.append_option(row.try_get::<_, Option<i16>>(idx)?),
            Self::Int32(b) => b.append_option(row.try_get::<_, Option<i32>>(idx)?),
            Self::Int64(b) => b.append_option(row.try_get::<_, Option<i64>>(idx)?),
            Self::Float32(b) => b.append_option(row.try_get::<_, Option<f32>>(idx)?),
            Self::Float64(b) => b.append_option(row.try_get::<_, Option<f64>>(idx)?),
            Self::Numeric(b) => {
                b.append_option(row.try_get::<_, Option<PgNumeric>>(idx)?.map(|n| n.0))
            }
            Self::Utf8(b) => b.append_option(row.try_get::<_, Option<&str>>(idx)?),
            Self::Date32(b) => b.append_option(
                row.try_get::<_, Option<NaiveDate>>(idx)?
                    .map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
            ),
            Self::Timestamp(b) => b.append_option(
                row.try_get::<_, Option<NaiveDateTime>>(idx)?
                    .map(|ts| ts.and_utc().timestamp_micros()),
            ),
            Self::TimestampTz(b) => b.append_option(
                row.try_get::<_, Option<DateTime<Utc>>>(idx)?
                    .map(|ts| ts.timestamp_micros()),
            ),
        }
        Ok(())
    }

    fn finish(self) -> ArrayRef {
        match self {
            Self::Bool(mut b) => Arc::new(b.finish()),
            Self::Int16(mut b) => Arc::new(b.finish()),
            Self::Int32(mut b) => Arc::new(b.finish()),
            Self::Int64(mut b) => Arc::new(b.finish()),
            Self::Float32(mut b) => Arc::new(b.finish()),
            Self::Float64(mut b) | Self::Numeric(mut b) => Arc::new(b.finish()),
            Self::Utf8(mut b) => Arc::new(b.finish()),
            Self::Date32(mut b) => Arc::new(b.finish()),
            Self::Timestamp(mut b) | Self::TimestampTz(mut b) => Arc::new(b.finish()),
        }
    }
}

/// Build one record batch holding every row.
///
/// `columns` are the statement's result columns, in the same order as
/// `schema` (see [`schema_for`]).
pub fn rows_to_batch(schema: SchemaRef, columns: &[Column], rows: &[Row]) -> Result<RecordBatch> {
    let mut builders = columns
        .iter()
        .map(|col| ColumnBuilder::for_type(col.type_(), rows.len()).ok_or_else(|| unsupported_column(col)))
        .collect::<Result<Vec<_>>>()?;

    for row in rows {
        for (idx, builder) in builders.iter_mut().enumerate() {
            builder.append(row, idx)?;
        }
    }

    let arrays: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
}
