//! Row-oriented tabular materialization

use arrow::datatypes::SchemaRef;
use arrow::json::reader::ReaderBuilder;
use arrow::json::writer::JsonArray;
use arrow::json::WriterBuilder;
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};

use crate::EngineError;

/// A fully materialized table of JSON values.
///
/// The Arrow schema is carried along so a frame can be loaded back into the
/// engine with its original column types.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    schema: SchemaRef,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self, EngineError> {
        let mut writer = WriterBuilder::new()
            .with_explicit_nulls(true)
            .build::<_, JsonArray>(Vec::new());
        writer.write_batches(&[batch])?;
        writer.finish()?;
        let buf = writer.into_inner();

        // An empty batch writes nothing at all
        let objects: Vec<Map<String, Value>> = if buf.is_empty() {
            Vec::new()
        } else {
            serde_json::from_slice(&buf)?
        };

        let schema = batch.schema();
        let rows = objects
            .into_iter()
            .map(|mut object| {
                schema
                    .fields()
                    .iter()
                    .map(|field| object.remove(field.name()).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Ok(Self { schema, rows })
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch, EngineError> {
        let objects: Vec<Map<String, Value>> = self
            .rows
            .iter()
            .map(|row| {
                self.schema
                    .fields()
                    .iter()
                    .zip(row)
                    .map(|(field, value)| (field.name().clone(), value.clone()))
                    .collect()
            })
            .collect();

        let mut decoder = ReaderBuilder::new(self.schema.clone())
            .with_batch_size(objects.len().max(1))
            .build_decoder()?;
        decoder.serialize(&objects)?;

        Ok(decoder
            .flush()?
            .unwrap_or_else(|| RecordBatch::new_empty(self.schema.clone())))
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn columns(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Values of the named column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.schema.index_of(name).ok()?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }
}
