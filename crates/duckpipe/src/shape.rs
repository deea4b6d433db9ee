//! Shape coercion: collapse a frame into a plain value

use duckpipe_engine::Frame;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Values of the only column, or of the only row.
///
/// A single column wins over a single row, so a 1x1 frame yields its column.
pub fn to_list(frame: &Frame) -> Result<Vec<Value>> {
    let (rows, columns) = frame.shape();

    if columns == 1 {
        Ok(frame.rows().iter().map(|row| row[0].clone()).collect())
    } else if rows == 1 {
        Ok(frame.rows()[0].clone())
    } else {
        Err(Error::Shape {
            expected: "a single row or column",
            rows,
            columns,
        })
    }
}

pub fn to_scalar(frame: &Frame) -> Result<Value> {
    let (rows, columns) = frame.shape();
    to_list(frame)?.into_iter().next().ok_or(Error::Shape {
        expected: "at least one value",
        rows,
        columns,
    })
}

/// Column name to value; column order is kept.
pub fn to_mapping(frame: &Frame) -> Result<Map<String, Value>> {
    let (rows, columns) = frame.shape();
    if rows != 1 {
        return Err(Error::Shape {
            expected: "a single row",
            rows,
            columns,
        });
    }

    Ok(frame
        .columns()
        .into_iter()
        .map(str::to_string)
        .zip(frame.rows()[0].iter().cloned())
        .collect())
}
