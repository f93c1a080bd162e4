//! Row decoding: drives a cursor to completion and builds normalized rows.

use crate::driver::Cursor;
use crate::error::DbError;
use crate::logging::LogSink;
use crate::models::{RawValue, Row};
use crate::services::normalize::{classify_raw, normalize_as, ScanFamily};

/// Decode every remaining row of `cursor`, then close it.
///
/// Cells whose raw value is the empty string are left out of their row
/// entirely. A scan error discards everything decoded so far. The cursor is
/// closed on every path; a close failure is only traced.
///
/// When `diagnostics` is given, columns whose scan type is not recognized get
/// one debug line per cell naming the column, the scan type and the raw kind.
pub async fn decode_rows<C>(
    cursor: &mut C,
    diagnostics: Option<&dyn LogSink>,
) -> Result<Vec<Row>, DbError>
where
    C: Cursor + ?Sized,
{
    let result = drain(cursor, diagnostics).await;

    if let Err(e) = cursor.close().await {
        tracing::warn!(error = %e, "Failed to close cursor");
    }

    result
}

async fn drain<C>(cursor: &mut C, diagnostics: Option<&dyn LogSink>) -> Result<Vec<Row>, DbError>
where
    C: Cursor + ?Sized,
{
    let columns = cursor.columns().to_vec();
    let families: Vec<Option<ScanFamily>> =
        columns.iter().map(|c| ScanFamily::classify(&c.scan_type)).collect();

    // One scratch buffer for the whole result; every cell is taken (reset to
    // NULL) after it is read.
    let mut cells = vec![RawValue::Null; columns.len()];
    let mut rows = Vec::new();

    while cursor.next_row(&mut cells).await? {
        let mut row = Row::with_capacity(columns.len());

        for ((column, family), cell) in columns.iter().zip(&families).zip(cells.iter_mut()) {
            let raw = std::mem::take(cell);
            if raw.is_empty_string() {
                continue;
            }

            let value = match family {
                Some(family) => normalize_as(*family, raw),
                None => {
                    if let Some(sink) = diagnostics {
                        sink.debug(&format!(
                            "type of column {} = {} ({})",
                            column.name,
                            column.scan_type,
                            raw.kind()
                        ));
                    }
                    classify_raw(raw)
                }
            };
            row.insert(column.name.clone(), value);
        }

        rows.push(row);
    }

    tracing::trace!(row_count = rows.len(), "Decoded result set");
    Ok(rows)
}
