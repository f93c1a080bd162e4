//! End-to-end verification of the access layer against the scripted driver.
//!
//! Covers the guarantees callers rely on:
//! - Zero rows: absence signal for single-row shapes, empty vec for sequences
//! - Empty-string cells are absent from the decoded row
//! - Integer and float families normalize uniformly, null included
//! - A timestamp query yields one row with one non-empty text value
//! - Query rendering for the log
//! - One-shot log suppression
//! - `call` treats an empty result as fatal
//! - Credentials never reach log output

#[cfg(test)]
mod tests {
    use crate::driver::{MemoryConnection, MemoryDriver, ScriptedResult};
    use crate::error::DbError;
    use crate::logging::RecordingSink;
    use crate::models::{ConnectionConfig, Param, RawValue, Value};
    use crate::params;
    use crate::services::query_log::render_query;
    use crate::Database;
    use std::sync::Arc;

    async fn database() -> (Database<MemoryDriver>, MemoryConnection) {
        let driver = MemoryDriver::new();
        let conn = driver.connection().clone();
        let db = Database::new(driver, ConnectionConfig::new("db.internal", "svc", "hunter2", "shop"));
        db.connect().await.unwrap();
        (db, conn)
    }

    // =========================================================================
    // Zero rows
    // =========================================================================

    #[tokio::test]
    async fn test_zero_rows_get_row_is_no_rows() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::empty(&[("id", "int4")]));

        let err = db.get_row("SELECT * FROM t WHERE 1=0", &[]).await.unwrap_err();
        assert!(err.is_no_rows());
    }

    #[tokio::test]
    async fn test_zero_rows_get_field_is_no_rows() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::empty(&[("id", "int4")]));

        let err = db.get_field("SELECT id FROM t WHERE 1=0", "id", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::NoRows));
    }

    #[tokio::test]
    async fn test_zero_rows_get_rows_is_empty() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::empty(&[("id", "int4")]));

        let rows = db.get_rows("SELECT * FROM t WHERE 1=0", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    // =========================================================================
    // Empty-string cells
    // =========================================================================

    #[tokio::test]
    async fn test_empty_string_cell_is_absent() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::rows(
            &[("id", "int4"), ("nickname", "varchar")],
            vec![vec![RawValue::I32(5), RawValue::Bytes(Vec::new())]],
        ));

        let row = db.get_row("SELECT id, nickname FROM users", &[]).await.unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("nickname"), None);

        conn.push_result(ScriptedResult::rows(
            &[("nickname", "varchar")],
            vec![vec![RawValue::Text(String::new())]],
        ));
        let err = db.get_field("SELECT nickname FROM users", "nickname", &[]).await.unwrap_err();
        assert!(err.is_no_rows());
    }

    // =========================================================================
    // Type normalization through the façade
    // =========================================================================

    #[tokio::test]
    async fn test_integer_family_including_null() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::rows(
            &[("a", "int2"), ("b", "int4"), ("c", "int8"), ("d", "oid"), ("e", "int8")],
            vec![vec![
                RawValue::I16(-2),
                RawValue::I32(40_000),
                RawValue::I64(i64::MAX),
                RawValue::U32(26),
                RawValue::Null,
            ]],
        ));

        let row = db.get_row("SELECT a, b, c, d, e FROM nums", &[]).await.unwrap();
        assert_eq!(row.get("a"), Some(&Value::Int(-2)));
        assert_eq!(row.get("b"), Some(&Value::Int(40_000)));
        assert_eq!(row.get("c"), Some(&Value::Int(i64::MAX)));
        assert_eq!(row.get("d"), Some(&Value::Int(26)));
        assert_eq!(row.get("e"), Some(&Value::Int(0)));
    }

    #[tokio::test]
    async fn test_float_family_including_null() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::rows(
            &[("price", "numeric"), ("ratio", "float4"), ("score", "float8")],
            vec![vec![RawValue::Text("19.99".into()), RawValue::F32(0.25), RawValue::Null]],
        ));

        let row = db.get_row("SELECT price, ratio, score FROM items", &[]).await.unwrap();
        assert_eq!(row.get("price"), Some(&Value::Float(19.99)));
        assert_eq!(row.get("ratio"), Some(&Value::Float(0.25)));
        assert_eq!(row.get("score"), Some(&Value::Float(0.0)));
    }

    #[tokio::test]
    async fn test_select_now_yields_one_text_value() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::rows(
            &[("now", "timestamptz")],
            vec![vec![RawValue::Text("2024-05-01T12:00:00.123456+00:00".into())]],
        ));

        let rows = db.get_rows("SELECT NOW()", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
        let now = rows[0].get("now").and_then(Value::as_str).unwrap();
        assert!(!now.is_empty());
    }

    #[tokio::test]
    async fn test_rows_serialize_as_plain_json_objects() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::rows(
            &[("id", "int4"), ("name", "text"), ("active", "bool")],
            vec![vec![RawValue::I32(1), RawValue::Text("ann".into()), RawValue::Bool(true)]],
        ));

        let rows = db.get_rows("SELECT id, name, active FROM users", &[]).await.unwrap();
        let json = serde_json::to_string(&rows).unwrap();
        assert_eq!(json, r#"[{"id":1,"name":"ann","active":true}]"#);
    }

    // =========================================================================
    // Query logging
    // =========================================================================

    #[test]
    fn test_rendered_query_substitutes_params() {
        assert_eq!(
            render_query("SELECT * FROM t WHERE id=?", &[Param::from(1)]),
            "SELECT * FROM t WHERE id=1"
        );
    }

    #[tokio::test]
    async fn test_suppression_applies_to_exactly_next_call() {
        let (db, _conn) = database().await;
        let sink = Arc::new(RecordingSink::new());
        db.attach_logger(sink.clone());

        db.skip_next_query_log();
        db.execute("UPDATE t SET seen=1", &[]).await.unwrap();
        assert!(sink.entries().is_empty());

        db.execute("UPDATE t SET seen=?", &params![2]).await.unwrap();
        db.execute("UPDATE t SET seen=?", &params![3]).await.unwrap();
        let messages = sink.debug_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1], "UPDATE t SET seen=2");
        assert_eq!(messages[3], "UPDATE t SET seen=3");
    }

    #[tokio::test]
    async fn test_suppression_is_consumed_without_logger() {
        let (db, _conn) = database().await;

        db.skip_next_query_log();
        db.get_rows("SELECT 1", &[]).await.unwrap();

        let sink = Arc::new(RecordingSink::new());
        db.attach_logger(sink.clone());
        db.get_rows("SELECT 2", &[]).await.unwrap();
        assert_eq!(sink.debug_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_no_logger_is_silent() {
        let (db, conn) = database().await;
        db.get_rows("SELECT 1", &[]).await.unwrap();
        assert_eq!(conn.statements().len(), 1);
    }

    // =========================================================================
    // Fatal empty call
    // =========================================================================

    #[tokio::test]
    #[should_panic]
    async fn test_call_on_zero_rows_panics() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::empty(&[("result", "int4")]));
        let _ = db.call("CALL refresh_stats()", &[]).await;
    }

    #[tokio::test]
    async fn test_call_query_error_is_returned_not_panicked() {
        let (db, conn) = database().await;
        conn.push_result(ScriptedResult::QueryError("procedure does not exist".into()));

        let err = db.call("CALL missing()", &[]).await.unwrap_err();
        assert_eq!(err.category(), "Query");
    }

    // =========================================================================
    // Cursor hygiene
    // =========================================================================

    #[tokio::test]
    async fn test_every_read_shape_closes_its_cursor() {
        let (db, conn) = database().await;
        for _ in 0..3 {
            conn.push_result(ScriptedResult::rows(&[("id", "int4")], vec![vec![RawValue::I32(1)]]));
        }
        conn.push_result(
            ScriptedResult::rows(&[("id", "int4")], vec![vec![RawValue::I32(1)]]).failing_at(0),
        );

        db.get_rows("SELECT id FROM t", &[]).await.unwrap();
        db.get_row("SELECT id FROM t", &[]).await.unwrap();
        db.get_field("SELECT id FROM t", "id", &[]).await.unwrap();
        assert!(db.get_rows("SELECT id FROM t", &[]).await.is_err());

        assert_eq!(conn.cursors_closed(), 4);
    }

    // =========================================================================
    // Credentials stay out of logs
    // =========================================================================

    #[tokio::test]
    async fn test_password_not_in_debug_or_serialized_output() {
        let (db, _conn) = database().await;

        assert!(!format!("{db:?}").contains("hunter2"));
        assert!(!db.config().display_url().contains("hunter2"));
        assert!(!serde_json::to_string(db.config()).unwrap().contains("hunter2"));
    }
}
