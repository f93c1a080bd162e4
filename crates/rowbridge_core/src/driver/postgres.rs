//! PostgreSQL driver built on tokio-postgres with deadpool-postgres pooling.
//!
//! Statements use `?` placeholders; they are rewritten to `$1..$n` before being
//! sent. Every column reports its PostgreSQL type name as the wire scan type.

use super::{Connection, Cursor, Driver};
use crate::error::DbError;
use crate::models::{ColumnInfo, ConnectionConfig, ExecResult, Param, RawValue};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use futures_util::StreamExt;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{NoTls, RowStream};
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Opens pooled PostgreSQL connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    type Connection = PostgresConnection;

    /// Build the pool and validate it with a test query.
    async fn connect(&self, config: &ConnectionConfig) -> Result<PostgresConnection, DbError> {
        config.validate()?;
        let connect_timeout = config.pool.connect_timeout();

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name(&config.pool.application_name);
        pg_config.options(&format!("-c client_encoding={}", config.charset));
        pg_config.connect_timeout(connect_timeout);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(60));

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig { recycling_method: RecyclingMethod::Fast },
        );

        let pool = Pool::builder(manager)
            .max_size(config.pool.max_size)
            .wait_timeout(Some(config.pool.wait_timeout()))
            .create_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| DbError::connection(format!("Failed to create pool: {e}")))?;

        let client = pool
            .get()
            .await
            .map_err(|e| DbError::connection(format!("Failed to establish connection: {e}")))?;

        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|e| DbError::connection(format!("Connection validation failed: {e}")))?;

        tracing::info!(
            host = %config.host,
            database = %config.database,
            charset = %config.charset,
            "Connection pool created"
        );

        Ok(PostgresConnection { pool })
    }
}

/// A pool of PostgreSQL connections.
pub struct PostgresConnection {
    pool: Pool,
}

impl PostgresConnection {
    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<Object, DbError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    type Cursor = PostgresCursor;

    async fn query(&self, sql: &str, params: &[Param]) -> Result<PostgresCursor, DbError> {
        let client = self.client().await?;
        let sql = rewrite_placeholders(sql);
        let statement = client.prepare_cached(&sql).await?;

        let columns = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_().name()))
            .collect();

        let params: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let stream = client
            .query_raw(&statement, params.iter().map(|p| p as &(dyn ToSql + Sync)))
            .await?;

        Ok(PostgresCursor { columns, stream: Some(Box::pin(stream)), client: Some(client) })
    }

    async fn execute(&self, sql: &str, params: &[Param]) -> Result<ExecResult, DbError> {
        let client = self.client().await?;
        let sql = rewrite_placeholders(sql);

        let params: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows_affected = client.execute(sql.as_str(), &refs).await?;

        Ok(ExecResult { rows_affected, last_insert_id: None })
    }

    async fn ping(&self) -> Result<(), DbError> {
        let client = self.client().await?;
        client.execute("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        self.pool.close();
        tracing::info!("Connection pool closed");
        Ok(())
    }
}

/// Cursor over a streaming PostgreSQL result.
///
/// Keeps its pooled client checked out until closed.
pub struct PostgresCursor {
    columns: Vec<ColumnInfo>,
    stream: Option<Pin<Box<RowStream>>>,
    client: Option<Object>,
}

#[async_trait]
impl Cursor for PostgresCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self, cells: &mut [RawValue]) -> Result<bool, DbError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };

        match stream.next().await {
            Some(Ok(row)) => {
                for (i, cell) in cells.iter_mut().enumerate() {
                    let PgCell(value) = row.try_get::<_, PgCell>(i).map_err(|e| {
                        let column = self.columns.get(i).map(|c| c.name.as_str()).unwrap_or("?");
                        DbError::decode(column, e.to_string())
                    })?;
                    *cell = value;
                }
                Ok(true)
            }
            Some(Err(e)) => Err(DbError::from(e)),
            None => Ok(false),
        }
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.stream = None;
        self.client = None;
        Ok(())
    }
}

/// Rewrite `?` placeholders to `$1..$n`, leaving quoted text alone.
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut next = 0usize;

    for ch in sql.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                out.push(ch);
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => {
                    next += 1;
                    out.push('$');
                    out.push_str(&next.to_string());
                }
                _ => out.push(ch),
            },
        }
    }
    out
}

// ========== Parameter binding ==========

/// Binds a [`Param`] to whatever type the server inferred for its slot.
///
/// Values are converted to the slot's binary form: text is parsed for numeric,
/// boolean, uuid, json and temporal slots, and numbers are encoded as NUMERIC
/// where the slot asks for it. A value that cannot be converted is rejected
/// before anything is sent.
#[derive(Debug)]
struct PgParam<'a>(&'a Param);

fn is_text_type(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN)
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Param::Null => Ok(IsNull::Yes),
            Param::Bool(v) => bind_bool(*v, ty, out),
            Param::Int(v) => bind_int(*v, ty, out),
            Param::Float(v) => bind_float(*v, ty, out),
            Param::Text(s) => bind_text(s, ty, out),
            Param::Bytes(b) => b.as_slice().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bind_bool(v: bool, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => v.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::NUMERIC => bind_int(i64::from(v), ty, out),
        _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
        _ => Err(format!("cannot bind a boolean to {ty}").into()),
    }
}

fn bind_int(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => encode_numeric(&v.to_string(), out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
        _ => Err(format!("cannot bind an integer to {ty}").into()),
    }
}

fn bind_float(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => encode_numeric(&float_literal(v), out),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
            if !v.is_finite() || v.fract() != 0.0 {
                return Err(format!("{v} is not an integer").into());
            }
            bind_int(v as i64, ty, out)
        }
        _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
        _ => Err(format!("cannot bind a float to {ty}").into()),
    }
}

fn bind_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let trimmed = s.trim();
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => bind_int(trimmed.parse()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => bind_float(trimmed.parse()?, ty, out),
        Type::NUMERIC => encode_numeric(trimmed, out),
        Type::BOOL => parse_bool(trimmed)?.to_sql(ty, out),
        Type::UUID => Uuid::parse_str(trimmed)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(trimmed)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamptz(trimmed)?.to_sql(ty, out),
        // Text-like slots, enums and domains all take the text itself.
        _ => s.to_sql(ty, out),
    }
}

fn parse_bool(text: &str) -> Result<bool, BoxError> {
    match text.to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "y" | "yes" | "on" => Ok(true),
        "f" | "false" | "0" | "n" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid boolean {text:?}").into()),
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn parse_timestamptz(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| parse_timestamp(text).map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc)))
}

fn float_literal(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        // f64 Display never uses exponent notation.
        v.to_string()
    }
}

// ========== Cell decoding ==========

/// A cell decoded from the binary wire format into a [`RawValue`].
///
/// Integer and float types decode to their native widths; NUMERIC, character,
/// temporal, uuid, json and network types decode to text. Anything else
/// (arrays, ranges, composites, geometric types) falls back to its raw wire
/// bytes, which the normalizer can only render lossily.
struct PgCell(RawValue);

impl<'a> FromSql<'a> for PgCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => RawValue::Bool(bool::from_sql(ty, raw)?),
            Type::CHAR => RawValue::Text(char::from(i8::from_sql(ty, raw)? as u8).to_string()),
            Type::INT2 => RawValue::I16(i16::from_sql(ty, raw)?),
            Type::INT4 => RawValue::I32(i32::from_sql(ty, raw)?),
            Type::INT8 => RawValue::I64(i64::from_sql(ty, raw)?),
            Type::OID => RawValue::U32(u32::from_sql(ty, raw)?),
            Type::FLOAT4 => RawValue::F32(f32::from_sql(ty, raw)?),
            Type::FLOAT8 => RawValue::F64(f64::from_sql(ty, raw)?),
            Type::NUMERIC => RawValue::Text(decode_numeric(raw)?),
            Type::MONEY => RawValue::Text(decode_money(raw)?),
            Type::BYTEA => RawValue::Bytes(raw.to_vec()),
            Type::UUID => RawValue::Text(Uuid::from_sql(ty, raw)?.to_string()),
            Type::JSON | Type::JSONB => {
                RawValue::Text(serde_json::Value::from_sql(ty, raw)?.to_string())
            }
            Type::DATE => RawValue::Text(NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => RawValue::Text(NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TIMETZ => RawValue::Text(decode_timetz(raw)?),
            Type::TIMESTAMP => RawValue::Text(NaiveDateTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMPTZ => RawValue::Text(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
            Type::INTERVAL => RawValue::Text(decode_interval(raw)?),
            Type::INET | Type::CIDR => RawValue::Text(decode_inet(raw, *ty == Type::CIDR)?),
            _ if is_text_type(ty) => RawValue::Text(String::from_sql(ty, raw)?),
            _ => RawValue::Bytes(raw.to_vec()),
        };
        Ok(PgCell(value))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(PgCell(RawValue::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decode a binary NUMERIC (base-10000 digit groups) into decimal text.
fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() < 8 {
        return Err("invalid numeric header".into());
    }
    let word = |offset: usize| u16::from_be_bytes([raw[offset], raw[offset + 1]]);

    let ndigits = word(0) as usize;
    let weight = word(2) as i16 as i32;
    let sign = word(4);
    let dscale = word(6) as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign {other:#06x}").into()),
    }
    if raw.len() < 8 + ndigits * 2 {
        return Err("truncated numeric digits".into());
    }

    let digits: Vec<u16> = (0..ndigits).map(|i| word(8 + i * 2)).collect();
    let digit = |idx: i32| -> u16 {
        usize::try_from(idx).ok().and_then(|i| digits.get(i).copied()).unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for idx in 1..=weight {
            out.push_str(&format!("{:04}", digit(idx)));
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit(idx)));
            idx += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

/// Encode decimal text as a binary NUMERIC.
fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let special = match text.to_ascii_lowercase().as_str() {
        "nan" => Some(NUMERIC_NAN),
        "infinity" | "+infinity" | "inf" | "+inf" => Some(NUMERIC_PINF),
        "-infinity" | "-inf" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_u16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(IsNull::No);
    }

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits {
        return Err(format!("invalid numeric literal {text:?}").into());
    }

    let dscale = u16::try_from(frac_part.len())?;
    let int_part = int_part.trim_start_matches('0');

    // Left-pad the integer digits and right-pad the fraction to whole groups.
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let padded = format!("{}{int_part}{frac_part}{}", "0".repeat(int_pad), "0".repeat(frac_pad));

    let mut groups: Vec<u16> = padded
        .as_bytes()
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0u16, |acc, d| acc * 10 + u16::from(*d - b'0')))
        .collect();
    let mut weight = i16::try_from((int_pad + int_part.len()) / 4)? - 1;

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= i16::try_from(leading)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    out.put_u16(u16::try_from(groups.len())?);
    out.put_i16(weight);
    out.put_u16(if negative && !groups.is_empty() { NUMERIC_NEG } else { NUMERIC_POS });
    out.put_u16(dscale);
    for group in groups {
        out.put_u16(group);
    }
    Ok(IsNull::No)
}

fn be_i64(raw: &[u8]) -> Result<i64, BoxError> {
    Ok(i64::from_be_bytes(raw.try_into()?))
}

fn be_i32(raw: &[u8]) -> Result<i32, BoxError> {
    Ok(i32::from_be_bytes(raw.try_into()?))
}

/// `[-]HH:MM:SS[.ffffff]` from a signed microsecond count.
fn format_clock(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let secs = abs / 1_000_000;
    let frac = abs % 1_000_000;

    let mut out = format!("{sign}{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    if frac != 0 {
        out.push_str(format!(".{frac:06}").trim_end_matches('0'));
    }
    out
}

/// Decode a binary INTERVAL (microseconds, days, months) the way the server prints it.
fn decode_interval(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() != 16 {
        return Err("invalid interval length".into());
    }
    let micros = be_i64(&raw[0..8])?;
    let days = be_i32(&raw[8..12])?;
    let months = be_i32(&raw[12..16])?;

    let unit = |n: i32, one: &str, many: &str| format!("{n} {}", if n.abs() == 1 { one } else { many });

    let mut parts = Vec::new();
    if months / 12 != 0 {
        parts.push(unit(months / 12, "year", "years"));
    }
    if months % 12 != 0 {
        parts.push(unit(months % 12, "mon", "mons"));
    }
    if days != 0 {
        parts.push(unit(days, "day", "days"));
    }
    if micros != 0 || parts.is_empty() {
        parts.push(format_clock(micros));
    }
    Ok(parts.join(" "))
}

/// Decode a binary TIMETZ (microseconds, zone in seconds west of UTC).
fn decode_timetz(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() != 12 {
        return Err("invalid timetz length".into());
    }
    let micros = be_i64(&raw[0..8])?;
    let east = -be_i32(&raw[8..12])?;

    let secs = u32::try_from(micros / 1_000_000)?;
    let nanos = u32::try_from(micros % 1_000_000)? * 1_000;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or("timetz out of range")?;

    let sign = if east < 0 { '-' } else { '+' };
    let abs = east.unsigned_abs();
    let mut out = format!("{time}{sign}{:02}", abs / 3600);
    if abs % 3600 != 0 {
        out.push_str(&format!(":{:02}", (abs % 3600) / 60));
        if abs % 60 != 0 {
            out.push_str(&format!(":{:02}", abs % 60));
        }
    }
    Ok(out)
}

/// Decode a binary MONEY (integer cents) into decimal text.
fn decode_money(raw: &[u8]) -> Result<String, BoxError> {
    let cents = be_i64(raw)?;
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    Ok(format!("{sign}{}.{:02}", abs / 100, abs % 100))
}

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// Decode a binary INET or CIDR. The prefix length is shown for CIDR, and for
/// INET when it is not a single host.
fn decode_inet(raw: &[u8], is_cidr: bool) -> Result<String, BoxError> {
    if raw.len() < 4 {
        return Err("invalid inet header".into());
    }
    let (family, bits, len) = (raw[0], raw[1], raw[3] as usize);
    let addr = raw.get(4..4 + len).ok_or("truncated inet address")?;

    let (ip, full): (IpAddr, u8) = match family {
        PGSQL_AF_INET => (IpAddr::from(<[u8; 4]>::try_from(addr)?), 32),
        PGSQL_AF_INET6 => (IpAddr::from(<[u8; 16]>::try_from(addr)?), 128),
        other => return Err(format!("invalid inet family {other}").into()),
    };

    if is_cidr || bits != full {
        Ok(format!("{ip}/{bits}"))
    } else {
        Ok(ip.to_string())
    }
}
