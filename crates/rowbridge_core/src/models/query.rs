//! Query execution models: columns, parameters, results and call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::path::Path;

/// Column metadata reported by the driver cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Wire scan-type name, as the driver reports it (e.g. "int4", "varchar")
    pub scan_type: String,
}

impl ColumnInfo {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, scan_type: impl Into<String>) -> Self {
        Self { name: name.into(), scan_type: scan_type.into() }
    }
}

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Textual form used when rendering queries for the log.
impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "{b:?}"),
        }
    }
}

macro_rules! param_from {
    ($variant:ident: $($ty:ty),+ => $conv:expr) => {
        $(
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::$variant($conv(v))
                }
            }
        )+
    };
}

param_from!(Int: i8, i16, i32, i64, u8, u16, u32 => i64::from);
param_from!(Float: f32, f64 => f64::from);
param_from!(Bool: bool => std::convert::identity);
param_from!(Text: String => std::convert::identity);
param_from!(Bytes: Vec<u8> => std::convert::identity);

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<&[u8]> for Param {
    fn from(v: &[u8]) -> Self {
        Param::Bytes(v.to_vec())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

/// Build a `Vec<Param>` from heterogeneous values.
///
/// ```
/// use rowbridge_core::params;
/// let p = params![1, "two", 3.0, None::<i32>];
/// assert_eq!(p.len(), 4);
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::models::Param>::new() };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::models::Param::from($value)),+]
    };
}

/// Outcome of a statement executed without a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExecResult {
    /// Rows affected (for INSERT/UPDATE/DELETE)
    pub rows_affected: u64,
    /// Last generated id, when the driver exposes one
    pub last_insert_id: Option<i64>,
}

/// Source location of the code that issued a query.
///
/// Passed down explicitly from the public entry points; rendered as
/// `file:line (function)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    file: String,
    line: u32,
    function: Option<String>,
}

impl CallSite {
    /// Create a call site. Only the base name of `file` is kept.
    pub fn new(file: &str, line: u32, function: Option<&str>) -> Self {
        let file = Path::new(file)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());
        Self { file, line, function: function.map(clean_function_path) }
    }

    /// Call site from a `#[track_caller]` location. The function is unknown.
    pub fn from_location(location: &Location<'_>) -> Self {
        Self::new(location.file(), location.line(), None)
    }

    /// Location of whoever called the enclosing `#[track_caller]` function.
    ///
    /// Only the file and line are known here, so the site renders as
    /// `file:line`. Use [`call_site!`](crate::call_site) for the function name.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }

    /// File base name.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Line number.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Enclosing function path, if known.
    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "{}:{} ({})", self.file, self.line, function),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// Strip the marker item and any async closure frames from a type-name path.
fn clean_function_path(path: &str) -> String {
    let mut path = path.strip_suffix("::__rowbridge_here").unwrap_or(path);
    while let Some(stripped) = path.strip_suffix("::{{closure}}") {
        path = stripped;
    }
    path.to_string()
}

/// Capture the current file, line and enclosing function as a [`CallSite`].
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __rowbridge_here() {}
        fn __rowbridge_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::models::CallSite::new(
            file!(),
            line!(),
            Some(__rowbridge_name_of(__rowbridge_here)),
        )
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_conversions() {
        assert_eq!(Param::from(5u8), Param::Int(5));
        assert_eq!(Param::from(-3i32), Param::Int(-3));
        assert_eq!(Param::from(1.5f32), Param::Float(1.5));
        assert_eq!(Param::from("x"), Param::Text("x".to_string()));
        assert_eq!(Param::from(None::<i64>), Param::Null);
        assert_eq!(Param::from(Some(true)), Param::Bool(true));
    }

    #[test]
    fn test_param_display() {
        assert_eq!(Param::Int(1).to_string(), "1");
        assert_eq!(Param::Text("abc".into()).to_string(), "abc");
        assert_eq!(Param::Null.to_string(), "NULL");
        assert_eq!(Param::Bytes(vec![1, 2]).to_string(), "[1, 2]");
    }

    #[test]
    fn test_params_macro() {
        let p = crate::params![1, "a", None::<f64>];
        assert_eq!(p, vec![Param::Int(1), Param::Text("a".into()), Param::Null]);
        assert!(crate::params![].is_empty());
    }

    #[test]
    fn test_call_site_keeps_base_name() {
        let site = CallSite::new("/src/app/handlers/users.rs", 42, Some("app::handlers::list"));
        assert_eq!(site.file(), "users.rs");
        assert_eq!(site.to_string(), "users.rs:42 (app::handlers::list)");

        let bare = CallSite::new("main.rs", 7, None);
        assert_eq!(bare.to_string(), "main.rs:7");
    }

    #[test]
    fn test_call_site_macro_names_function() {
        let site = crate::call_site!();
        assert_eq!(site.file(), "query.rs");
        let function = site.function().unwrap();
        assert!(function.ends_with("test_call_site_macro_names_function"), "{function}");
    }

    #[test]
    fn test_call_site_strips_closure_frames() {
        let site = CallSite::new("a.rs", 1, Some("crate::f::{{closure}}::{{closure}}"));
        assert_eq!(site.function(), Some("crate::f"));
    }

    #[test]
    fn test_caller_captures_this_line() {
        let expected = line!() + 1;
        let site = CallSite::caller();
        assert_eq!(site.line(), expected);
        assert_eq!(site.file(), "query.rs");
    }

    #[test]
    fn test_caller_site_has_no_function_but_macro_does() {
        #[track_caller]
        fn captured() -> CallSite {
            CallSite::caller()
        }

        let line = line!() + 1;
        let site = captured();
        assert_eq!(site.function(), None);
        assert_eq!(site.to_string(), format!("query.rs:{line}"));
        assert!(!site.to_string().contains('('));

        let site = crate::call_site!();
        let function = site.function().unwrap();
        assert!(function.ends_with("test_caller_site_has_no_function_but_macro_does"));
        assert!(site.to_string().ends_with(&format!("({function})")));
    }
}
