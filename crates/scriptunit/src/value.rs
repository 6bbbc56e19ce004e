use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

type NativeFn = dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync;

/// A native callable injected into the script namespace by the host.
#[derive(Clone)]
pub struct HostFunction {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl HostFunction {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        (self.func)(args)
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl Debug for HostFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self.name)
    }
}

/// Dynamically typed value exchanged between the host and a script.
///
/// `Table` keeps insertion order so bindings and results are reported
/// deterministically.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Table(Vec<(String, Value)>),
    Function(HostFunction),
}

impl Value {
    pub const NIL: Value = Self::Nil;
    pub const TRUE: Value = Self::Bool(true);
    pub const FALSE: Value = Self::Bool(false);

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    /// Looks up a key of a `Table` value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Table(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

impl From<HostFunction> for Value {
    fn from(f: HostFunction) -> Self {
        Value::Function(f)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                let items = items.iter().map(|v| v.to_string()).collect::<Vec<_>>();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Table(entries) => {
                let entries = entries
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Function(func) => write!(f, "function: {}", func.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Value::Nil, "nil")]
    #[case(Value::Bool(true), "true")]
    #[case(Value::Integer(42), "42")]
    #[case(Value::Number(1.5), "1.5")]
    #[case(Value::from("hello"), "hello")]
    #[case(Value::List(vec![1.into(), 2.into()]), "[1, 2]")]
    #[case(Value::Table(vec![("a".to_string(), 1.into())]), "{a = 1}")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_host_function_call() {
        let double = HostFunction::new("double", |args| match args.first() {
            Some(Value::Integer(n)) => Ok(Value::Integer(n * 2)),
            _ => Err("expected an integer".to_string()),
        });

        assert_eq!(double.call(vec![Value::Integer(21)]), Ok(Value::Integer(42)));
        assert!(double.call(vec![]).is_err());
        assert_eq!(Value::from(double.clone()).to_string(), "function: double");
    }

    #[test]
    fn test_host_function_equality_is_identity() {
        let a = HostFunction::new("f", |_| Ok(Value::Nil));
        let b = HostFunction::new("f", |_| Ok(Value::Nil));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_table_get() {
        let table = Value::Table(vec![
            ("port".to_string(), Value::Integer(8080)),
            ("host".to_string(), Value::from("localhost")),
        ]);
        assert_eq!(table.get("port").and_then(Value::as_integer), Some(8080));
        assert_eq!(table.get("host").and_then(Value::as_str), Some("localhost"));
        assert_eq!(table.get("missing"), None);
        assert_eq!(Value::Nil.get("port"), None);
    }
}
