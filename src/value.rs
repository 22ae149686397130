//! Dynamic values flowing through the expression evaluator.
//!
//! [`Value`] is an explicit tagged union. Every evaluator operation matches
//! over it and fails with a [`TypeErrorKind`] on mismatched kinds. Composite
//! values are reference counted and never mutated in place, so binding a
//! value to a loop variable or passing it to an include is a cheap clone.

use crate::error::{Error, Result, TypeErrorKind};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// String-keyed mapping used for dict values and render contexts.
pub type Map = IndexMap<String, Value>;

/// Capability exposed by opaque host objects.
///
/// Hosts hand structured data to templates without converting it into
/// plain mappings by implementing this trait.
pub trait Object: fmt::Debug + Send + Sync {
    /// Name used in error messages.
    fn type_name(&self) -> &str;

    /// Looks up a named attribute. `None` means the attribute does not exist.
    fn get_attr(&self, name: &str) -> Option<Value>;

    /// Invokes a named method. `None` means the object has no such method,
    /// in which case the evaluator falls back to calling the attribute.
    fn call_method(
        &self,
        _name: &str,
        _args: &[Value],
        _kwargs: &[(String, Value)],
    ) -> Option<Result<Value>> {
        None
    }

    /// Text emitted when the object itself is rendered.
    fn render(&self) -> String {
        format!("<{} object>", self.type_name())
    }
}

/// A declared parameter of a callable.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Value>,
}

impl Parameter {
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), default: None }
    }

    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self { name: name.into(), default: Some(default.into()) }
    }
}

type NativeFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A callable value with a declared parameter list.
///
/// The native body receives the bound parameters in declaration order,
/// followed by any surplus positional arguments when the function is
/// variadic.
#[derive(Clone)]
pub struct Function {
    name: String,
    params: Arc<[Parameter]>,
    variadic: bool,
    body: Arc<NativeFn>,
}

impl Function {
    pub fn new<F>(name: impl Into<String>, params: Vec<Parameter>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.into(),
            variadic: false,
            body: Arc::new(body),
        }
    }

    /// Like [`Function::new`], but surplus positional arguments are accepted.
    pub fn variadic<F>(name: impl Into<String>, params: Vec<Parameter>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self { variadic: true, ..Self::new(name, params, body) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Binds positional and keyword arguments against the declared
    /// parameters, filling omitted ones from their defaults.
    pub fn bind(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Vec<Value>> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut rest = Vec::new();

        for (i, arg) in args.into_iter().enumerate() {
            if i < slots.len() {
                slots[i] = Some(arg);
            } else if self.variadic {
                rest.push(arg);
            } else {
                return Err(Error::type_error(TypeErrorKind::InvalidArgument(format!(
                    "{}() takes {} positional arguments",
                    self.name,
                    self.params.len()
                ))));
            }
        }

        for (key, value) in kwargs {
            let index = self
                .params
                .iter()
                .position(|p| p.name == key)
                .ok_or_else(|| Error::type_error(TypeErrorKind::UnexpectedArgument(key.clone())))?;
            if slots[index].is_some() {
                return Err(Error::type_error(TypeErrorKind::InvalidArgument(format!(
                    "{}() got multiple values for '{}'",
                    self.name, key
                ))));
            }
            slots[index] = Some(value);
        }

        let mut bound = Vec::with_capacity(slots.len() + rest.len());
        for (slot, param) in slots.into_iter().zip(self.params.iter()) {
            match slot.or_else(|| param.default.clone()) {
                Some(value) => bound.push(value),
                None => return Err(Error::MissingArgument { name: param.name.clone() }),
            }
        }
        bound.extend(rest);
        Ok(bound)
    }

    pub fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value> {
        let bound = self.bind(args, kwargs)?;
        (self.body)(&bound)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish()
    }
}

/// A dynamically typed template value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Arc<Vec<Value>>),
    Map(Arc<Map>),
    Function(Function),
    Object(Arc<dyn Object>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn map(entries: Map) -> Self {
        Value::Map(Arc::new(entries))
    }

    pub fn object<O: Object + 'static>(object: O) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "str".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Map(_) => "dict".to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Object(obj) => obj.type_name().to_string(),
        }
    }

    /// Null, false, zero and empty containers are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Function(_) | Value::Object(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Text emitted by `${}`: null renders as empty text, containers use
    /// their canonical form.
    pub fn to_output(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Object(obj) => obj.render(),
            other => other.repr(),
        }
    }

    /// Canonical form, used for values nested inside containers.
    pub fn repr(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => format_float(*n),
            Value::String(s) => quote(s),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Map(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Function(func) => format!("<function {}>", func.name()),
            Value::Object(obj) => obj.render(),
        }
    }

    /// Orders two values of comparable kinds.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Ok(ord),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x
                    .partial_cmp(&y)
                    .ok_or_else(|| Error::invalid_operand("cannot order NaN")),
                _ => Err(Error::invalid_operand(format!(
                    "'<' not supported between '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts a JSON document into a value tree.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }

    /// Converts back to JSON. Callables and host objects become their
    /// canonical string form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => serde_json::Value::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Function(_) | Value::Object(_) => serde_json::Value::String(self.repr()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(&a.body, &b.body),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_output())
    }
}

fn format_float(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<Map> for Value {
    fn from(entries: Map) -> Self {
        Value::map(entries)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(!Value::map(Map::new()).is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::list(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn test_canonical_forms() {
        assert_eq!(Value::Null.to_output(), "");
        assert_eq!(Value::Bool(true).to_output(), "True");
        assert_eq!(Value::Float(2.0).to_output(), "2.0");
        assert_eq!(Value::Float(3.5).to_output(), "3.5");

        let list = Value::list(vec![Value::from("a"), Value::Int(1), Value::Null]);
        assert_eq!(list.to_output(), "['a', 1, None]");

        let mut entries = Map::new();
        entries.insert("k".to_string(), Value::from("it's"));
        assert_eq!(Value::map(entries).to_output(), "{'k': 'it\\'s'}");
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(1), Value::Bool(true));
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"name": "demo", "deps": ["fmt", 3], "ratio": 0.5});
        let value = Value::from_json(&json);
        let deps = value.as_map().unwrap().get("deps").unwrap();
        assert_eq!(deps.as_list().unwrap()[1], Value::Int(3));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_function_binding_uses_defaults() {
        let func = Function::new(
            "greet",
            vec![Parameter::required("name"), Parameter::optional("greeting", "Hi")],
            |args| Ok(Value::from(format!("{}, {}", args[1], args[0]))),
        );
        let out = func.call(vec![Value::from("Ada")], vec![]).unwrap();
        assert_eq!(out, Value::from("Hi, Ada"));

        let out = func
            .call(vec![], vec![("name".into(), "Bob".into()), ("greeting".into(), "Yo".into())])
            .unwrap();
        assert_eq!(out, Value::from("Yo, Bob"));
    }

    #[test]
    fn test_function_binding_errors() {
        let func = Function::new("f", vec![Parameter::required("x")], |args| Ok(args[0].clone()));
        assert!(matches!(
            func.call(vec![], vec![]),
            Err(Error::MissingArgument { name }) if name == "x"
        ));
        assert!(matches!(
            func.call(vec![Value::Int(1)], vec![("y".into(), Value::Int(2))]),
            Err(Error::TypeError { kind: TypeErrorKind::UnexpectedArgument(name) }) if name == "y"
        ));
        assert!(matches!(
            func.call(vec![Value::Int(1), Value::Int(2)], vec![]),
            Err(Error::TypeError { kind: TypeErrorKind::InvalidArgument(_) })
        ));
    }
}
