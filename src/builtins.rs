//! Built-in functions and methods available to every template.

use crate::error::{Error, Result, TypeErrorKind};
use crate::expr::ast::BinaryOp;
use crate::expr::eval::{binary, unpack};
use crate::value::{Function, Map, Parameter, Value};
use cruet::Inflector;
use std::cmp::Ordering;

fn invalid(message: impl Into<String>) -> Error {
    Error::type_error(TypeErrorKind::InvalidArgument(message.into()))
}

fn expect_str<'a>(value: &'a Value, func: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("{func}() expects a string, got '{}'", value.type_name())))
}

fn expect_int(value: &Value, func: &str) -> Result<i64> {
    value
        .as_int()
        .ok_or_else(|| invalid(format!("{func}() expects an integer, got '{}'", value.type_name())))
}

/// Items of a sequence, or the keys of a mapping.
pub fn iterate(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.to_vec()),
        Value::Map(entries) => Ok(entries.keys().map(|k| Value::String(k.clone())).collect()),
        other => Err(Error::type_error(TypeErrorKind::NotIterable(other.type_name()))),
    }
}

fn sort_values(items: &mut [Value]) -> Result<()> {
    let mut failure = None;
    items.sort_by(|a, b| match a.compare(b) {
        Ok(ord) => ord,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

fn extremum(args: &[Value], func: &str, wanted: Ordering) -> Result<Value> {
    let candidates = match args {
        [single] => iterate(single)?,
        many => many.to_vec(),
    };
    let mut iter = candidates.into_iter();
    let mut best = iter.next().ok_or_else(|| invalid(format!("{func}() arg is an empty sequence")))?;
    for candidate in iter {
        if candidate.compare(&best)? == wanted {
            best = candidate;
        }
    }
    Ok(best)
}

/// Builds the global function table. `max_iterations` caps `range()`.
pub fn globals(max_iterations: usize) -> Map {
    let mut table = Map::new();
    let mut add = |func: Function| {
        table.insert(func.name().to_string(), Value::Function(func));
    };

    add(Function::new("len", vec![Parameter::required("obj")], |args| match &args[0] {
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::List(items) => Ok(Value::from(items.len())),
        Value::Map(entries) => Ok(Value::from(entries.len())),
        other => Err(invalid(format!("object of type '{}' has no len()", other.type_name()))),
    }));

    add(Function::new("str", vec![Parameter::optional("obj", "")], |args| {
        Ok(Value::String(args[0].to_output()))
    }));

    add(Function::new("repr", vec![Parameter::required("obj")], |args| {
        Ok(Value::String(args[0].repr()))
    }));

    add(Function::new("int", vec![Parameter::optional("x", 0)], |args| match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(n) => Ok(Value::Int(n.trunc() as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| invalid(format!("invalid literal for int(): '{s}'"))),
        other => Err(invalid(format!("int() argument must be a string or a number, not '{}'", other.type_name()))),
    }));

    add(Function::new("float", vec![Parameter::optional("x", 0.0)], |args| match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(n) => Ok(Value::Float(*n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid(format!("could not convert string to float: '{s}'"))),
        other => Err(invalid(format!("float() argument must be a string or a number, not '{}'", other.type_name()))),
    }));

    add(Function::new("bool", vec![Parameter::optional("x", false)], |args| {
        Ok(Value::Bool(args[0].is_truthy()))
    }));

    add(Function::new("type_name", vec![Parameter::required("obj")], |args| {
        Ok(Value::String(args[0].type_name()))
    }));

    add(Function::new(
        "range",
        vec![
            Parameter::required("start"),
            Parameter::optional("stop", Value::Null),
            Parameter::optional("step", 1),
        ],
        move |args| {
            let (start, stop) = match &args[1] {
                Value::Null => (0, expect_int(&args[0], "range")?),
                stop => (expect_int(&args[0], "range")?, expect_int(stop, "range")?),
            };
            let step = expect_int(&args[2], "range")?;
            if step == 0 {
                return Err(invalid("range() arg 3 must not be zero"));
            }
            // i128 holds every span and step of i64 bounds exactly.
            let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
            let span = if step > 0 { stop - start } else { start - stop };
            let count = if span <= 0 { 0 } else { (span - 1) / step.abs() + 1 };
            if count > max_iterations as i128 {
                return Err(Error::IterationLimitExceeded { limit: max_iterations });
            }
            let items = (0..count)
                .map(|i| i64::try_from(start + i * step).map(Value::Int))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| invalid("range() value out of range"))?;
            Ok(Value::list(items))
        },
    ));

    add(Function::new(
        "enumerate",
        vec![Parameter::required("iterable"), Parameter::optional("start", 0)],
        |args| {
            let start = expect_int(&args[1], "enumerate")?;
            let items = iterate(&args[0])?
                .into_iter()
                .enumerate()
                .map(|(i, item)| Value::list(vec![Value::Int(start + i as i64), item]))
                .collect();
            Ok(Value::list(items))
        },
    ));

    add(Function::new(
        "sorted",
        vec![Parameter::required("iterable"), Parameter::optional("reverse", false)],
        |args| {
            let mut items = iterate(&args[0])?;
            sort_values(&mut items)?;
            if args[1].is_truthy() {
                items.reverse();
            }
            Ok(Value::list(items))
        },
    ));

    add(Function::new("reversed", vec![Parameter::required("seq")], |args| {
        let mut items = iterate(&args[0])?;
        items.reverse();
        Ok(Value::list(items))
    }));

    add(Function::variadic("min", vec![], |args| extremum(args, "min", Ordering::Less)));
    add(Function::variadic("max", vec![], |args| extremum(args, "max", Ordering::Greater)));

    add(Function::new(
        "sum",
        vec![Parameter::required("iterable"), Parameter::optional("start", 0)],
        move |args| {
            iterate(&args[0])?
                .iter()
                .try_fold(args[1].clone(), |acc, item| binary(BinaryOp::Add, &acc, item, max_iterations))
        },
    ));

    add(Function::new(
        "join",
        vec![Parameter::required("iterable"), Parameter::optional("sep", "")],
        |args| {
            let sep = expect_str(&args[1], "join")?;
            let parts: Vec<String> = iterate(&args[0])?.iter().map(Value::to_output).collect();
            Ok(Value::String(parts.join(sep)))
        },
    ));

    add(Function::variadic("zip", vec![], |args| {
        let columns = args.iter().map(iterate).collect::<Result<Vec<_>>>()?;
        let len = columns.iter().map(Vec::len).min().unwrap_or(0);
        let rows = (0..len)
            .map(|i| Value::list(columns.iter().map(|c| c[i].clone()).collect()))
            .collect();
        Ok(Value::list(rows))
    }));

    add(Function::new(
        "list",
        vec![Parameter::optional("iterable", Value::list(vec![]))],
        |args| Ok(Value::list(iterate(&args[0])?)),
    ));

    add(Function::new(
        "dict",
        vec![Parameter::optional("pairs", Value::list(vec![]))],
        |args| match &args[0] {
            Value::Map(entries) => Ok(Value::Map(entries.clone())),
            other => {
                let mut map = Map::new();
                for pair in iterate(other)? {
                    let [key, value]: [Value; 2] = unpack(pair, 2)?
                        .try_into()
                        .map_err(|_| invalid("dict() expects key/value pairs"))?;
                    let key = expect_str(&key, "dict")?.to_string();
                    map.insert(key, value);
                }
                Ok(Value::map(map))
            }
        },
    ));

    add(Function::new("any", vec![Parameter::required("iterable")], |args| {
        Ok(Value::Bool(iterate(&args[0])?.iter().any(Value::is_truthy)))
    }));

    add(Function::new("all", vec![Parameter::required("iterable")], |args| {
        Ok(Value::Bool(iterate(&args[0])?.iter().all(Value::is_truthy)))
    }));

    table
}

fn bound<F>(receiver: &Value, name: &str, params: Vec<Parameter>, body: F) -> Function
where
    F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
{
    let receiver = receiver.clone();
    Function::new(name, params, move |args| body(&receiver, args))
}

/// Looks up a built-in method on a value, bound to that value.
pub fn method(receiver: &Value, name: &str) -> Option<Function> {
    match receiver {
        Value::String(_) => string_method(receiver, name),
        Value::List(_) => list_method(receiver, name),
        Value::Map(_) => map_method(receiver, name),
        _ => None,
    }
}

fn text(receiver: &Value) -> &str {
    receiver.as_str().unwrap_or_default()
}

fn transform(receiver: &Value, name: &str, f: fn(&str) -> String) -> Function {
    bound(receiver, name, vec![], move |recv, _| Ok(Value::String(f(text(recv)))))
}

type StripMode = fn(&str, &dyn Fn(char) -> bool) -> String;

fn strip_with(recv: &Value, chars: &Value, name: &str, mode: StripMode) -> Result<Value> {
    let s = text(recv);
    Ok(Value::String(match chars {
        Value::Null => mode(s, &|c: char| c.is_whitespace()),
        chars => {
            let set = expect_str(chars, name)?;
            mode(s, &|c: char| set.contains(c))
        }
    }))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_alpha = false;
    for c in s.chars() {
        if previous_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_alpha = c.is_alphabetic();
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn string_method(receiver: &Value, name: &str) -> Option<Function> {
    let func = match name {
        "upper" => transform(receiver, name, |s| s.to_uppercase()),
        "lower" => transform(receiver, name, |s| s.to_lowercase()),
        "title" => transform(receiver, name, title_case),
        "capitalize" => transform(receiver, name, capitalize),
        "snake_case" => transform(receiver, name, |s| s.to_snake_case()),
        "camel_case" => transform(receiver, name, |s| s.to_camel_case()),
        "pascal_case" => transform(receiver, name, |s| s.to_pascal_case()),
        "kebab_case" => transform(receiver, name, |s| s.to_kebab_case()),
        "screaming_snake_case" => transform(receiver, name, |s| s.to_screaming_snake_case()),
        "strip" => bound(receiver, name, vec![Parameter::optional("chars", Value::Null)], |recv, args| {
            strip_with(recv, &args[0], "strip", |s, f| s.trim_matches(|c: char| f(c)).to_string())
        }),
        "lstrip" => bound(receiver, name, vec![Parameter::optional("chars", Value::Null)], |recv, args| {
            strip_with(recv, &args[0], "lstrip", |s, f| s.trim_start_matches(|c: char| f(c)).to_string())
        }),
        "rstrip" => bound(receiver, name, vec![Parameter::optional("chars", Value::Null)], |recv, args| {
            strip_with(recv, &args[0], "rstrip", |s, f| s.trim_end_matches(|c: char| f(c)).to_string())
        }),
        "replace" => bound(
            receiver,
            name,
            vec![Parameter::required("old"), Parameter::required("new")],
            |recv, args| {
                let old = expect_str(&args[0], "replace")?;
                let new = expect_str(&args[1], "replace")?;
                Ok(Value::String(text(recv).replace(old, new)))
            },
        ),
        "split" => bound(
            receiver,
            name,
            vec![Parameter::optional("sep", Value::Null), Parameter::optional("maxsplit", -1)],
            |recv, args| {
                let s = text(recv);
                let maxsplit = expect_int(&args[1], "split")?;
                let parts: Vec<Value> = match &args[0] {
                    Value::Null => s.split_whitespace().map(Value::from).collect(),
                    sep => {
                        let sep = expect_str(sep, "split")?;
                        if sep.is_empty() {
                            return Err(invalid("split() separator must not be empty"));
                        }
                        if maxsplit < 0 {
                            s.split(sep).map(Value::from).collect()
                        } else {
                            s.splitn(maxsplit as usize + 1, sep).map(Value::from).collect()
                        }
                    }
                };
                Ok(Value::list(parts))
            },
        ),
        "splitlines" => bound(receiver, name, vec![], |recv, _| {
            Ok(Value::list(text(recv).lines().map(Value::from).collect()))
        }),
        "startswith" | "endswith" => {
            let suffix = name == "endswith";
            bound(receiver, name, vec![Parameter::required("affix")], move |recv, args| {
                let s = text(recv);
                let candidates = match &args[0] {
                    Value::List(items) => items.to_vec(),
                    single => vec![single.clone()],
                };
                for candidate in &candidates {
                    let affix = expect_str(candidate, if suffix { "endswith" } else { "startswith" })?;
                    if (suffix && s.ends_with(affix)) || (!suffix && s.starts_with(affix)) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            })
        }
        "join" => bound(receiver, name, vec![Parameter::required("iterable")], |recv, args| {
            let parts: Vec<String> = iterate(&args[0])?.iter().map(Value::to_output).collect();
            Ok(Value::String(parts.join(text(recv))))
        }),
        "count" => bound(receiver, name, vec![Parameter::required("sub")], |recv, args| {
            let sub = expect_str(&args[0], "count")?;
            if sub.is_empty() {
                return Ok(Value::from(text(recv).chars().count() + 1));
            }
            Ok(Value::from(text(recv).matches(sub).count()))
        }),
        "find" => bound(receiver, name, vec![Parameter::required("sub")], |recv, args| {
            let s = text(recv);
            let sub = expect_str(&args[0], "find")?;
            Ok(match s.find(sub) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::Int(-1),
            })
        }),
        _ => return None,
    };
    Some(func)
}

fn list_method(receiver: &Value, name: &str) -> Option<Function> {
    let items = |recv: &Value| recv.as_list().map(<[Value]>::to_vec).unwrap_or_default();
    let func = match name {
        "index" => bound(receiver, name, vec![Parameter::required("value")], move |recv, args| {
            items(recv)
                .iter()
                .position(|v| *v == args[0])
                .map(Value::from)
                .ok_or_else(|| invalid(format!("{} is not in list", args[0].repr())))
        }),
        "count" => bound(receiver, name, vec![Parameter::required("value")], move |recv, args| {
            Ok(Value::from(items(recv).iter().filter(|v| **v == args[0]).count()))
        }),
        "join" => bound(receiver, name, vec![Parameter::optional("sep", "")], move |recv, args| {
            let sep = expect_str(&args[0], "join")?;
            let parts: Vec<String> = items(recv).iter().map(Value::to_output).collect();
            Ok(Value::String(parts.join(sep)))
        }),
        _ => return None,
    };
    Some(func)
}

fn map_method(receiver: &Value, name: &str) -> Option<Function> {
    let entries = |recv: &Value| recv.as_map().cloned().unwrap_or_default();
    let func = match name {
        "keys" => bound(receiver, name, vec![], move |recv, _| {
            Ok(Value::list(entries(recv).keys().map(|k| Value::String(k.clone())).collect()))
        }),
        "values" => bound(receiver, name, vec![], move |recv, _| {
            Ok(Value::list(entries(recv).values().cloned().collect()))
        }),
        "items" => bound(receiver, name, vec![], move |recv, _| {
            Ok(Value::list(
                entries(recv)
                    .into_iter()
                    .map(|(k, v)| Value::list(vec![Value::String(k), v]))
                    .collect(),
            ))
        }),
        "get" => bound(
            receiver,
            name,
            vec![Parameter::required("key"), Parameter::optional("default", Value::Null)],
            |recv, args| {
                let key = expect_str(&args[0], "get")?;
                Ok(recv
                    .as_map()
                    .and_then(|m| m.get(key).cloned())
                    .unwrap_or_else(|| args[1].clone()))
            },
        ),
        _ => return None,
    };
    Some(func)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value> {
        match globals(100).get(name) {
            Some(Value::Function(f)) => f.call(args, vec![]),
            _ => panic!("no builtin {name}"),
        }
    }

    fn call_method(receiver: Value, name: &str, args: Vec<Value>) -> Result<Value> {
        method(&receiver, name).expect("method exists").call(args, vec![])
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(call("range", vec![Value::Int(3)]).unwrap().repr(), "[0, 1, 2]");
        assert_eq!(call("range", vec![Value::Int(1), Value::Int(7), Value::Int(3)]).unwrap().repr(), "[1, 4]");
        assert_eq!(call("range", vec![Value::Int(3), Value::Int(0), Value::Int(-1)]).unwrap().repr(), "[3, 2, 1]");
    }

    #[test]
    fn test_range_respects_iteration_limit() {
        assert!(matches!(
            call("range", vec![Value::Int(1_000)]),
            Err(Error::IterationLimitExceeded { limit: 100 })
        ));
    }

    #[test]
    fn test_range_with_extreme_steps() {
        let out = call("range", vec![Value::Int(0), Value::Int(-5), Value::Int(i64::MIN)]).unwrap();
        assert_eq!(out.repr(), "[0]");
        let out = call("range", vec![Value::Int(i64::MIN), Value::Int(i64::MAX), Value::Int(i64::MAX)]).unwrap();
        assert_eq!(out.as_list().map(<[Value]>::len), Some(3));
        assert!(matches!(
            call("range", vec![Value::Int(i64::MIN), Value::Int(i64::MAX)]),
            Err(Error::IterationLimitExceeded { limit: 100 })
        ));
    }

    #[test]
    fn test_sorted_and_extremes() {
        let items = Value::from(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call("sorted", vec![items.clone()]).unwrap().repr(), "[1, 2, 3]");
        assert_eq!(call("max", vec![items.clone()]).unwrap(), Value::Int(3));
        assert_eq!(call("min", vec![Value::Int(5), Value::Int(4)]).unwrap(), Value::Int(4));

        let mixed = Value::from(vec![Value::Int(1), Value::from("a")]);
        assert!(call("sorted", vec![mixed]).is_err());
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(call_method("a,b,,c".into(), "split", vec![",".into()]).unwrap().repr(), "['a', 'b', '', 'c']");
        assert_eq!(call_method("  x ".into(), "strip", vec![]).unwrap(), Value::from("x"));
        assert_eq!(call_method("--x--".into(), "strip", vec!["-".into()]).unwrap(), Value::from("x"));
        assert_eq!(call_method("hello world".into(), "title", vec![]).unwrap(), Value::from("Hello World"));
        assert_eq!(call_method("lib.so".into(), "endswith", vec![".so".into()]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_inflections() {
        assert_eq!(call_method("MyProject".into(), "snake_case", vec![]).unwrap(), Value::from("my_project"));
        assert_eq!(call_method("my_project".into(), "pascal_case", vec![]).unwrap(), Value::from("MyProject"));
        assert_eq!(call_method("my_project".into(), "kebab_case", vec![]).unwrap(), Value::from("my-project"));
    }

    #[test]
    fn test_map_methods() {
        let mut entries = Map::new();
        entries.insert("std".into(), Value::from("c++17"));
        let map = Value::map(entries);
        assert_eq!(call_method(map.clone(), "items", vec![]).unwrap().repr(), "[['std', 'c++17']]");
        assert_eq!(
            call_method(map, "get", vec!["missing".into(), "dflt".into()]).unwrap(),
            Value::from("dflt")
        );
    }
}
