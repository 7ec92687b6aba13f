//! Builtin function library.
//!
//! Global functions and member functions available to every expression,
//! including the template-authoring helpers: `omit()`, `merge(...)`,
//! `generateName(...)`, `hash(s)`, and the container-config member helpers
//! `envFrom(name)` / `volumeMounts()` / `volumes(name)` that expand file and
//! environment configurations into Kubernetes fragments.

use base64::prelude::*;
use indexmap::IndexMap;

use crate::error::{ExprError, ExprResult};
use crate::names::{generate_name, hash_hex, MAX_RESOURCE_NAME_LEN};
use crate::value::Value;

fn invalid(function: &str, message: impl Into<String>) -> ExprError {
    ExprError::InvalidArgument {
        function: function.to_string(),
        message: message.into(),
    }
}

/// Dispatch a global function call.
pub fn call_global(name: &str, args: Vec<Value>) -> ExprResult<Value> {
    match name {
        "omit" => {
            if !args.is_empty() {
                return Err(invalid("omit", "takes no arguments"));
            }
            Ok(Value::Omit)
        }
        "merge" => merge(args),
        "generateName" => generate_name_fn(args),
        "hash" => {
            let [arg] = take_args::<1>("hash", args)?;
            Ok(Value::String(hash_hex(arg.as_str()?)))
        }
        "size" => {
            let [arg] = take_args::<1>("size", args)?;
            size_of(&arg)
        }
        "string" => {
            let [arg] = take_args::<1>("string", args)?;
            arg.coerce_string()
                .map(Value::String)
                .ok_or_else(|| invalid("string", "cannot convert omit to string"))
        }
        "int" => {
            let [arg] = take_args::<1>("int", args)?;
            match arg {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => Ok(Value::Int(f as i64)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| invalid("int", format!("cannot parse {:?}", s))),
                other => Err(invalid("int", format!("cannot convert {}", other.type_name()))),
            }
        }
        "double" => {
            let [arg] = take_args::<1>("double", args)?;
            match arg {
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Float(f) => Ok(Value::Float(f)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| invalid("double", format!("cannot parse {:?}", s))),
                other => Err(invalid(
                    "double",
                    format!("cannot convert {}", other.type_name()),
                )),
            }
        }
        "bool" => {
            let [arg] = take_args::<1>("bool", args)?;
            match arg {
                Value::Bool(b) => Ok(Value::Bool(b)),
                Value::String(s) => match s.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(invalid("bool", format!("cannot parse {:?}", s))),
                },
                other => Err(invalid(
                    "bool",
                    format!("cannot convert {}", other.type_name()),
                )),
            }
        }
        "min" => fold_numeric("min", args, |a, b| if b < a { b } else { a }),
        "max" => fold_numeric("max", args, |a, b| if b > a { b } else { a }),
        "abs" => {
            let [arg] = take_args::<1>("abs", args)?;
            match arg {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ExprError::Arithmetic {
                        message: "integer overflow in abs".to_string(),
                    }),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(invalid("abs", format!("expected number, got {}", other.type_name()))),
            }
        }
        "base64" => {
            let [arg] = take_args::<1>("base64", args)?;
            Ok(Value::String(BASE64_STANDARD.encode(arg.as_str()?)))
        }
        "base64Decode" => {
            let [arg] = take_args::<1>("base64Decode", args)?;
            let bytes = BASE64_STANDARD
                .decode(arg.as_str()?)
                .map_err(|e| invalid("base64Decode", e.to_string()))?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|_| invalid("base64Decode", "decoded bytes are not valid UTF-8"))
        }
        _ => Err(ExprError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}

/// Dispatch a member function call.
pub fn call_method(target: Value, name: &str, args: Vec<Value>) -> ExprResult<Value> {
    match name {
        "contains" => {
            let [arg] = take_args::<1>("contains", args)?;
            match &target {
                Value::String(s) => Ok(Value::Bool(s.contains(arg.as_str()?))),
                Value::List(items) => Ok(Value::Bool(items.iter().any(|v| values_equal(v, &arg)))),
                other => Err(invalid(
                    "contains",
                    format!("expected string or list, got {}", other.type_name()),
                )),
            }
        }
        "startsWith" => {
            let [arg] = take_args::<1>("startsWith", args)?;
            Ok(Value::Bool(target.as_str()?.starts_with(arg.as_str()?)))
        }
        "endsWith" => {
            let [arg] = take_args::<1>("endsWith", args)?;
            Ok(Value::Bool(target.as_str()?.ends_with(arg.as_str()?)))
        }
        "replace" => {
            let [from, to] = take_args::<2>("replace", args)?;
            Ok(Value::String(
                target.as_str()?.replace(from.as_str()?, to.as_str()?),
            ))
        }
        "split" => {
            let [sep] = take_args::<1>("split", args)?;
            Ok(Value::List(
                target
                    .as_str()?
                    .split(sep.as_str()?)
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            let [sep] = take_args::<1>("join", args)?;
            let sep = sep.as_str()?.to_string();
            let items = expect_list(&target, "join")?;
            let parts: ExprResult<Vec<String>> =
                items.iter().map(|v| v.as_str().map(str::to_string)).collect();
            Ok(Value::String(parts?.join(&sep)))
        }
        "lowerAscii" => {
            take_args::<0>("lowerAscii", args)?;
            Ok(Value::String(target.as_str()?.to_ascii_lowercase()))
        }
        "upperAscii" => {
            take_args::<0>("upperAscii", args)?;
            Ok(Value::String(target.as_str()?.to_ascii_uppercase()))
        }
        "trim" => {
            take_args::<0>("trim", args)?;
            Ok(Value::String(target.as_str()?.trim().to_string()))
        }
        "size" => {
            take_args::<0>("size", args)?;
            size_of(&target)
        }
        "distinct" => {
            take_args::<0>("distinct", args)?;
            let items = expect_list(&target, "distinct")?;
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !out.iter().any(|v| values_equal(v, item)) {
                    out.push(item.clone());
                }
            }
            Ok(Value::List(out))
        }
        "flatten" => {
            take_args::<0>("flatten", args)?;
            let items = expect_list(&target, "flatten")?;
            let mut out = Vec::new();
            for item in items {
                match item {
                    Value::List(inner) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::List(out))
        }
        "envFrom" => {
            let [name] = take_args::<1>("envFrom", args)?;
            env_from(&target, name.as_str()?)
        }
        "volumeMounts" => {
            take_args::<0>("volumeMounts", args)?;
            volume_mounts(&target)
        }
        "volumes" => {
            let [name] = take_args::<1>("volumes", args)?;
            volumes(&target, name.as_str()?)
        }
        _ => Err(ExprError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}

/// Equality as the language sees it: int/double compare numerically, the
/// omit sentinel equals only itself.
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (a, b) => a == b,
    }
}

fn take_args<const N: usize>(function: &str, args: Vec<Value>) -> ExprResult<[Value; N]> {
    let count = args.len();
    args.try_into()
        .map_err(|_| invalid(function, format!("expected {} argument(s), got {}", N, count)))
}

fn expect_list<'a>(value: &'a Value, function: &str) -> ExprResult<&'a Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(invalid(
            function,
            format!("expected list, got {}", other.type_name()),
        )),
    }
}

fn size_of(value: &Value) -> ExprResult<Value> {
    match value {
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Map(map) => Ok(Value::Int(map.len() as i64)),
        other => Err(invalid(
            "size",
            format!("expected string, list or map, got {}", other.type_name()),
        )),
    }
}

/// Shallow overlay of two or more maps, left to right. Later keys replace
/// earlier ones entirely; nested maps are not recursed into.
fn merge(args: Vec<Value>) -> ExprResult<Value> {
    if args.len() < 2 {
        return Err(invalid("merge", "requires at least 2 arguments"));
    }
    let mut result: IndexMap<String, Value> = IndexMap::new();
    for arg in args {
        match arg {
            Value::Map(map) => {
                for (k, v) in map {
                    result.insert(k, v);
                }
            }
            other => {
                return Err(invalid(
                    "merge",
                    format!("expected map, got {}", other.type_name()),
                ));
            }
        }
    }
    Ok(Value::Map(result))
}

/// `generateName(parts...)`: variadic strings or a single list. Non-string
/// list items are ignored so mixed helper-built lists keep working.
fn generate_name_fn(args: Vec<Value>) -> ExprResult<Value> {
    let mut parts = Vec::new();
    if args.len() == 1 {
        match &args[0] {
            Value::List(items) => {
                for item in items {
                    if let Value::String(s) = item {
                        parts.push(s.clone());
                    }
                }
            }
            Value::String(s) => parts.push(s.clone()),
            other => {
                return Err(invalid(
                    "generateName",
                    format!("expected string or list, got {}", other.type_name()),
                ));
            }
        }
    } else {
        for arg in &args {
            if let Value::String(s) = arg {
                parts.push(s.clone());
            }
        }
    }
    Ok(Value::String(generate_name(&parts, MAX_RESOURCE_NAME_LEN)))
}

fn fold_numeric(
    function: &str,
    args: Vec<Value>,
    pick: fn(f64, f64) -> f64,
) -> ExprResult<Value> {
    if args.is_empty() {
        return Err(invalid(function, "requires at least 1 argument"));
    }
    let mut all_int = true;
    let mut acc: Option<f64> = None;
    for arg in &args {
        let n = match arg {
            Value::Int(i) => *i as f64,
            Value::Float(f) => {
                all_int = false;
                *f
            }
            other => {
                return Err(invalid(
                    function,
                    format!("expected number, got {}", other.type_name()),
                ));
            }
        };
        acc = Some(match acc {
            None => n,
            Some(current) => pick(current, n),
        });
    }
    let result = acc.expect("non-empty checked above");
    if all_int {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

// --- Container-config helpers ----------------------------------------------

fn get_map<'a>(value: &'a Value, key: &str) -> Option<&'a IndexMap<String, Value>> {
    match value {
        Value::Map(map) => match map.get(key) {
            Some(Value::Map(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

fn get_list<'a>(map: &'a IndexMap<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    match map.get(key) {
        Some(Value::List(items)) => Some(items),
        _ => None,
    }
}

/// File entries (`name`, `mountPath`) under a config section, skipping
/// entries that do not have both fields as strings.
fn file_entries(config: &Value, section: &str) -> Vec<(String, String)> {
    let mut files = Vec::new();
    let Some(section_map) = get_map(config, section) else {
        return files;
    };
    let Some(items) = get_list(section_map, "files") else {
        return files;
    };
    for item in items {
        let Value::Map(file) = item else { continue };
        let (Some(Value::String(name)), Some(Value::String(mount_path))) =
            (file.get("name"), file.get("mountPath"))
        else {
            continue;
        };
        files.push((name.clone(), mount_path.clone()));
    }
    files
}

fn has_envs(config: &Value, section: &str) -> bool {
    get_map(config, section)
        .and_then(|m| get_list(m, "envs"))
        .map(|envs| !envs.is_empty())
        .unwrap_or(false)
}

fn string_map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

/// Volume name shared by `volumeMounts()` and `volumes()` for a mounted file.
fn file_mount_name(mount_path: &str, file_name: &str) -> String {
    format!("file-mount-{}", hash_hex(&format!("{}/{}", mount_path, file_name)))
}

/// `config.envFrom(metadataName)`: configMapRef/secretRef entries for the
/// config's environment variables, with generated reference names.
fn env_from(config: &Value, metadata_name: &str) -> ExprResult<Value> {
    let mut entries = Vec::new();
    if has_envs(config, "configs") {
        let name = generate_name(
            &[metadata_name.to_string(), "env-configs".to_string()],
            MAX_RESOURCE_NAME_LEN,
        );
        entries.push(string_map(vec![(
            "configMapRef",
            string_map(vec![("name", Value::String(name))]),
        )]));
    }
    if has_envs(config, "secrets") {
        let name = generate_name(
            &[metadata_name.to_string(), "env-secrets".to_string()],
            MAX_RESOURCE_NAME_LEN,
        );
        entries.push(string_map(vec![(
            "secretRef",
            string_map(vec![("name", Value::String(name))]),
        )]));
    }
    Ok(Value::List(entries))
}

/// `config.volumeMounts()`: one mount per config or secret file.
fn volume_mounts(config: &Value) -> ExprResult<Value> {
    let mut entries = Vec::new();
    for section in ["configs", "secrets"] {
        for (name, mount_path) in file_entries(config, section) {
            let full_path = format!("{}/{}", mount_path, name);
            entries.push(string_map(vec![
                ("name", Value::String(file_mount_name(&mount_path, &name))),
                ("mountPath", Value::String(full_path)),
                ("subPath", Value::String(name)),
            ]));
        }
    }
    Ok(Value::List(entries))
}

/// `config.volumes(metadataName)`: configMap/secret volume entries backing
/// the mounts from [`volume_mounts`]. Generated configMap and secret names
/// have dots rewritten to hyphens (file names often contain extensions).
fn volumes(config: &Value, metadata_name: &str) -> ExprResult<Value> {
    let mut entries = Vec::new();
    for (name, mount_path) in file_entries(config, "configs") {
        let cm_name = generate_name(
            &[metadata_name.to_string(), "config".to_string(), name.clone()],
            MAX_RESOURCE_NAME_LEN,
        )
        .replace('.', "-");
        entries.push(string_map(vec![
            ("name", Value::String(file_mount_name(&mount_path, &name))),
            ("configMap", string_map(vec![("name", Value::String(cm_name))])),
        ]));
    }
    for (name, mount_path) in file_entries(config, "secrets") {
        let secret_name = generate_name(
            &[metadata_name.to_string(), "secret".to_string(), name.clone()],
            MAX_RESOURCE_NAME_LEN,
        )
        .replace('.', "-");
        entries.push(string_map(vec![
            ("name", Value::String(file_mount_name(&mount_path, &name))),
            (
                "secret",
                string_map(vec![("secretName", Value::String(secret_name))]),
            ),
        ]));
    }
    Ok(Value::List(entries))
}
