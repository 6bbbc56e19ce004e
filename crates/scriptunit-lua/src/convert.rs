use mlua::{Lua, MultiValue};
use scriptunit::Value;

const MAX_DEPTH: usize = 32;

/// Converts a host value into a Lua value owned by `lua`.
pub fn to_lua(lua: &Lua, value: &Value) -> mlua::Result<mlua::Value> {
    Ok(match value {
        Value::Nil => mlua::Value::Nil,
        Value::Bool(b) => mlua::Value::Boolean(*b),
        Value::Integer(n) => mlua::Value::Integer(*n),
        Value::Number(n) => mlua::Value::Number(*n),
        Value::String(s) => mlua::Value::String(lua.create_string(s)?),
        Value::List(items) => {
            let table = lua.create_table()?;
            for (index, item) in items.iter().enumerate() {
                table.raw_set(index + 1, to_lua(lua, item)?)?;
            }
            mlua::Value::Table(table)
        }
        Value::Table(entries) => {
            let table = lua.create_table()?;
            for (key, item) in entries {
                table.raw_set(key.as_str(), to_lua(lua, item)?)?;
            }
            mlua::Value::Table(table)
        }
        Value::Function(func) => {
            let func = func.clone();
            let function = lua.create_function(move |lua, args: MultiValue| {
                let args = args.iter().map(from_lua).collect();
                let result = func
                    .call(args)
                    .map_err(|message| mlua::Error::RuntimeError(format!("{}: {}", func.name(), message)))?;
                to_lua(lua, &result)
            })?;
            mlua::Value::Function(function)
        }
    })
}

/// Converts a Lua value into a host value.
///
/// Tables whose keys are exactly `1..=n` become lists; other tables become
/// key-sorted tables. Values without a host counterpart are rendered as
/// `<type>` strings.
pub fn from_lua(value: &mlua::Value) -> Value {
    convert(value, 0)
}

/// The value returned by a chunk: nothing is `Nil`, several values form a list.
pub fn from_multi(values: MultiValue) -> Value {
    let mut values = values.iter().map(from_lua).collect::<Vec<_>>();
    match values.len() {
        0 => Value::Nil,
        1 => values.remove(0),
        _ => Value::List(values),
    }
}

fn convert(value: &mlua::Value, depth: usize) -> Value {
    match value {
        mlua::Value::Nil => Value::Nil,
        mlua::Value::Boolean(b) => Value::Bool(*b),
        mlua::Value::Integer(n) => Value::Integer(*n),
        mlua::Value::Number(n) => Value::Number(*n),
        mlua::Value::String(s) => match s.to_str() {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::String(String::from(s.to_string_lossy())),
        },
        mlua::Value::Table(table) if depth < MAX_DEPTH => {
            let mut entries = Vec::new();
            for pair in table.clone().pairs::<mlua::Value, mlua::Value>() {
                let Ok((key, item)) = pair else {
                    continue;
                };
                entries.push((key, convert(&item, depth + 1)));
            }
            table_value(entries)
        }
        mlua::Value::Table(_) => Value::Nil,
        other => Value::String(format!("<{}>", other.type_name())),
    }
}

fn table_value(mut entries: Vec<(mlua::Value, Value)>) -> Value {
    let mut indices = entries
        .iter()
        .map(|(key, _)| match key {
            mlua::Value::Integer(n) => Some(*n),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default();
    indices.sort_unstable();
    let is_sequence = !entries.is_empty() && indices.iter().copied().eq(1..=entries.len() as i64);

    if is_sequence {
        entries.sort_by_key(|(key, _)| match key {
            mlua::Value::Integer(n) => *n,
            _ => 0,
        });
        return Value::List(entries.into_iter().map(|(_, item)| item).collect());
    }

    let mut entries = entries
        .into_iter()
        .map(|(key, item)| (key_string(&key), item))
        .collect::<Vec<_>>();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    Value::Table(entries)
}

fn key_string(key: &mlua::Value) -> String {
    match convert(key, MAX_DEPTH) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
