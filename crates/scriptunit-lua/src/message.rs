use scriptunit::{LineNo, ScriptError};

/// Flattens an mlua error into a message and, when Lua reported one, a source line.
pub(crate) fn script_error(err: &mlua::Error) -> ScriptError {
    let message = lua_message(err);
    let message = message.split("\nstack traceback:").next().unwrap_or_default();
    match split_location(message) {
        Some((line, rest)) => ScriptError::new(rest).at_line(line),
        None => ScriptError::new(message.trim()),
    }
}

fn lua_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::CallbackError { cause, .. } => lua_message(cause),
        mlua::Error::ExternalError(err) => err.to_string(),
        other => other.to_string(),
    }
}

/// Splits `chunk:LINE: message` into the line and the message.
pub(crate) fn split_location(message: &str) -> Option<(LineNo, &str)> {
    for (index, _) in message.match_indices(':') {
        let tail = &message[index + 1..];
        let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || !tail[digits..].starts_with(':') {
            continue;
        }
        let line = tail[..digits].parse().ok()?;
        return Some((line, tail[digits + 1..].trim()));
    }
    None
}
