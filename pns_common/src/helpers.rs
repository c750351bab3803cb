use std::{env, fs, io};

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads a boolean flag from the environment variable `name`.
pub fn env_flag(name: &str, default: bool) -> bool {
    parse_boolean_flag(env::var(name).ok(), default)
}

/// Splits a comma-separated list, trimming whitespace and discarding empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

/// Reads a value either directly from `name`, or from the file whose path is given in `{name}_FILE`.
///
/// The inline variable wins when both are set. Returns `Ok(None)` when neither is set.
pub fn env_or_file(name: &str) -> io::Result<Option<String>> {
    if let Ok(value) = env::var(name) {
        return Ok(Some(value));
    }
    match env::var(format!("{name}_FILE")) {
        Ok(path) => fs::read_to_string(path.trim()).map(Some),
        Err(_) => Ok(None),
    }
}
