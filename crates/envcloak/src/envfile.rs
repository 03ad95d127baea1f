//! key=value parsing
//!
//! one entry per line, `#` comments and blank lines skipped, the first `=`
//! splits key from value, matching quotes around the value are stripped.
//! an optional leading `export ` is tolerated.

/// value for `name`, first match wins
pub fn lookup(content: &str, name: &str) -> Option<String> {
    entries(content)
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// every entry in file order, duplicates kept
pub fn parse_env(content: &str) -> Vec<(String, String)> {
    entries(content)
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn entries(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.lines().filter_map(parse_line)
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let key = key.strip_prefix("export ").map(str::trim).unwrap_or(key);
    if key.is_empty() {
        return None;
    }
    Some((key, unquote(value.trim())))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
