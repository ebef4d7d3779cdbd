use anyhow::{anyhow, Result};

// Include the entire .env file as a string at compile time
const ENV_FILE: &str = include_str!("../.env");

/// Look up `key` in the embedded .env content.
pub fn get_embedded_env_value(key: &str) -> Result<String> {
    lookup(ENV_FILE, key).ok_or_else(|| {
        anyhow!("'{key}' not found in .env. Make sure it contains a line like: {key}=your_value")
    })
}

fn lookup(contents: &str, key: &str) -> Option<String> {
    let search_pattern = format!("{}=", key);

    for line in contents.lines() {
        let line = line.trim();

        // Skip comments and empty lines
        if line.starts_with('#') || line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix(&search_pattern) {
            return Some(value.trim_matches('"').trim_matches('\'').to_string());
        }
    }

    None
}
