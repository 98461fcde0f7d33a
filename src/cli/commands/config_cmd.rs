//! Configuration inspection command.

use console::style;

use scanscribe::Settings;

use crate::cli::icons::{dim_arrow, error};

/// Print the effective configuration, or one dot-separated setting of it.
pub fn cmd_config_show(
    settings: &Settings,
    setting: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    match &settings.source_path {
        Some(path) => eprintln!("{} Loaded from {}", dim_arrow(), path.display()),
        None => eprintln!("{} No config file found, using defaults", dim_arrow()),
    }

    let value = serde_json::to_value(settings)?;
    let selected = navigate_json(&value, setting.unwrap_or(""))?;

    if json {
        println!("{}", serde_json::to_string_pretty(selected)?);
        return Ok(());
    }

    match selected {
        serde_json::Value::String(s) => println!("{}", s),
        serde_json::Value::Object(_) => println!("{}", toml::to_string_pretty(selected)?),
        other => println!("{}", style(other).bold()),
    }
    Ok(())
}

/// Navigate a JSON value by dot-separated path.
fn navigate_json<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> anyhow::Result<&'a serde_json::Value> {
    if path.is_empty() {
        return Ok(value);
    }

    let mut current = value;
    for part in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map
                .get(part)
                .ok_or_else(|| anyhow::anyhow!("{} Setting '{}' not found", error(), path))?,
            serde_json::Value::Array(arr) => {
                let idx: usize = part
                    .parse()
                    .map_err(|_| anyhow::anyhow!("{} Invalid array index: {}", error(), part))?;
                arr.get(idx).ok_or_else(|| {
                    anyhow::anyhow!("{} Array index out of bounds: {}", error(), idx)
                })?
            }
            _ => anyhow::bail!(
                "{} Cannot navigate into non-object/array at '{}'",
                error(),
                part
            ),
        };
    }

    Ok(current)
}
