//! Reading and patching ARM template JSON.
//!
//! Templates are rewritten with 4-space indentation and their original key
//! order, so diffs against the sources stay readable.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::Path;

/// Main template of a working tree.
pub const MAIN_TEMPLATE: &str = "mainTemplate.json";

/// UI definition of a working tree.
pub const UI_DEFINITION: &str = "createUiDefinition.json";

const BASE_URL: &str = "/parameters/baseUrl/defaultValue";
const VERIFY_API_KEY: &str = "/parameters/outputs/verifyURLApiKey";
const FUNCTION_CODE: &str = "/variables/code";
const FUNCTION_CONFIG: &str = "/resources/0/properties/config";

pub fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Serialize with 4-space indentation.
pub fn to_pretty_string(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    let content = to_pretty_string(value)?;
    fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
}

/// Set the value at a JSON pointer.
///
/// The parent must already exist. Object parents get the member inserted
/// or replaced; array parents must contain the index.
pub fn set_pointer(doc: &mut Value, pointer: &str, value: Value) -> Result<()> {
    let Some((parent_ptr, last)) = pointer.rsplit_once('/') else {
        bail!("Invalid JSON pointer: {pointer}");
    };
    let key = last.replace("~1", "/").replace("~0", "~");

    let parent = doc
        .pointer_mut(parent_ptr)
        .with_context(|| format!("Template has no {parent_ptr}"))?;

    match parent {
        Value::Object(map) => {
            map.insert(key, value);
        }
        Value::Array(items) => {
            let slot = key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index))
                .with_context(|| format!("Template has no {pointer}"))?;
            *slot = value;
        }
        _ => bail!("Template value at {parent_ptr} is not an object or array"),
    }
    Ok(())
}

/// Point `parameters.baseUrl.defaultValue` at `url`.
pub fn set_base_url(doc: &mut Value, url: &str) -> Result<()> {
    set_pointer(doc, BASE_URL, Value::String(url.to_string()))
}

/// Store the URL verification API key in the UI definition outputs.
pub fn set_verify_api_key(doc: &mut Value, key: &str) -> Result<()> {
    set_pointer(doc, VERIFY_API_KEY, Value::String(key.to_string()))
}

/// Inline encoded function code and its config into a nested template.
pub fn inline_function(
    doc: &mut Value,
    code: serde_json::Map<String, Value>,
    config: Value,
) -> Result<()> {
    set_pointer(doc, FUNCTION_CODE, Value::Object(code))?;
    set_pointer(doc, FUNCTION_CONFIG, config)
}

/// Read a template, apply `patch`, and write it back.
pub fn patch_file(path: &Path, patch: impl FnOnce(&mut Value) -> Result<()>) -> Result<()> {
    let mut doc = read_json(path)?;
    patch(&mut doc).with_context(|| format!("Could not patch {}", path.display()))?;
    write_json(path, &doc)
}
