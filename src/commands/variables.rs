//! `amakit variables`: turn a JSON object (usually ARM deployment outputs)
//! into Azure DevOps pipeline variables.

use anyhow::{Context as _, Result, bail};
use serde_json::Value;

use crate::Context;
use crate::devops::{self, IssueKind};

/// Rendered pipeline commands for one JSON document, in key order.
pub fn render(json: &str, prefix: &str) -> Result<Vec<String>> {
    let doc: Value = serde_json::from_str(json).context("Variable does not contain valid JSON")?;
    let Value::Object(entries) = doc else {
        bail!("Variable does not contain a JSON object");
    };

    let lines = entries
        .iter()
        .map(|(key, entry)| {
            let (value, secret) = match entry {
                Value::Object(output) => (
                    output.get("value"),
                    output.get("type").and_then(Value::as_str) == Some("securestring"),
                ),
                other => (Some(other), false),
            };

            match value.and_then(display_value) {
                Some(value) => {
                    devops::format_set_variable(&format!("{prefix}{key}"), &value, Some(secret))
                }
                None => devops::format_issue(
                    IssueKind::Warning,
                    &format!("Variable \"{key}\" does not have a value"),
                ),
            }
        })
        .collect();

    Ok(lines)
}

/// Strings print raw, other values as JSON. Null has no value.
fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn run(_ctx: &Context, variable: &str, prefix: &str) -> Result<()> {
    let json = std::env::var(variable)
        .with_context(|| format!("Environment variable {variable} is not set"))?;

    for line in render(&json, prefix)? {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_deployment_outputs() {
        let json = r#"{
            "fqdn": { "type": "String", "value": "ama.eastus.cloudapp.azure.com" },
            "adminPassword": { "type": "securestring", "value": "s3cret" },
            "instances": { "type": "Int", "value": 2 }
        }"#;

        assert_eq!(
            render(json, "ama_").unwrap(),
            vec![
                "##vso[task.setvariable variable=ama_fqdn;issecret=false]ama.eastus.cloudapp.azure.com",
                "##vso[task.setvariable variable=ama_adminPassword;issecret=true]s3cret",
                "##vso[task.setvariable variable=ama_instances;issecret=false]2",
            ]
        );
    }

    #[test]
    fn test_render_plain_values() {
        let json = r#"{ "name": "Russell", "enabled": true }"#;
        assert_eq!(
            render(json, "").unwrap(),
            vec![
                "##vso[task.setvariable variable=name;issecret=false]Russell",
                "##vso[task.setvariable variable=enabled;issecret=false]true",
            ]
        );
    }

    #[test]
    fn test_render_missing_values_warn() {
        let json = r#"{ "empty": null, "typed": { "type": "String" } }"#;
        assert_eq!(
            render(json, "").unwrap(),
            vec![
                "##vso[task.logissue type=warning]Variable \"empty\" does not have a value",
                "##vso[task.logissue type=warning]Variable \"typed\" does not have a value",
            ]
        );
    }

    #[test]
    fn test_render_nested_object_value() {
        let json = r#"{ "tags": { "value": { "env": "test" } } }"#;
        assert_eq!(
            render(json, "").unwrap(),
            vec![r#"##vso[task.setvariable variable=tags;issecret=false]{"env":"test"}"#]
        );
    }

    #[test]
    fn test_render_rejects_invalid_input() {
        assert!(render("not json", "").is_err());
        assert!(render("[1, 2]", "").is_err());
    }
}
