//! Azure DevOps logging commands.
//!
//! The pipeline agent scans stdout for lines starting with `##vso[` and
//! turns them into annotations and variables. They are printed without
//! styling so the agent can parse them.

use std::fmt;

/// Severity of a `task.logissue` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Error,
    Warning,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Format a `task.logissue` command.
pub fn format_issue(kind: IssueKind, message: &str) -> String {
    format!("##vso[task.logissue type={kind}]{message}")
}

/// Format a `task.setvariable` command.
///
/// `secret` adds the `issecret` property when given.
pub fn format_set_variable(name: &str, value: &str, secret: Option<bool>) -> String {
    match secret {
        Some(secret) => format!("##vso[task.setvariable variable={name};issecret={secret}]{value}"),
        None => format!("##vso[task.setvariable variable={name}]{value}"),
    }
}

/// Report an issue to the pipeline.
pub fn log_issue(kind: IssueKind, message: &str) {
    log::debug!("Reporting pipeline {kind}: {message}");
    println!("{}", format_issue(kind, message));
}

/// Report an error to the pipeline.
pub fn error(message: &str) {
    log_issue(IssueKind::Error, message);
}

/// Set a pipeline variable.
pub fn set_variable(name: &str, value: &str, secret: Option<bool>) {
    println!("{}", format_set_variable(name, value, secret));
}
