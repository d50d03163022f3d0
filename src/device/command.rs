//! Typed RouterOS commands for PPPoE session control.
//!
//! Session names and profile names come from subscriber records, so they are
//! validated on construction and always rendered as quoted, escaped strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const MAX_NAME_LEN: usize = 128;

/// A validated PPPoE secret (session) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_name("session name", raw).map(|name| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionName> for String {
    fn from(name: SessionName) -> Self {
        name.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated PPP profile name (the subscriber's plan on the router).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanProfile(String);

impl PlanProfile {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_name("plan profile", raw).map(|name| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlanProfile {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PlanProfile> for String {
    fn from(profile: PlanProfile) -> Self {
        profile.0
    }
}

fn validate_name<'a>(kind: &str, raw: &'a str) -> Result<&'a str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("Empty {}", kind)));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "{} longer than {} bytes",
            kind, MAX_NAME_LEN
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(AppError::BadRequest(format!(
            "{} contains control characters",
            kind
        )));
    }
    Ok(trimmed)
}

/// Quote a value for a RouterOS script. Inside double quotes `\`, `"`, `$`
/// and `?` are special.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '?') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// One command sent to a router over a fresh channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterCommand {
    /// Enable or disable the PPP secret for a subscriber
    SetSecretDisabled { name: SessionName, disabled: bool },
    /// Drop the subscriber's currently-connected session, if any
    RemoveActiveSession { name: SessionName },
    /// Point the PPP secret at a different profile
    SetSecretProfile { name: SessionName, profile: PlanProfile },
}

impl RouterCommand {
    pub fn enable(name: SessionName) -> Self {
        Self::SetSecretDisabled { name, disabled: false }
    }

    pub fn disable(name: SessionName) -> Self {
        Self::SetSecretDisabled { name, disabled: true }
    }

    pub fn session_name(&self) -> &SessionName {
        match self {
            Self::SetSecretDisabled { name, .. }
            | Self::RemoveActiveSession { name }
            | Self::SetSecretProfile { name, .. } => name,
        }
    }

    /// RouterOS script text. `[find ...]` over an empty match is a no-op, so
    /// every command is safe to repeat.
    pub fn render(&self) -> String {
        match self {
            Self::SetSecretDisabled { name, disabled } => format!(
                "/ppp secret set [find name={}] disabled={}",
                quote(name.as_str()),
                if *disabled { "yes" } else { "no" }
            ),
            Self::RemoveActiveSession { name } => format!(
                "/ppp active remove [find name={}]",
                quote(name.as_str())
            ),
            Self::SetSecretProfile { name, profile } => format!(
                "/ppp secret set [find name={}] profile={}",
                quote(name.as_str()),
                quote(profile.as_str())
            ),
        }
    }

    /// Whether an error reported by the router still means the desired state holds.
    pub fn tolerates(&self, error_output: &str) -> bool {
        match self {
            // The session went away between find and remove
            Self::RemoveActiveSession { .. } => error_output.contains("no such item"),
            _ => false,
        }
    }

    /// Human-readable summary for logs and audit entries.
    pub fn describe(&self) -> String {
        match self {
            Self::SetSecretDisabled { name, disabled } => format!(
                "PPP secret '{}' {}",
                name,
                if *disabled { "disabled" } else { "enabled" }
            ),
            Self::RemoveActiveSession { name } => format!("Active PPPoE session '{}' removed", name),
            Self::SetSecretProfile { name, profile } => format!(
                "PPP secret '{}' updated to plan '{}'",
                name,
                profile.as_str()
            ),
        }
    }
}
