use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    DuplicateKey,
    NotFound,
    StoreUnavailable,
    StreamFailed,
}

/// Field name to message, kept in the order the fields were validated.
///
/// Each field holds at most one message: the first rule it failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors {
    entries: Vec<(String, String)>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }

    /// Records `message` for `field` unless the field already failed.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        if self.contains(&field) {
            return;
        }
        self.entries.push((field, message.into()));
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// First failure in validation order, used as the headline message.
    pub fn first(&self) -> Option<(&str, &str)> {
        self.entries
            .first()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("validation failed: {}", headline(.0))]
    ValidationFailed(FieldErrors),
    #[error("{entity} with this {field} already exists")]
    DuplicateKey {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("generation failed: {0}")]
    StreamFailed(String),
}

fn headline(errors: &FieldErrors) -> &str {
    errors
        .first()
        .map(|(_, message)| message)
        .unwrap_or("Validation failed")
}

impl StateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StateError::ValidationFailed(_) => ErrorCode::Validation,
            StateError::DuplicateKey { .. } => ErrorCode::DuplicateKey,
            StateError::NotFound { .. } => ErrorCode::NotFound,
            StateError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            StateError::StreamFailed(_) => ErrorCode::StreamFailed,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            StateError::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }

    /// One-line message suitable for a toast.
    pub fn headline(&self) -> String {
        match self {
            StateError::ValidationFailed(errors) => headline(errors).to_string(),
            StateError::DuplicateKey { entity, field, .. } => {
                format!("{} with this {field} already exists", capitalize(entity))
            }
            StateError::NotFound { entity, .. } => format!("{} not found", capitalize(entity)),
            StateError::StoreUnavailable(reason) => format!("Store unavailable: {reason}"),
            StateError::StreamFailed(reason) => format!("Email generation failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            code: None,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            code: None,
            message: message.into(),
        }
    }
}

impl From<&StateError> for Notification {
    fn from(value: &StateError) -> Self {
        Self {
            level: NotificationLevel::Error,
            code: Some(value.code()),
            message: value.headline(),
        }
    }
}

pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
