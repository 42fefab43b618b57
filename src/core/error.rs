use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    AliasNotFound,

    SshIdentityFileNotFound,

    PreconditionFailed,
    RevisionNotFound,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::AliasNotFound => "alias.not_found",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",

            ErrorCode::PreconditionFailed => "deploy.precondition_failed",
            ErrorCode::RevisionNotFound => "deploy.revision_not_found",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionDetails {
    pub alias: String,
    pub check: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionNotFoundDetails {
    pub kind: String,
    pub revision: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshIdentityFileNotFoundDetails {
    pub alias: String,
    pub identity_file: String,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(ErrorCode::ValidationInvalidArgument, problem, details)
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });

        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    pub fn alias_not_found(id: impl Into<String>, suggestions: Vec<String>) -> Self {
        let id = id.into();
        let message = format!("Invalid alias '{}'", id);
        Self::new(
            ErrorCode::AliasNotFound,
            message,
            to_details(NotFoundDetails { id, suggestions }),
        )
        .with_hint("Alias files live in ~/.config/drydock/aliases/<name>.json")
    }

    pub fn ssh_identity_file_not_found(
        alias: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            to_details(SshIdentityFileNotFoundDetails {
                alias: alias.into(),
                identity_file: identity_file.into(),
            }),
        )
    }

    /// A check that must pass before any state-changing action runs.
    pub fn precondition_failed(
        alias: impl Into<String>,
        check: impl Into<String>,
        message: impl Into<String>,
        output: Option<String>,
    ) -> Self {
        Self::new(
            ErrorCode::PreconditionFailed,
            message,
            to_details(PreconditionDetails {
                alias: alias.into(),
                check: check.into(),
                output,
            }),
        )
    }

    pub fn revision_not_found(
        kind: impl Into<String>,
        revision: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::RevisionNotFound,
            message,
            to_details(RevisionNotFoundDetails {
                kind: kind.into(),
                revision: revision.into(),
            }),
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            to_details(ConfigMissingKeyDetails {
                key: key.into(),
                path,
            }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            to_details(ConfigInvalidJsonDetails {
                path: path.into(),
                error: err.to_string(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalJsonErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
