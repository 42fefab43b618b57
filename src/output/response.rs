//! CLI response formatting and output.
//!
//! Provides JSON envelope, printing, and exit code mapping.

use drydock::error::Hint;
use drydock::{Error, ErrorCode, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: if err.hints.is_empty() {
                    None
                } else {
                    Some(err.hints.clone())
                },
                retryable: err.retryable,
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = response.to_json()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(()); // Exit gracefully on SIGPIPE
        }
        return Err(Error::internal_io(
            e.to_string(),
            Some("write stdout".to_string()),
        ));
    }
    Ok(())
}

pub fn print_success<T: Serialize>(data: T) -> Result<()> {
    print_response(&CliResponse::success(data))
}

pub fn map_cmd_result_to_json<T: Serialize>(
    result: Result<(T, i32)>,
) -> (Result<serde_json::Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                1,
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for_error(err.code);
            (Err(err), exit_code)
        }
    }
}

fn exit_code_for_error(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::ConfigMissingKey
        | ErrorCode::ConfigInvalidJson
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ValidationMissingArgument
        | ErrorCode::ValidationInvalidArgument
        | ErrorCode::ValidationInvalidJson => 2,

        ErrorCode::PreconditionFailed | ErrorCode::RevisionNotFound => 3,

        ErrorCode::AliasNotFound => 4,

        ErrorCode::SshIdentityFileNotFound => 10,

        ErrorCode::InternalIoError
        | ErrorCode::InternalJsonError
        | ErrorCode::InternalUnexpected => 1,
    }
}

/// Print the envelope for an already-serialized command result. A failed
/// write to stdout is reported on stderr; the exit code stays the command's.
pub fn print_json_result(result: Result<serde_json::Value>) {
    let printed = match result {
        Ok(data) => print_success(data),
        Err(err) => print_response(&CliResponse::<()>::from_error(&err)),
    };
    if let Err(err) = printed {
        eprintln!("[drydock] error: {}", err.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_failures_exit_with_three() {
        let err = Error::precondition_failed("@prod", "dumps", "No dumps.", None);
        let (result, code) = map_cmd_result_to_json::<()>(Err(err));
        assert!(result.is_err());
        assert_eq!(code, 3);
    }

    #[test]
    fn command_exit_code_passes_through() {
        let (result, code) = map_cmd_result_to_json(Ok((serde_json::json!({"success": false}), 1)));
        assert_eq!(result.unwrap()["success"], false);
        assert_eq!(code, 1);
    }

    #[test]
    fn error_envelope_carries_code_and_hints() {
        let err = Error::alias_not_found("@nope", vec![]).with_hint("Run 'drydock actions'");
        let response = CliResponse::<()>::from_error(&err);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "alias.not_found");
        assert!(value["error"]["hints"].is_array());
        assert!(value.get("data").is_none());
    }
}
