//! Deployment notification webhook.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::log::DeployLog;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct DeployNotification {
    pub alias: String,
    pub sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub deployer: String,
    pub time: String,
    pub message: String,
}

impl DeployNotification {
    pub fn summary(alias: &str, sha: &str, deployer: &str) -> String {
        format!("{} deployed {} to {}.", deployer, sha, alias)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationResult {
    pub url: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn post(url: &str, notification: &DeployNotification) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(format!("drydock/{}", VERSION))
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;

    let response = client
        .post(url)
        .json(notification)
        .send()
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("POST {}", url))))?;

    if !response.status().is_success() {
        return Err(Error::internal_io(
            format!("Unexpected response from notification endpoint: {}", response.status()),
            Some(format!("POST {}", url)),
        ));
    }

    Ok(())
}

/// Deliver the notification. Failures are only warnings.
pub fn send(url: &str, notification: &DeployNotification, log: &dyn DeployLog) -> NotificationResult {
    match post(url, notification) {
        Ok(()) => {
            log.success(&format!("Notification sent to {}.", url));
            NotificationResult {
                url: url.to_string(),
                delivered: true,
                error: None,
            }
        }
        Err(err) => {
            let reason = err.details["error"]
                .as_str()
                .map(String::from)
                .unwrap_or(err.message);
            log.warning(&format!("Could not send notification: {}", reason));
            NotificationResult {
                url: url.to_string(),
                delivered: false,
                error: Some(reason),
            }
        }
    }
}
