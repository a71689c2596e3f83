use axum::http::{HeaderMap, HeaderName, HeaderValue};
use domain::{ENTITY_NAME, OperationId};
use thiserror::Error;
use tracing::warn;

use crate::config::DEFAULT_APP_NAME;

#[derive(Error, Debug, PartialEq)]
pub enum AlertConfigError {
    #[error("App name '{0}' cannot be used in a header name")]
    InvalidAppName(String),
}

/// Names of the `X-<app>-*` headers that report outcomes to the client.
#[derive(Debug, Clone)]
pub struct AlertHeaders {
    app_name: String,
    alert: HeaderName,
    error: HeaderName,
    warning: HeaderName,
    params: HeaderName,
}

impl AlertHeaders {
    pub fn new(app_name: &str) -> Result<Self, AlertConfigError> {
        let name = |suffix: &str| {
            HeaderName::from_bytes(format!("x-{}-{}", app_name, suffix).as_bytes())
                .map_err(|_| AlertConfigError::InvalidAppName(app_name.to_string()))
        };
        Ok(Self {
            app_name: app_name.to_string(),
            alert: name("alert")?,
            error: name("error")?,
            warning: name("warning")?,
            params: name("params")?,
        })
    }

    /// Headers for the default `operationsApp` name.
    pub fn fallback() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            alert: HeaderName::from_static("x-operationsapp-alert"),
            error: HeaderName::from_static("x-operationsapp-error"),
            warning: HeaderName::from_static("x-operationsapp-warning"),
            params: HeaderName::from_static("x-operationsapp-params"),
        }
    }

    pub fn created(&self, id: OperationId) -> HeaderMap {
        self.entity_alert("created", id)
    }

    pub fn updated(&self, id: OperationId) -> HeaderMap {
        self.entity_alert("updated", id)
    }

    pub fn deleted(&self, id: OperationId) -> HeaderMap {
        self.entity_alert("deleted", id)
    }

    /// `X-<app>-error: error.<key>` plus the entity name as params.
    pub fn failure(&self, error_key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(&mut headers, &self.error, &format!("error.{}", error_key));
        insert(&mut headers, &self.params, ENTITY_NAME);
        headers
    }

    /// Flags a response whose store write committed but whose index update failed.
    pub fn add_warning(&self, headers: &mut HeaderMap, reason: &str) {
        insert(headers, &self.warning, reason);
    }

    fn entity_alert(&self, action: &str, id: OperationId) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(
            &mut headers,
            &self.alert,
            &format!("{}.{}.{}", self.app_name, ENTITY_NAME, action),
        );
        insert(&mut headers, &self.params, &id.to_string());
        headers
    }
}

fn insert(headers: &mut HeaderMap, name: &HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name.clone(), value);
        }
        Err(_) => warn!(header = %name, "Dropping header value that is not valid ASCII"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_entity_alerts() {
        let alerts = AlertHeaders::new("operationsApp").unwrap();
        let headers = alerts.created(OperationId::new(7));
        assert_eq!(
            headers["x-operationsapp-alert"],
            "operationsApp.operation.created"
        );
        assert_eq!(headers["x-operationsapp-params"], "7");
    }

    #[test]
    fn builds_failure_alerts() {
        let alerts = AlertHeaders::new("operationsApp").unwrap();
        let headers = alerts.failure("idexists");
        assert_eq!(headers["x-operationsapp-error"], "error.idexists");
        assert_eq!(headers["x-operationsapp-params"], "operation");
    }

    #[test]
    fn rejects_names_with_spaces() {
        assert_eq!(
            AlertHeaders::new("bad name").unwrap_err(),
            AlertConfigError::InvalidAppName("bad name".to_string())
        );
    }
}
