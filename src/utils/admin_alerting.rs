use chrono::Utc;
use log::{error, info, warn};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Severity levels for admin alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Medium => "MEDIUM",
        }
    }
}

/// Types of admin alerts raised by the payment ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    CreditGrantFailure,
    WebhookProcessingFailure,
    FraudWarning,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::CreditGrantFailure => "CREDIT_GRANT_FAILURE",
            AlertType::WebhookProcessingFailure => "WEBHOOK_PROCESSING_FAILURE",
            AlertType::FraudWarning => "FRAUD_WARNING",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminAlert {
    pub alert_id: Uuid,
    pub timestamp: chrono::DateTime<Utc>,
    pub severity: AlertSeverity,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

impl AdminAlert {
    pub fn new(
        severity: AlertSeverity,
        alert_type: AlertType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            alert_type,
            title: title.into(),
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn subject(&self) -> String {
        format!("[{}] {}", self.severity.as_str(), self.title)
    }

    /// Writes the alert to the application log at a level matching its severity.
    pub fn log(&self) {
        let alert_json = json!({
            "alert_id": self.alert_id,
            "timestamp": self.timestamp.to_rfc3339(),
            "severity": self.severity.as_str(),
            "alert_type": self.alert_type.as_str(),
            "title": self.title,
            "description": self.description,
            "metadata": self.metadata,
        });

        match self.severity {
            AlertSeverity::Critical => error!("ADMIN ALERT: {}", alert_json),
            AlertSeverity::High => warn!("ADMIN ALERT: {}", alert_json),
            AlertSeverity::Medium => info!("ADMIN ALERT: {}", alert_json),
        }
    }

    pub fn email_body(&self) -> String {
        let mut body = format!(
            "Admin Alert Notification\n\n\
            Alert ID: {}\n\
            Timestamp: {}\n\
            Severity: {}\n\
            Alert Type: {}\n\
            Title: {}\n\n\
            Description:\n{}\n\n",
            self.alert_id,
            self.timestamp.to_rfc3339(),
            self.severity.as_str(),
            self.alert_type.as_str(),
            self.title,
            self.description
        );

        if !self.metadata.is_empty() {
            body.push_str("Additional Information:\n");
            for (key, value) in &self.metadata {
                body.push_str(&format!("  {}: {}\n", key, value));
            }
            body.push('\n');
        }

        body.push_str("This is an automated notification from the payment ledger.");
        body
    }
}
