//! Member notifications.
//!
//! Delivery is fire-and-forget: the engine hands a [`Notification`] to its
//! [`Notifier`] after the triggering change has committed, logs any failure
//! and carries on.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Loan,
    Maturity,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loan => "loan",
            Self::Maturity => "maturity",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub member_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn loan_update(member_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            member_id,
            title: "Loan Update".to_string(),
            message: message.into(),
            kind: NotificationKind::Loan,
        }
    }

    pub fn maturity_update(member_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            member_id,
            title: "Maturity Update".to_string(),
            message: message.into(),
            kind: NotificationKind::Maturity,
        }
    }
}

#[derive(Error, Debug)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel for member notifications.
pub trait Notifier: Send + Sync + std::fmt::Debug {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Default notifier: emits one tracing event per notification.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            member_id = %notification.member_id,
            kind = notification.kind.as_str(),
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}
