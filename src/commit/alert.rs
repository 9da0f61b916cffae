//! Alerts raised by change checkers

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::component::ComponentKind;

/// Severity of an alert. Only `Error` blocks a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub kind: ComponentKind,
    pub sequence: u32,
    /// Name of the checker that raised it.
    pub checker: String,
    pub message: String,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        kind: ComponentKind,
        sequence: u32,
        checker: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            sequence,
            checker: checker.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == AlertSeverity::Error
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]: {}",
            self.severity, self.kind, self.sequence, self.checker, self.message
        )
    }
}

/// Thread-safe multiset of alerts shared by concurrently running checkers.
#[derive(Debug, Default)]
pub struct AlertCollection {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_errors(&self) -> bool {
        self.alerts.lock().iter().any(Alert::is_error)
    }

    pub fn count(&self, severity: AlertSeverity) -> usize {
        self.alerts
            .lock()
            .iter()
            .filter(|alert| alert.severity == severity)
            .count()
    }

    /// Alerts ordered by severity (highest first), then component.
    pub fn into_sorted_vec(self) -> Vec<Alert> {
        let mut alerts = self.alerts.into_inner();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.kind.namespace().cmp(b.kind.namespace()))
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        alerts
    }
}
