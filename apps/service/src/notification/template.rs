use tera::{Context, Tera};

use super::{Level, Message};
use crate::database::models::Monitor;

/// Which transition an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Issue,
    Recovery,
}

impl AlertKind {
    pub fn level(&self) -> Level {
        match self {
            AlertKind::Issue => Level::Error,
            AlertKind::Recovery => Level::Info,
        }
    }
}

/// Build the alert for a transition, applying the monitor's templates when set.
///
/// `result` is the diagnostic of the check that caused the transition.
pub fn build_alert(kind: AlertKind, monitor: &Monitor, result: &str) -> Message {
    let name = monitor.name();
    let connection = &monitor.spec.connection;
    let level = kind.level();

    let (default_title, default_text) = match kind {
        AlertKind::Issue => {
            let text = if result.is_empty() {
                format!("{connection} failed")
            } else {
                format!("{connection} failed: {result}")
            };
            (format!("{name} is down"), text)
        }
        AlertKind::Recovery => (format!("{name} has recovered"), format!("{connection} is reachable again")),
    };

    let notification = &monitor.spec.notification;
    let (title_template, body_template) = match kind {
        AlertKind::Issue => (&notification.issue_title, &notification.issue_body),
        AlertKind::Recovery => (&notification.recovery_title, &notification.recovery_body),
    };

    let mut message = Message::new(default_title, default_text, level);

    let mut context = Context::new();
    context.insert("name", name);
    context.insert("connection", connection);
    context.insert("result", result);
    context.insert("level", level.as_str());
    context.insert("timestamp", &message.timestamp.to_rfc3339());

    if let Some(title) = render(title_template.as_deref(), &context, monitor.id) {
        message.title = title;
    }
    if let Some(text) = render(body_template.as_deref(), &context, monitor.id) {
        message.text = text;
    }

    message
}

fn render(template: Option<&str>, context: &Context, monitor_id: i64) -> Option<String> {
    let template = template.filter(|t| !t.trim().is_empty())?;
    match Tera::one_off(template, context, false) {
        Ok(rendered) => Some(rendered),
        Err(e) => {
            tracing::warn!(monitor_id, error = %e, "Failed to render notification template, using default");
            None
        }
    }
}
