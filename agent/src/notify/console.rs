//! Console channel: always enabled, writes to stdout

use std::io::Write;

use async_trait::async_trait;
use chrono::Utc;
use colored::{ColoredString, Colorize};

use crate::errors::AgentError;
use crate::models::notification::{NotificationEvent, NotificationKind};
use crate::notify::{extract_primary_link, Channel};

#[derive(Debug, Clone, Default)]
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn new() -> Self {
        Self
    }

    /// Render an event as the lines written to the terminal
    pub fn render(event: &NotificationEvent) -> String {
        let badge = badge(event.kind);
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let mut out = format!(
            "{} {} {}\n  {}",
            badge,
            timestamp.to_string().dimmed(),
            event.title.bold(),
            event.message
        );
        if let Some(link) = extract_primary_link(&event.deployment, event.kind) {
            out.push_str(&format!("\n  {}", link.underline()));
        }
        out
    }
}

fn badge(kind: NotificationKind) -> ColoredString {
    let label = format!("[{}]", kind.as_str().to_uppercase());
    match kind {
        NotificationKind::Success => label.green().bold(),
        NotificationKind::Info => label.cyan().bold(),
        NotificationKind::Warning => label.yellow().bold(),
        NotificationKind::Error => label.red().bold(),
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), AgentError> {
        let rendered = Self::render(event);
        // A closed stdout must not fail the batch
        let _ = writeln!(std::io::stdout().lock(), "{}", rendered);
        Ok(())
    }
}
