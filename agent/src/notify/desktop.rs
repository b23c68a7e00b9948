//! Desktop channel
//!
//! Only meaningful on a desktop OS. Notifications are sent at the highest
//! urgency so focus and do-not-disturb modes do not swallow them, and errors
//! carry a different sound from everything else so operators can triage by
//! ear.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::deploy::command::{shell_quote, CommandRunner, Invocation};
use crate::errors::AgentError;
use crate::models::notification::{NotificationEvent, NotificationKind};
use crate::notify::Channel;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Desktop platforms with a notification command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// `notify-send` (libnotify)
    Linux,
    /// `terminal-notifier`
    MacOs,
}

impl Platform {
    /// The platform this binary runs on, if it has a desktop
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else {
            None
        }
    }
}

/// Audible cue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Success,
    Alert,
}

impl Sound {
    /// Platform sound name
    pub fn name(&self, platform: Platform) -> &'static str {
        match (self, platform) {
            (Sound::Success, Platform::Linux) => "complete",
            (Sound::Alert, Platform::Linux) => "dialog-error",
            (Sound::Success, Platform::MacOs) => "Glass",
            (Sound::Alert, Platform::MacOs) => "Basso",
        }
    }
}

/// Errors get the alert cue; everything else the success cue
pub fn sound_for(kind: NotificationKind) -> Sound {
    match kind {
        NotificationKind::Error => Sound::Alert,
        NotificationKind::Info | NotificationKind::Success | NotificationKind::Warning => {
            Sound::Success
        }
    }
}

pub struct DesktopChannel {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
}

impl DesktopChannel {
    pub fn new(platform: Platform, runner: Arc<dyn CommandRunner>) -> Self {
        Self { platform, runner }
    }

    /// Shell command that raises the notification
    pub fn command(&self, event: &NotificationEvent) -> String {
        let sound = sound_for(event.kind).name(self.platform);
        let title = shell_quote(&event.title);
        let message = shell_quote(&event.message);
        match self.platform {
            Platform::Linux => format!(
                "notify-send --urgency=critical --app-name=shipd --hint=string:sound-name:{} {} {}",
                sound, title, message
            ),
            Platform::MacOs => format!(
                "terminal-notifier -title {} -message {} -sound {} -ignoreDnD -group shipd",
                title, message, sound
            ),
        }
    }
}

#[async_trait]
impl Channel for DesktopChannel {
    fn name(&self) -> &str {
        "desktop"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), AgentError> {
        let invocation = Invocation::new(self.command(event), COMMAND_TIMEOUT);
        let outcome = self.runner.run(&invocation).await;
        if outcome.success {
            Ok(())
        } else {
            Err(AgentError::NotifyError(format!(
                "desktop notification failed: {}",
                outcome.summary()
            )))
        }
    }
}
