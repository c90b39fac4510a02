use tokio::process::Command;

/// Fire-and-forget user notifications requested by the lock coordinator.
///
/// Implementations must not block; delivery failures are their own concern.
pub trait Notifier: Send + Sync {
    fn notify_warning(&self, minutes_remaining: u32);
    fn notify_locked(&self);
    fn notify_unlocked(&self);
    fn notify_app_blocked(&self, app_name: &str);
}

/// Notification text, shared by every notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub body: String,
}

impl Message {
    #[must_use]
    pub fn warning(minutes_remaining: u32) -> Self {
        Self {
            title: "Time to Wind Down".to_string(),
            body: format!(
                "Blocking starts in {minutes_remaining} minutes. Wrap up any lingering work before you disconnect."
            ),
        }
    }

    #[must_use]
    pub fn locked() -> Self {
        Self {
            title: "WindDown Active".to_string(),
            body: "Work apps and websites are now blocked. Enjoy your personal time!".to_string(),
        }
    }

    #[must_use]
    pub fn unlocked() -> Self {
        Self {
            title: "WindDown Deactivated".to_string(),
            body: "Work apps and websites are now accessible.".to_string(),
        }
    }

    #[must_use]
    pub fn app_blocked(app_name: &str) -> Self {
        Self {
            title: "Time to Wind Down".to_string(),
            body: format!("{app_name} is blocked outside work hours. Take a break!"),
        }
    }
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    fn emit(message: &Message) {
        log::info!("[notify] {}: {}", message.title, message.body);
    }
}

impl Notifier for LogNotifier {
    fn notify_warning(&self, minutes_remaining: u32) {
        Self::emit(&Message::warning(minutes_remaining));
    }

    fn notify_locked(&self) {
        Self::emit(&Message::locked());
    }

    fn notify_unlocked(&self) {
        Self::emit(&Message::unlocked());
    }

    fn notify_app_blocked(&self, app_name: &str) {
        Self::emit(&Message::app_blocked(app_name));
    }
}

/// Shows desktop notifications through the platform's command-line helper
/// (`osascript` on macOS, `notify-send` elsewhere).
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn command(message: &Message) -> Command {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_applescript(&message.body),
                escape_applescript(&message.title)
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            cmd
        } else {
            let mut cmd = Command::new("notify-send");
            cmd.arg("--app-name=WindDown")
                .arg(&message.title)
                .arg(&message.body);
            cmd
        }
    }

    fn show(message: Message) {
        LogNotifier::emit(&message);
        let mut cmd = Self::command(&message);
        tokio::spawn(async move {
            match cmd.output().await {
                Ok(output) if !output.status.success() => log::warn!(
                    "Notification helper failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                Ok(_) => {}
                Err(e) => log::warn!("Failed to run notification helper: {e}"),
            }
        });
    }
}

impl Notifier for DesktopNotifier {
    fn notify_warning(&self, minutes_remaining: u32) {
        Self::show(Message::warning(minutes_remaining));
    }

    fn notify_locked(&self) {
        Self::show(Message::locked());
    }

    fn notify_unlocked(&self) {
        Self::show(Message::unlocked());
    }

    fn notify_app_blocked(&self, app_name: &str) {
        Self::show(Message::app_blocked(app_name));
    }
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_mention_details() {
        assert!(Message::warning(15).body.contains("15 minutes"));
        assert!(Message::app_blocked("Slack").body.starts_with("Slack"));
    }

    #[test]
    fn test_applescript_escaping() {
        assert_eq!(escape_applescript(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
    }
}
