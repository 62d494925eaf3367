use crate::core::message::{Message, Role};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Plain-text transcript of a chat, written as the conversation goes.
pub struct LoggingState {
    file_path: Option<PathBuf>,
    is_active: bool,
}

impl LoggingState {
    /// A file given up front starts logging immediately.
    pub fn new(log_file: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut logging = LoggingState {
            file_path: None,
            is_active: false,
        };
        if let Some(path) = log_file {
            logging.set_log_file(path)?;
        }
        Ok(logging)
    }

    pub fn set_log_file(&mut self, path: PathBuf) -> Result<String, Box<dyn std::error::Error>> {
        test_file_access(&path)?;

        let message = format!("Logging enabled to: {}", path.display());
        self.file_path = Some(path);
        self.is_active = true;
        Ok(message)
    }

    pub fn toggle_logging(
        &mut self,
        pause_message: &str,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let Some(path) = self.file_path.clone() else {
            return Err("No log file specified. Use /log <filename> to enable logging first.".into());
        };
        if self.is_active {
            // Recorded before pausing so the gap is visible in the file.
            self.log_message(&format!("## {pause_message}"))?;
            self.is_active = false;
            Ok(format!("Logging paused (file: {})", path.display()))
        } else {
            self.is_active = true;
            Ok(format!("Logging resumed to: {}", path.display()))
        }
    }

    pub fn log_message(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        match self.active_path() {
            Some(path) => write_to_log(path, content),
            None => Ok(()),
        }
    }

    /// Append one finished exchange. Empty assistant replies are omitted.
    pub fn log_exchange(
        &self,
        user_display_name: &str,
        user: &Message,
        assistant: Option<&Message>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.log_message(&format!("{user_display_name}: {}", user.content))?;
        if let Some(reply) = assistant.filter(|reply| !reply.content.is_empty()) {
            self.log_message(&reply.content)?;
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn get_status_string(&self) -> String {
        let file_name = |path: &Path| {
            path.file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        };
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", file_name(path.as_path())),
            (Some(path), false) => format!("paused ({})", file_name(path.as_path())),
        }
    }

    /// Replace the file with `messages`, e.g. after opening a stored
    /// conversation.
    pub fn rewrite_transcript(
        &self,
        messages: &[Message],
        user_display_name: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(target_path) = self.active_path() else {
            return Ok(());
        };
        let parent = target_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // Same directory as the target, so the final rename is atomic.
        let mut temp_file = NamedTempFile::new_in(parent)?;

        for message in messages {
            let block = match message.role {
                Role::User => format!("{user_display_name}: {}", message.content),
                Role::Assistant if !message.content.is_empty() => message.content.clone(),
                Role::Assistant => continue,
            };
            for line in block.lines() {
                writeln!(temp_file, "{line}")?;
            }
            writeln!(temp_file)?;
        }

        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(target_path)?;
        Ok(())
    }

    fn active_path(&self) -> Option<&Path> {
        self.file_path
            .as_deref()
            .filter(|_| self.is_active)
    }
}

fn write_to_log(path: &Path, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::with_capacity(64 * 1024, file);

    for line in content.lines() {
        writeln!(writer, "{line}")?;
    }
    // Blank line between messages.
    writeln!(writer)?;

    writer.flush()?;
    Ok(())
}

fn test_file_access(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()?;
    Ok(())
}
