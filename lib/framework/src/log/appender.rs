use std::io;
use std::io::Write as _;
use std::io::stdout;

use super::ActionLogAppender;
use super::ActionLogMessage;
use crate::json;

/// Writes each action log as one json line to stdout, cloud logging parses it as structured entry.
pub struct ConsoleAppender;

impl ActionLogAppender for ConsoleAppender {
    fn append(&self, action_log: ActionLogMessage) {
        if let Ok(message) = json::to_json(&action_log) {
            let mut stdout = stdout().lock();
            let _: io::Result<()> = writeln!(stdout, "{message}");
        }
    }
}
