use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use wayfarer::conversation::ConversationLog;
use wayfarer::models::message::Message;

/// Load a conversation recorded as one json message per line. A missing file is a new session.
pub fn read_log(session_file: &Path) -> Result<ConversationLog> {
    let mut log = ConversationLog::new();
    if !session_file.exists() {
        return Ok(log);
    }

    let reader = BufReader::new(File::open(session_file)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let message: Message = serde_json::from_str(&line).with_context(|| {
            format!(
                "Invalid message on line {} of {}",
                index + 1,
                session_file.display()
            )
        })?;
        log.append(message);
    }
    Ok(log)
}

pub fn persist_log(session_file: &Path, log: &ConversationLog) -> Result<()> {
    if let Some(dir) = session_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = File::create(session_file)?; // Create or truncate the file
    let mut writer = std::io::BufWriter::new(file);

    for message in log.messages() {
        serde_json::to_writer(&mut writer, message)?;
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}
