use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;

use super::{InputError, LoginEvent};

/// Tail a JSON-lines file of login events
pub struct FileTailer {
    file_path: PathBuf,
    reader: Option<BufReader<File>>,
    file_position: u64,
    from_start: bool,
    /// Trailing line not yet terminated by a newline
    pending: Vec<u8>,
}

impl FileTailer {
    /// Create a tailer that only sees lines appended after it starts
    pub fn new(file_path: PathBuf) -> Self {
        FileTailer {
            file_path,
            reader: None,
            file_position: 0,
            from_start: false,
            pending: Vec::new(),
        }
    }

    /// Create a tailer that also replays the existing contents
    pub fn from_start(file_path: PathBuf) -> Self {
        FileTailer {
            from_start: true,
            ..Self::new(file_path)
        }
    }

    /// Initialize the file reader
    pub fn initialize(&mut self) -> Result<(), InputError> {
        let file = File::open(&self.file_path)?;
        let mut reader = BufReader::new(file);

        if !self.from_start {
            reader.seek(SeekFrom::End(0))?;
        }
        self.file_position = reader.stream_position()?;
        self.reader = Some(reader);

        Ok(())
    }

    /// Read the events appended since the last call
    ///
    /// Malformed lines, including ones that are not UTF-8, are skipped.
    pub fn read_events(&mut self) -> Result<Vec<LoginEvent>, InputError> {
        if self.reader.is_none() {
            self.initialize()?;
        }

        let mut lines = Vec::new();
        if let Some(reader) = self.reader.as_mut() {
            loop {
                let mut line = Vec::new();
                let bytes_read = match reader.read_until(b'\n', &mut line) {
                    Ok(n) => n,
                    // Keep what was already read; the rest comes on the next call
                    Err(e) if !lines.is_empty() => {
                        log::warn!("Error reading {:?}: {}", self.file_path, e);
                        break;
                    }
                    Err(e) => return Err(e.into()),
                };

                if bytes_read == 0 {
                    break; // EOF
                }
                self.file_position += bytes_read as u64;

                if line.last() != Some(&b'\n') {
                    // Writer is mid-line; finish it on the next read
                    self.pending.extend_from_slice(&line);
                    break;
                }

                let mut complete = std::mem::take(&mut self.pending);
                complete.extend_from_slice(&line);
                lines.push(complete);
            }
        }

        let mut events = Vec::new();
        for bytes in lines {
            let line = match std::str::from_utf8(&bytes) {
                Ok(line) => line,
                Err(e) => {
                    log::debug!("Skipping non UTF-8 line in {:?}: {}", self.file_path, e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match LoginEvent::parse(line) {
                Ok(event) => events.push(event),
                Err(e) => log::debug!("Skipping line in {:?}: {}", self.file_path, e),
            }
        }

        Ok(events)
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.file_position
    }

    /// Check if the file still exists and is readable
    pub fn is_valid(&self) -> bool {
        self.file_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EVENT: &str = r#"{"user_id":"u1","email":"u1@example.com","success":true}"#;

    #[test]
    fn test_tail_only_sees_new_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", EVENT).unwrap();

        let mut tailer = FileTailer::new(file.path().to_path_buf());
        assert!(tailer.read_events().unwrap().is_empty());

        writeln!(file, "{}", EVENT).unwrap();
        writeln!(file, "garbage").unwrap();
        file.flush().unwrap();

        let events = tailer.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_from_start_replays_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", EVENT).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", EVENT).unwrap();
        file.flush().unwrap();

        let mut tailer = FileTailer::from_start(file.path().to_path_buf());
        assert_eq!(tailer.read_events().unwrap().len(), 2);
        assert!(tailer.read_events().unwrap().is_empty());
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut tailer = FileTailer::new(file.path().to_path_buf());
        tailer.initialize().unwrap();

        let (head, tail) = EVENT.split_at(20);
        write!(file, "{}", head).unwrap();
        file.flush().unwrap();
        assert!(tailer.read_events().unwrap().is_empty());

        writeln!(file, "{}", tail).unwrap();
        file.flush().unwrap();
        assert_eq!(tailer.read_events().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut tailer = FileTailer::new(file.path().to_path_buf());
        tailer.initialize().unwrap();

        writeln!(file, "{}", EVENT).unwrap();
        writeln!(file, "{}", EVENT).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        writeln!(file, "{}", EVENT).unwrap();
        file.flush().unwrap();

        assert_eq!(tailer.read_events().unwrap().len(), 3);
        assert!(tailer.read_events().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let mut tailer = FileTailer::new(PathBuf::from("/nonexistent/login-events.jsonl"));
        assert!(!tailer.is_valid());
        assert!(matches!(tailer.read_events(), Err(InputError::Io(_))));
    }
}
