use crate::models::LoginReport;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Output handler for login reports
pub struct OutputHandler {
    format: OutputFormat,
    writer: Option<Box<dyn Write + Send>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Jsonl, // Default
        }
    }
}

impl OutputHandler {
    /// Create a new output handler, appending to `file_path` when given
    pub fn new(
        format: OutputFormat,
        file_path: Option<PathBuf>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let writer: Option<Box<dyn Write + Send>> = match (&format, file_path) {
            (OutputFormat::Console, _) => None,
            (_, Some(path)) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            (_, None) => None,
        };

        Ok(OutputHandler { format, writer })
    }

    /// Create an output handler writing to an arbitrary sink
    pub fn with_writer(format: OutputFormat, writer: Box<dyn Write + Send>) -> Self {
        OutputHandler {
            format,
            writer: Some(writer),
        }
    }

    /// Write a login report
    pub fn write_report(&mut self, report: &LoginReport) -> Result<(), Box<dyn std::error::Error>> {
        match &self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(report)?;
                self.write_output(&format!("{}\n", json))?;
            }
            OutputFormat::Jsonl => {
                let json = serde_json::to_string(report)?;
                self.write_output(&format!("{}\n", json))?;
            }
            OutputFormat::Console => {
                let output = format!("{}\n", console_line(report));
                self.write_output(&output)?;
            }
        }
        Ok(())
    }

    fn write_output(&mut self, data: &str) -> Result<(), Box<dyn std::error::Error>> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", data);
                std::io::stdout().flush()?;
            }
        }
        Ok(())
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

fn console_line(report: &LoginReport) -> String {
    let entry = &report.entry;
    let outcome = if entry.success { "OK" } else { "FAILED" };

    let mut line = format!(
        "[{}] {} {} from {} ({}, {})",
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        outcome,
        entry.email,
        entry.ip,
        entry.location.display_location(),
        entry.device.summary()
    );

    if let Some(risk) = &report.risk {
        let factors: Vec<&str> = risk.risk_factors.iter().map(|f| f.label()).collect();
        line.push_str(&format!(" risk={}", risk.risk_score));
        if !factors.is_empty() {
            line.push_str(&format!(" [{}]", factors.join(", ")));
        }
        if risk.requires_verification {
            line.push_str(" VERIFY");
        }
    }

    if let Some(finding) = report.verdict.as_ref().and_then(|v| v.finding.as_ref()) {
        line.push_str(&format!(
            " SUSPICIOUS {} ({}): {}",
            finding.reason(),
            finding.severity(),
            finding.describe()
        ));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Detected, DeviceInfo, Finding, LocationInfo, LoginLogEntry, RiskEvaluation, RiskFactor,
        SuspiciousVerdict,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::io::Read;

    fn report() -> LoginReport {
        LoginReport {
            entry: LoginLogEntry {
                id: Some(7),
                user_id: Some("u1".to_string()),
                email: "u1@example.com".to_string(),
                ip: "92.184.1.1".to_string(),
                device: DeviceInfo::default(),
                location: LocationInfo {
                    country: Detected::Known("FR".to_string()),
                    city: Detected::Known("Paris".to_string()),
                    ..LocationInfo::unknown()
                },
                fingerprint: "fp".to_string(),
                success: true,
                failure_reason: None,
                headers: BTreeMap::new(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap(),
            },
            risk: Some(RiskEvaluation::from_contributions(
                &[(RiskFactor::NewDevice, 30), (RiskFactor::NewCountry, 40)],
                50,
            )),
            verdict: Some(SuspiciousVerdict::flagged(Finding::GeoMismatch {
                previous_country: "CI".to_string(),
                current_country: "FR".to_string(),
            })),
        }
    }

    #[test]
    fn test_console_line() {
        let line = console_line(&report());
        assert!(line.starts_with("[2024-05-10 03:00:00] OK u1@example.com from 92.184.1.1"));
        assert!(line.contains("risk=70 [new device, new country] VERIFY"));
        assert!(line.contains("SUSPICIOUS geo mismatch (medium)"));
    }

    #[test]
    fn test_jsonl_to_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut handler =
            OutputHandler::new(OutputFormat::Jsonl, Some(file.path().to_path_buf())).unwrap();
        handler.write_report(&report()).unwrap();
        handler.write_report(&report()).unwrap();
        handler.flush().unwrap();

        let mut contents = String::new();
        std::fs::File::open(file.path())
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["risk"]["risk_score"], 70);
        assert_eq!(parsed["verdict"]["finding"]["rule"], "geo_mismatch");
        assert_eq!(parsed["entry"]["location"]["region"], serde_json::Value::Null);
    }

    /// Writer that keeps its bytes readable after being boxed
    #[derive(Clone, Default)]
    struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_pretty_json_to_writer() {
        let buffer = SharedBuffer::default();
        let mut handler = OutputHandler::with_writer(OutputFormat::Json, Box::new(buffer.clone()));
        handler.write_report(&report()).unwrap();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(written.lines().count() > 1);
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["entry"]["email"], "u1@example.com");
        assert_eq!(parsed["risk"]["requires_verification"], true);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!(OutputFormat::from_str("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("console"), OutputFormat::Console);
        assert_eq!(OutputFormat::from_str("xml"), OutputFormat::Jsonl);
    }
}
