//! Output utilities for CLI tools.

use std::fs::File;
use std::io::Write;

use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// YAML format (default).
    #[default]
    Yaml,
    /// JSON format, one document per line when streaming.
    Json,
}

/// Where and how results are written.
pub struct Output {
    pub format: OutputFormat,
    file: Option<File>,
}

impl Output {
    /// Writes to `path`, or stdout when `None`.
    pub fn new(format: OutputFormat, path: Option<&str>) -> anyhow::Result<Self> {
        let file = path.map(File::create).transpose()?;
        Ok(Self { format, file })
    }

    /// Writes one complete document.
    pub fn write<T: Serialize>(&mut self, value: &T) -> anyhow::Result<()> {
        let text = match self.format {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json => serde_json::to_string_pretty(value)? + "\n",
        };
        self.emit(&text)
    }

    /// Writes one item of a stream: a JSON line, or a YAML document
    /// separated by `---`.
    pub fn write_item<T: Serialize>(&mut self, value: &T) -> anyhow::Result<()> {
        let text = render_item(self.format, value)?;
        self.emit(&text)
    }

    fn emit(&mut self, text: &str) -> anyhow::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(text.as_bytes())?,
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}

fn render_item<T: Serialize>(format: OutputFormat, value: &T) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(value)?),
        OutputFormat::Json => serde_json::to_string(value)? + "\n",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicecheck_engine::EngineEvent;

    #[test]
    fn json_items_are_single_lines() {
        let text = render_item(OutputFormat::Json, &EngineEvent::InterviewerRotated { index: 2 })
            .unwrap();
        assert_eq!(text, "{\"event\":\"interviewer_rotated\",\"index\":2}\n");
    }

    #[test]
    fn yaml_items_are_separated_documents() {
        let text = render_item(OutputFormat::Yaml, &EngineEvent::InterviewerRotated { index: 1 })
            .unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("event: interviewer_rotated"));
    }

    #[test]
    fn writes_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut out = Output::new(OutputFormat::Json, path.to_str()).unwrap();
        out.write_item(&EngineEvent::InterviewerRotated { index: 0 }).unwrap();
        out.write_item(&EngineEvent::InterviewerRotated { index: 1 }).unwrap();
        drop(out);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
