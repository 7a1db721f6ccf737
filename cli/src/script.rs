//! Scripted conversation events for replaying a session.
//!
//! A script is a YAML or JSON list of steps:
//!
//! ```yaml
//! - at_ms: 0
//!   event: { type: call-start }
//! - at_ms: 4000
//!   event: { type: message, role: assistant, transcript: "Tell me about yourself." }
//! - at_ms: 60000
//!   event: { type: call-end }
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use voicecheck_engine::ConversationEvent;

/// Error type for script loading.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read file: {0}")]
    ReadFile(#[from] io::Error),
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("failed to parse JSON: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("failed to parse file (tried YAML and JSON)")]
    ParseFailed,
    #[error("step {index} at {at_ms} ms comes before the previous step")]
    OutOfOrder { index: usize, at_ms: u64 },
}

/// One event and when to deliver it, relative to replay start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub at_ms: u64,
    pub event: ConversationEvent,
}

impl ScriptStep {
    pub fn at(&self) -> Duration {
        Duration::from_millis(self.at_ms)
    }
}

/// Ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    pub steps: Vec<ScriptStep>,
}

impl Script {
    /// Start the call immediately and end it after `duration`.
    pub fn call_of(duration: Duration) -> Self {
        Self {
            steps: vec![
                ScriptStep {
                    at_ms: 0,
                    event: ConversationEvent::CallStart,
                },
                ScriptStep {
                    at_ms: duration.as_millis() as u64,
                    event: ConversationEvent::CallEnd,
                },
            ],
        }
    }

    /// Time of the last step.
    pub fn length(&self) -> Duration {
        self.steps.last().map(ScriptStep::at).unwrap_or_default()
    }

    fn check_order(self) -> Result<Self, ScriptError> {
        for (index, pair) in self.steps.windows(2).enumerate() {
            if pair[1].at_ms < pair[0].at_ms {
                return Err(ScriptError::OutOfOrder {
                    index: index + 1,
                    at_ms: pair[1].at_ms,
                });
            }
        }
        Ok(self)
    }
}

/// Loads a script from a YAML or JSON file.
pub fn load_script(path: impl AsRef<Path>) -> Result<Script, ScriptError> {
    let data = fs::read(path.as_ref())?;
    parse_script(&data, path.as_ref())
}

/// Parses script data based on file extension, or by trying YAML then JSON.
pub fn parse_script(data: &[u8], path: impl AsRef<Path>) -> Result<Script, ScriptError> {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    let script: Script = match ext.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_slice(data)?,
        Some("json") => serde_json::from_slice(data)?,
        _ => {
            if let Ok(v) = serde_yaml::from_slice(data) {
                v
            } else if let Ok(v) = serde_json::from_slice(data) {
                v
            } else {
                return Err(ScriptError::ParseFailed);
            }
        }
    };
    script.check_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use voicecheck_engine::Role;

    const YAML: &str = r#"
- at_ms: 0
  event: { type: call-start }
- at_ms: 4000
  event: { type: message, role: assistant, transcript: "Tell me about yourself." }
- at_ms: 9000
  event: { type: call-end }
"#;

    #[test]
    fn load_yaml() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(file, "{}", YAML).unwrap();

        let script = load_script(file.path()).unwrap();
        assert_eq!(script.steps.len(), 3);
        assert_eq!(script.steps[0].event, ConversationEvent::CallStart);
        assert_eq!(
            script.steps[1].event,
            ConversationEvent::Message {
                role: Role::Assistant,
                transcript: "Tell me about yourself.".into()
            }
        );
        assert_eq!(script.length(), Duration::from_secs(9));
    }

    #[test]
    fn load_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"[{{"at_ms": 0, "event": {{"type": "call-start"}}}}, {{"at_ms": 10, "event": {{"type": "error", "message": "x"}}}}]"#
        )
        .unwrap();

        let script = load_script(file.path()).unwrap();
        assert_eq!(
            script.steps[1].event,
            ConversationEvent::Error {
                message: "x".into()
            }
        );
    }

    #[test]
    fn unknown_extension_tries_both() {
        let script = parse_script(YAML.as_bytes(), "session.txt").unwrap();
        assert_eq!(script.steps.len(), 3);
        assert!(matches!(
            parse_script(b"invalid data {{{{", "session.txt"),
            Err(ScriptError::ParseFailed)
        ));
    }

    #[test]
    fn out_of_order_steps_are_rejected() {
        let yaml = "- at_ms: 10\n  event: { type: call-start }\n- at_ms: 5\n  event: { type: call-end }\n";
        assert!(matches!(
            parse_script(yaml.as_bytes(), "s.yaml"),
            Err(ScriptError::OutOfOrder { index: 1, at_ms: 5 })
        ));
    }

    #[test]
    fn default_call_script() {
        let script = Script::call_of(Duration::from_secs(45));
        assert_eq!(script.steps.len(), 2);
        assert_eq!(script.length(), Duration::from_secs(45));
    }
}
