//! Hook payloads exchanged with the host tool over stdin/stdout.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OverlapError, Result};

/// Raw hook input. Every event shares the common fields; the rest depend on
/// `hook_event_name`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,

    // SessionStart
    #[serde(default)]
    pub source: Option<String>,

    // PostToolUse
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,

    // SessionEnd
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    SessionStart { source: String },
    PostToolUse { tool_name: String, file_path: Option<String> },
    SessionEnd,
    Unknown { event_name: String },
}

impl HookInput {
    /// Parses the JSON document a hook receives on stdin.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| OverlapError::InvalidHookInput(e.to_string()))
    }

    pub fn to_event(&self) -> Option<HookEvent> {
        let event_name = self.hook_event_name.as_deref()?;
        let event = match event_name {
            "SessionStart" => HookEvent::SessionStart {
                source: self.source.clone().unwrap_or_default(),
            },
            "PostToolUse" => {
                let tool_name = self.tool_name.clone().unwrap_or_default();
                let file_path = self
                    .tool_input
                    .as_ref()
                    .and_then(|input| edited_file_path(&tool_name, input));
                HookEvent::PostToolUse {
                    tool_name,
                    file_path,
                }
            }
            "SessionEnd" => HookEvent::SessionEnd,
            other => HookEvent::Unknown {
                event_name: other.to_string(),
            },
        };
        Some(event)
    }

    /// Hook `cwd`, falling back to the process working directory.
    pub fn resolve_cwd(&self) -> Option<String> {
        self.cwd
            .clone()
            .filter(|cwd| !cwd.is_empty())
            .or_else(|| {
                std::env::current_dir()
                    .ok()
                    .map(|dir| dir.to_string_lossy().into_owned())
            })
    }

    /// Transcript path, when present and non-empty.
    pub fn transcript(&self) -> Option<&str> {
        self.transcript_path.as_deref().filter(|p| !p.is_empty())
    }
}

/// The file an editing tool touched, by tool shape.
pub fn edited_file_path(tool_name: &str, tool_input: &Value) -> Option<String> {
    let path = match tool_name {
        "Write" | "Edit" => tool_input.get("file_path"),
        "MultiEdit" => tool_input
            .get("edits")
            .and_then(|edits| edits.get(0))
            .and_then(|edit| edit.get("file_path")),
        "NotebookEdit" => tool_input.get("notebook_path"),
        _ => None,
    }?;
    path.as_str()
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Expresses an absolute `path` relative to `base`, walking up with `..` when
/// needed. Relative paths are returned unchanged.
pub fn relative_to(path: &str, base: &str) -> String {
    let target = Path::new(path);
    let base = Path::new(base);
    if !target.is_absolute() || !base.is_absolute() {
        return path.to_string();
    }

    let target = normalize(target);
    let base = normalize(base);

    // Different roots (e.g. Windows drives) cannot be related.
    if target.first() != base.first() {
        return path.to_string();
    }

    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        ".".to_string()
    } else {
        relative.to_string_lossy().into_owned()
    }
}

/// Lexically resolves `.` and `..` in an absolute path. `..` never climbs above the root.
fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            other => components.push(other),
        }
    }
    components
}

/// Output printed by the SessionStart hook for the host tool to display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub additional_context: String,
}

impl HookOutput {
    pub fn session_start(additional_context: String) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: "SessionStart".to_string(),
                additional_context,
            },
        }
    }
}
