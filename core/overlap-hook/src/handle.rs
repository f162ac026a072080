//! Event handler for Claude Code hooks.
//!
//! Reads JSON from stdin, dispatches on `hook_event_name`, and talks to the
//! Overlap server.
//!
//! ```text
//! SessionStart (startup|resume) → register session (lazily, keyed by transcript)
//! PostToolUse  (Write|Edit|MultiEdit|NotebookEdit) → heartbeat with edited file
//! SessionEnd                    → forget current session
//! anything else                 → ignored
//! ```
//!
//! Nothing here may fail the host tool: every path ends with exit code 0.

use std::io::{self, Read};
use std::path::Path;

use overlap_core::hook::relative_to;
use overlap_core::{
    Config, HookEvent, HookInput, HookOutput, HttpTransport, OverlapApi, Probe, Registrar,
    Registration, Result, StateStore, SystemProbe, Transport,
};

use crate::log_upload::{self, LogBuffer};
use crate::report::report;

pub fn run(uploads: &LogBuffer) {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        report("Failed to read stdin", &e);
        return;
    }

    if input.trim().is_empty() {
        return;
    }

    let store = match StateStore::open_default() {
        Ok(store) => store,
        Err(e) => {
            report("Cannot locate state directory", &e);
            return;
        }
    };
    let config = store.load_config();
    let transport = match HttpTransport::new(config.clone()) {
        Ok(transport) => transport,
        Err(e) => {
            report("Cannot create HTTP client", &e);
            return;
        }
    };
    let api = OverlapApi::new(transport);
    let hooks = Hooks::new(&store, &api, &SystemProbe, &config);

    process(&hooks, &input);
    log_upload::flush(&api, &config, uploads);
}

fn process<T: Transport, P: Probe>(hooks: &Hooks<'_, T, P>, input: &str) {
    let hook_input = match HookInput::parse(input) {
        Ok(hook_input) => hook_input,
        Err(e) => {
            report("Failed to parse hook input", &e);
            return;
        }
    };

    match hooks.dispatch(&hook_input) {
        Ok(Some(output)) => match serde_json::to_string(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => report("Failed to serialize hook output", &e),
        },
        Ok(None) => {}
        Err(e) => report(&format!("{} hook failed", event_label(&hook_input)), &e),
    }
}

fn event_label(input: &HookInput) -> &str {
    input.hook_event_name.as_deref().unwrap_or("Unknown")
}

pub struct Hooks<'a, T, P> {
    store: &'a StateStore,
    api: &'a OverlapApi<T>,
    probe: &'a P,
    config: &'a Config,
}

impl<'a, T: Transport, P: Probe> Hooks<'a, T, P> {
    pub fn new(
        store: &'a StateStore,
        api: &'a OverlapApi<T>,
        probe: &'a P,
        config: &'a Config,
    ) -> Self {
        Self {
            store,
            api,
            probe,
            config,
        }
    }

    fn registrar(&self) -> Registrar<'a, T, P> {
        Registrar::new(self.store, self.api, self.probe)
    }

    pub fn dispatch(&self, input: &HookInput) -> Result<Option<HookOutput>> {
        let event = match input.to_event() {
            Some(event) => event,
            None => {
                tracing::debug!("Skipping input without hook_event_name");
                return Ok(None);
            }
        };

        let span = tracing::info_span!(
            "hook",
            event = event_label(input),
            session_id = input.session_id.as_deref().unwrap_or(""),
        );
        let _enter = span.enter();

        match event {
            HookEvent::SessionStart { source } => self.session_start(input, &source),
            HookEvent::PostToolUse {
                tool_name,
                file_path,
            } => self.post_tool_use(input, &tool_name, file_path),
            HookEvent::SessionEnd => self.session_end(input),
            HookEvent::Unknown { event_name } => {
                tracing::debug!(event_name = %event_name, "Unhandled event");
                Ok(None)
            }
        }
    }

    fn session_start(&self, input: &HookInput, source: &str) -> Result<Option<HookOutput>> {
        tracing::info!(source, "Hook started");

        if !matches!(source, "startup" | "resume") {
            tracing::info!(source, "Skipping - not startup/resume");
            return Ok(None);
        }

        if !self.config.is_configured() {
            tracing::info!("Not configured - exiting");
            eprintln!("[Overlap] Not configured. Run `overlap-hook config` first.");
            return Ok(None);
        }

        let session_id = input.session_id.clone().unwrap_or_default();
        let cwd = input.resolve_cwd().unwrap_or_default();

        let registration = match input.transcript() {
            Some(transcript) => {
                match self.registrar().ensure_registered(transcript, &session_id, &cwd)? {
                    Some(server_id) => Registration {
                        session_id: server_id,
                        repo_name: self
                            .store
                            .registration(transcript)
                            .and_then(|binding| binding.repo_name),
                    },
                    None => {
                        tracing::info!(transcript, "Registration deferred");
                        eprintln!("[Overlap] Session registration deferred until the first edit");
                        return Ok(None);
                    }
                }
            }
            None => {
                if source == "resume" {
                    if let Some(existing) = self.store.current_session() {
                        tracing::info!(session_id = %existing, "Resuming existing session");
                        return Ok(None);
                    }
                }
                eprintln!("[Overlap] Starting session...");
                self.registrar().register_untracked(&session_id, &cwd)?
            }
        };

        self.store.save_current_session(&registration.session_id)?;
        tracing::info!(server_session_id = %registration.session_id, "Session started");
        eprintln!("[Overlap] Session started: {}", registration.session_id);

        let working_in = working_in(registration.repo_name.as_deref(), &cwd);
        Ok(Some(HookOutput::session_start(format!(
            "[Overlap] Session tracking started. Working in: {}",
            working_in
        ))))
    }

    fn post_tool_use(
        &self,
        input: &HookInput,
        tool_name: &str,
        file_path: Option<String>,
    ) -> Result<Option<HookOutput>> {
        if !self.config.is_configured() {
            tracing::debug!("Not configured, skipping");
            return Ok(None);
        }

        let file_path = match file_path {
            Some(path) => path,
            None => {
                tracing::debug!(tool_name, "No file path in tool input");
                return Ok(None);
            }
        };

        let cwd = input.resolve_cwd().unwrap_or_default();
        let session_id = match self.resolve_session(input, &cwd)? {
            Some(id) => id,
            None => {
                tracing::debug!("No active session, skipping");
                return Ok(None);
            }
        };

        let file_path = if cwd.is_empty() {
            file_path
        } else {
            relative_to(&file_path, &cwd)
        };

        tracing::info!(tool_name, file_path = %file_path, "Sending heartbeat");
        let result = self.api.heartbeat(&session_id, vec![file_path.clone()])?;
        tracing::info!(
            file_path = %file_path,
            scope = ?result.semantic_scope,
            "Heartbeat sent successfully"
        );
        Ok(None)
    }

    /// Server session for this hook: registered lazily when the input names a
    /// transcript, otherwise the last session started on this machine.
    fn resolve_session(&self, input: &HookInput, cwd: &str) -> Result<Option<String>> {
        let transcript = match input.transcript() {
            Some(transcript) => transcript,
            None => return Ok(self.store.current_session()),
        };

        let session_id = input.session_id.as_deref().unwrap_or_default();
        let resolved = self
            .registrar()
            .ensure_registered(transcript, session_id, cwd)?;
        if let Some(server_id) = &resolved {
            if self.store.current_session().as_deref() != Some(server_id.as_str()) {
                self.store.save_current_session(server_id)?;
            }
        }
        Ok(resolved)
    }

    fn session_end(&self, input: &HookInput) -> Result<Option<HookOutput>> {
        let ended = input
            .transcript()
            .and_then(|transcript| self.store.registered_session(transcript));
        let current = self.store.current_session();

        match (ended, current) {
            (Some(ended), Some(current)) if ended == current => {
                tracing::info!(server_session_id = %ended, reason = ?input.reason, "Session ended");
                self.store.clear_current_session()?;
            }
            _ => tracing::debug!("Ended session is not the current session"),
        }
        Ok(None)
    }
}

/// Label shown to the user: repository name, else the directory name, else the full path.
fn working_in(repo_name: Option<&str>, cwd: &str) -> String {
    repo_name
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| {
            Path::new(cwd)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| cwd.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlap_core::{EnvironmentInfo, FakeTransport, GitInfo, OverlapError};
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};

    struct StubProbe;

    impl Probe for StubProbe {
        fn gather(&self, _cwd: &str) -> EnvironmentInfo {
            EnvironmentInfo {
                hostname: "devbox".into(),
                device_name: "devbox".into(),
                is_remote: false,
                git: GitInfo {
                    repo_name: Some("overlap".into()),
                    remote_url: Some("git@github.com:overlapcode/overlap.git".into()),
                    branch: Some("main".into()),
                },
            }
        }
    }

    fn configured() -> Config {
        Config {
            server_url: Some("http://overlap.test".into()),
            team_token: Some("team".into()),
            user_token: Some("user".into()),
        }
    }

    struct Env {
        temp: TempDir,
        store: StateStore,
    }

    impl Env {
        fn new() -> Self {
            let temp = tempdir().unwrap();
            let store = StateStore::new(temp.path().join("state"));
            Self { temp, store }
        }

        fn transcript(&self, create: bool) -> String {
            let path = self.temp.path().join("transcript.jsonl");
            if create {
                std::fs::write(&path, "{}\n").unwrap();
            }
            path.to_string_lossy().into_owned()
        }
    }

    fn input(value: Value) -> HookInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_multi_edit_heartbeat_sends_relative_path() {
        let env = Env::new();
        let transcript = env.transcript(true);
        env.store
            .save_registration(&transcript, "srv-1", None)
            .unwrap();
        let api = OverlapApi::new(FakeTransport::always(json!({"data": {}})));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        hooks
            .dispatch(&input(json!({
                "hook_event_name": "PostToolUse",
                "session_id": "claude-1",
                "transcript_path": transcript,
                "cwd": "/abs",
                "tool_name": "MultiEdit",
                "tool_input": {"edits": [{"file_path": "/abs/x.py"}]}
            })))
            .unwrap();

        let requests = api.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/api/v1/sessions/srv-1/heartbeat");
        assert_eq!(requests[0].body, Some(json!({"files": ["x.py"]})));
        assert_eq!(env.store.current_session().as_deref(), Some("srv-1"));
    }

    #[test]
    fn test_heartbeat_registers_lazily_on_first_edit() {
        let env = Env::new();
        let transcript = env.transcript(true);
        let api = OverlapApi::new(
            FakeTransport::always(json!({"data": {}}))
                .push(Ok(json!({"data": {"session_id": "srv-7"}}))),
        );
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        hooks
            .dispatch(&input(json!({
                "hook_event_name": "PostToolUse",
                "session_id": "claude-1",
                "transcript_path": transcript,
                "cwd": "/repo",
                "tool_name": "Write",
                "tool_input": {"file_path": "/repo/src/main.rs"}
            })))
            .unwrap();

        let requests = api.transport().requests();
        assert_eq!(requests[0].path, "/api/v1/sessions/start");
        assert_eq!(requests[1].path, "/api/v1/sessions/srv-7/heartbeat");
        assert_eq!(requests[1].body, Some(json!({"files": ["src/main.rs"]})));
    }

    #[test]
    fn test_heartbeat_without_transcript_uses_current_session() {
        let env = Env::new();
        env.store.save_current_session("srv-current").unwrap();
        let api = OverlapApi::new(FakeTransport::always(json!({"data": {}})));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        hooks
            .dispatch(&input(json!({
                "hook_event_name": "PostToolUse",
                "cwd": "/abs",
                "tool_name": "NotebookEdit",
                "tool_input": {"notebook_path": "/abs/nb/a.ipynb"}
            })))
            .unwrap();

        let requests = api.transport().requests();
        assert_eq!(requests[0].path, "/api/v1/sessions/srv-current/heartbeat");
        assert_eq!(requests[0].body, Some(json!({"files": ["nb/a.ipynb"]})));
    }

    #[test]
    fn test_heartbeat_skips_unconfigured_and_non_edit_tools() {
        let env = Env::new();
        env.store.save_current_session("srv-current").unwrap();
        let api = OverlapApi::new(FakeTransport::always(json!({"data": {}})));

        let unconfigured = Config::default();
        Hooks::new(&env.store, &api, &StubProbe, &unconfigured)
            .dispatch(&input(json!({
                "hook_event_name": "PostToolUse",
                "tool_name": "Write",
                "tool_input": {"file_path": "/a.rs"}
            })))
            .unwrap();

        let config = configured();
        Hooks::new(&env.store, &api, &StubProbe, &config)
            .dispatch(&input(json!({
                "hook_event_name": "PostToolUse",
                "tool_name": "Bash",
                "tool_input": {"command": "ls"}
            })))
            .unwrap();

        assert_eq!(api.transport().call_count(), 0);
    }

    #[test]
    fn test_heartbeat_with_structured_scope_succeeds() {
        let env = Env::new();
        env.store.save_current_session("srv-current").unwrap();
        let api = OverlapApi::new(FakeTransport::always(
            json!({"data": {"semantic_scope": {"area": "auth", "files": ["a.rs"]}}}),
        ));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        let result = hooks.dispatch(&input(json!({
            "hook_event_name": "PostToolUse",
            "cwd": "/abs",
            "tool_name": "Edit",
            "tool_input": {"file_path": "/abs/a.rs"}
        })));

        assert!(result.unwrap().is_none());
        assert_eq!(api.transport().call_count(), 1);
    }

    #[test]
    fn test_heartbeat_failure_is_returned_to_caller() {
        let env = Env::new();
        env.store.save_current_session("srv-current").unwrap();
        let api = OverlapApi::new(FakeTransport::new().push(Err(OverlapError::Timeout)));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        let result = hooks.dispatch(&input(json!({
            "hook_event_name": "PostToolUse",
            "tool_name": "Edit",
            "tool_input": {"file_path": "/a.rs"}
        })));

        assert!(matches!(result, Err(OverlapError::Timeout)));
    }

    #[test]
    fn test_session_start_registers_and_reports_repo() {
        let env = Env::new();
        let transcript = env.transcript(true);
        let api = OverlapApi::new(FakeTransport::always(json!({"data": {"session_id": "srv-1"}})));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        let output = hooks
            .dispatch(&input(json!({
                "hook_event_name": "SessionStart",
                "source": "startup",
                "session_id": "claude-1",
                "transcript_path": transcript,
                "cwd": "/home/dev/overlap"
            })))
            .unwrap()
            .unwrap();

        assert_eq!(
            output.hook_specific_output.additional_context,
            "[Overlap] Session tracking started. Working in: overlap"
        );
        assert_eq!(env.store.current_session().as_deref(), Some("srv-1"));
    }

    #[test]
    fn test_session_start_defers_until_transcript_exists() {
        let env = Env::new();
        let transcript = env.transcript(false);
        let api = OverlapApi::new(FakeTransport::always(json!({"data": {"session_id": "srv-1"}})));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        let output = hooks
            .dispatch(&input(json!({
                "hook_event_name": "SessionStart",
                "source": "startup",
                "session_id": "claude-1",
                "transcript_path": transcript,
                "cwd": "/work"
            })))
            .unwrap();

        assert!(output.is_none());
        assert_eq!(api.transport().call_count(), 0);
        assert_eq!(env.store.current_session(), None);
    }

    #[test]
    fn test_session_start_ignores_other_sources() {
        let env = Env::new();
        let api = OverlapApi::new(FakeTransport::always(json!({"data": {"session_id": "srv-1"}})));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        let output = hooks
            .dispatch(&input(json!({
                "hook_event_name": "SessionStart",
                "source": "compact",
                "session_id": "claude-1",
                "cwd": "/work"
            })))
            .unwrap();

        assert!(output.is_none());
        assert_eq!(api.transport().call_count(), 0);
    }

    #[test]
    fn test_resume_without_transcript_keeps_existing_session() {
        let env = Env::new();
        env.store.save_current_session("srv-old").unwrap();
        let api = OverlapApi::new(FakeTransport::always(json!({"data": {"session_id": "srv-new"}})));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        hooks
            .dispatch(&input(json!({
                "hook_event_name": "SessionStart",
                "source": "resume",
                "session_id": "claude-1",
                "cwd": "/work"
            })))
            .unwrap();

        assert_eq!(api.transport().call_count(), 0);
        assert_eq!(env.store.current_session().as_deref(), Some("srv-old"));
    }

    #[test]
    fn test_startup_without_transcript_registers_immediately() {
        let env = Env::new();
        let api = OverlapApi::new(FakeTransport::always(json!({"data": {"session_id": "srv-9"}})));
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        let output = hooks
            .dispatch(&input(json!({
                "hook_event_name": "SessionStart",
                "source": "startup",
                "session_id": "claude-1",
                "cwd": "/work"
            })))
            .unwrap();

        assert!(output.is_some());
        assert_eq!(env.store.current_session().as_deref(), Some("srv-9"));
        assert!(env.store.pending("/work").is_none());
    }

    #[test]
    fn test_session_end_clears_matching_current_session() {
        let env = Env::new();
        let transcript = env.transcript(true);
        env.store
            .save_registration(&transcript, "srv-1", None)
            .unwrap();
        env.store.save_current_session("srv-1").unwrap();
        let api = OverlapApi::new(FakeTransport::new());
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        hooks
            .dispatch(&input(json!({
                "hook_event_name": "SessionEnd",
                "transcript_path": transcript,
                "reason": "exit"
            })))
            .unwrap();

        assert_eq!(env.store.current_session(), None);
    }

    #[test]
    fn test_session_end_keeps_other_current_session() {
        let env = Env::new();
        let transcript = env.transcript(true);
        env.store
            .save_registration(&transcript, "srv-1", None)
            .unwrap();
        env.store.save_current_session("srv-2").unwrap();
        let api = OverlapApi::new(FakeTransport::new());
        let config = configured();
        let hooks = Hooks::new(&env.store, &api, &StubProbe, &config);

        hooks
            .dispatch(&input(json!({
                "hook_event_name": "SessionEnd",
                "transcript_path": transcript
            })))
            .unwrap();

        assert_eq!(env.store.current_session().as_deref(), Some("srv-2"));
    }

    #[test]
    fn test_working_in_fallbacks() {
        assert_eq!(working_in(Some("repo"), "/a/b"), "repo");
        assert_eq!(working_in(Some(""), "/a/b"), "b");
        assert_eq!(working_in(None, "/"), "/");
    }
}
