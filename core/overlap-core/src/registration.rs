//! Lazy session registration.
//!
//! ## State Machine (per transcript)
//!
//! ```text
//! Unregistered ──transcript exists──▶ Pending ──server assigns id──▶ Registered
//!      │                                 │
//!      └─ transcript missing: no-op      └─ request fails: stays Pending, retried next hook
//! ```
//!
//! `Registered` is terminal. Each hook is its own process, so two invocations
//! can both see `Pending` and both call the server. The server deduplicates;
//! locally the last mapping write wins and nothing else is shared.

use std::path::Path;

use crate::api::OverlapApi;
use crate::error::Result;
use crate::probe::Probe;
use crate::store::StateStore;
use crate::transport::Transport;
use crate::types::{PendingSession, StartSessionRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Pending(PendingSession),
    Registered(String),
}

/// A session the server has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub session_id: String,
    pub repo_name: Option<String>,
}

pub struct Registrar<'a, T, P> {
    store: &'a StateStore,
    api: &'a OverlapApi<T>,
    probe: &'a P,
}

impl<'a, T: Transport, P: Probe> Registrar<'a, T, P> {
    pub fn new(store: &'a StateStore, api: &'a OverlapApi<T>, probe: &'a P) -> Self {
        Self { store, api, probe }
    }

    pub fn state(&self, transcript_path: &str) -> RegistrationState {
        if let Some(session_id) = self.store.registered_session(transcript_path) {
            return RegistrationState::Registered(session_id);
        }
        match self.store.pending(transcript_path) {
            Some(pending) => RegistrationState::Pending(pending),
            None => RegistrationState::Unregistered,
        }
    }

    /// Returns the server session id for `transcript_path`, registering it if
    /// needed. `Ok(None)` means "not yet": the transcript has not been written,
    /// or the server could not be reached (the draft stays pending).
    ///
    /// Only local write failures are returned as errors.
    pub fn ensure_registered(
        &self,
        transcript_path: &str,
        session_id: &str,
        cwd: &str,
    ) -> Result<Option<String>> {
        let pending = match self.state(transcript_path) {
            RegistrationState::Registered(server_id) => {
                tracing::debug!(transcript_path, server_session_id = %server_id, "Already registered");
                return Ok(Some(server_id));
            }
            RegistrationState::Pending(pending) => {
                tracing::info!(transcript_path, "Finalizing pending registration");
                pending
            }
            RegistrationState::Unregistered => {
                if !Path::new(transcript_path).exists() {
                    tracing::debug!(transcript_path, "Transcript not written yet, deferring registration");
                    return Ok(None);
                }
                let environment = self.probe.gather(cwd);
                let pending = PendingSession::new(transcript_path, session_id, cwd, environment);
                self.store.save_pending(&pending)?;
                tracing::info!(transcript_path, session_id, "Pending registration created");
                pending
            }
        };

        self.finalize(&pending)
    }

    fn finalize(&self, pending: &PendingSession) -> Result<Option<String>> {
        let server_id = match self.api.start_session(&StartSessionRequest::from(pending)) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(
                    transcript_path = %pending.transcript_path,
                    error = %err,
                    "Registration failed, leaving it pending"
                );
                return Ok(None);
            }
        };

        self.store.save_registration(
            &pending.transcript_path,
            &server_id,
            pending.repo_name.as_deref(),
        )?;
        self.store.clear_pending(&pending.transcript_path)?;
        tracing::info!(
            transcript_path = %pending.transcript_path,
            server_session_id = %server_id,
            "Session registered"
        );
        Ok(Some(server_id))
    }

    /// Registers immediately without a transcript key (no pending record).
    /// Used when the host tool does not report a transcript path.
    pub fn register_untracked(&self, session_id: &str, cwd: &str) -> Result<Registration> {
        let environment = self.probe.gather(cwd);
        let repo_name = environment.git.repo_name.clone();
        let request = StartSessionRequest::from_environment(session_id, cwd, environment);
        let session_id = self.api.start_session(&request)?;
        Ok(Registration {
            session_id,
            repo_name,
        })
    }
}
