//! # overlap-core
//!
//! Core library for the Overlap hook: config, local session state, the server
//! client, and lazy session registration.
//!
//! ## Design Principles
//!
//! - **Synchronous**: one blocking HTTP call or subprocess at a time, each with a timeout.
//! - **No globals**: a [`StateStore`] and an [`OverlapApi`] are built per invocation
//!   and passed by reference.
//! - **Graceful degradation**: missing or corrupt state reads as absent; probes
//!   fall back to defaults. Only writes and server calls return errors.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use overlap_core::{HttpTransport, OverlapApi, Registrar, StateStore, SystemProbe};
//!
//! let store = StateStore::open_default()?;
//! let api = OverlapApi::new(HttpTransport::new(store.load_config())?);
//! let registrar = Registrar::new(&store, &api, &SystemProbe);
//! let session = registrar.ensure_registered(transcript, session_id, cwd)?;
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod hook;
pub mod probe;
pub mod registration;
pub mod store;
pub mod transport;
pub mod types;

pub use api::OverlapApi;
pub use config::{Config, ConfigOverrides};
pub use error::{OverlapError, Result};
pub use hook::{HookEvent, HookInput, HookOutput};
pub use probe::{EnvironmentInfo, GitInfo, Probe, SystemProbe};
pub use registration::{Registrar, Registration, RegistrationState};
pub use store::StateStore;
pub use transport::{HttpMethod, HttpTransport, Transport};

#[cfg(any(test, feature = "test-support"))]
pub use transport::FakeTransport;
