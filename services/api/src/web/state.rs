//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use recording_core::ports::DatabaseService;
use recording_core::sessions::SessionRegistry;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    /// The live recording sessions, keyed by user name.
    pub sessions: Arc<SessionRegistry>,
}
