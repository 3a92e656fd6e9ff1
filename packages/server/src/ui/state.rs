//! Shared application state.

use crate::usecase::HubHandle;

/// Shared application state
pub struct AppState {
    /// Hub コーディネータへのハンドル
    pub hub: HubHandle,
}
