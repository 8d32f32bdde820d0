//! Shared application state

use std::sync::Arc;
use tusk_core::Config;
use tusk_services::UploadService;

pub struct AppState {
    pub service: Arc<UploadService>,
    pub config: Config,
}
