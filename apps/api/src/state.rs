use std::sync::Arc;

use crate::config::Config;
use crate::diagnosis::store::SessionStore;
use crate::report::generator::ReportGenerator;
use crate::report::store::ReportStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub reports: Arc<dyn ReportStore>,
    /// Pluggable report backend. Default: `LlmReportGenerator`.
    pub report_generator: Arc<dyn ReportGenerator>,
    pub config: Config,
}
