use crate::backend::Backend;
use crate::comments::CommentService;
use crate::config::Config;
use crate::pdfs::PdfService;

/// Shared application state injected into all route handlers via Axum extractors.
/// Built once in `main` and handed down; services hold no global state.
#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
    pub pdfs: PdfService,
    /// Also owns the per-document realtime listener registry.
    pub comments: CommentService,
    pub config: Config,
}

impl AppState {
    pub fn new(backend: Backend, config: Config) -> Self {
        Self {
            pdfs: PdfService::new(
                backend.clone(),
                config.public_app_url.clone(),
                config.max_upload_bytes,
            ),
            comments: CommentService::new(backend.clone()),
            backend,
            config,
        }
    }
}
