use std::sync::Arc;

use tavola_db::{Database, ServiceContext, Services};

/// Shared handler state. Cloned per request; the services share one context.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub services: Arc<Services>,
}

impl AppState {
    pub fn new(ctx: ServiceContext) -> Self {
        AppState {
            db: ctx.db.clone(),
            services: Arc::new(Services::new(ctx)),
        }
    }
}
