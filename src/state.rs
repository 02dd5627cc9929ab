use crate::config::AppConfig;
use crate::middleware::Limiters;
use crate::services::uploads::ImageStore;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub images: ImageStore,
    pub limiters: Limiters,
}

pub type SharedState = Arc<AppState>;
