//! Application state shared across routes

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::store::{
    ApprovalStore, ContentCalendarStore, CustomerStore, FileStore, IncomeStore, InventoryStore,
    MessageStore, TaskStore, UserStore,
};
use crate::whatsapp::WhatsAppClient;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub users: UserStore,
    pub customers: CustomerStore,
    pub content: ContentCalendarStore,
    pub tasks: TaskStore,
    pub approvals: ApprovalStore,
    pub inventory: InventoryStore,
    pub income: IncomeStore,
    pub messages: MessageStore,
    pub files: FileStore,
    /// Present only when the WhatsApp block is configured
    pub whatsapp: Option<WhatsAppClient>,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        let config = Arc::new(config);

        let files = FileStore::new(pool.clone(), config.upload_dir.clone());
        let whatsapp = config.whatsapp.as_ref().map(WhatsAppClient::new);

        Self {
            users: UserStore::new(pool.clone()),
            customers: CustomerStore::new(pool.clone()),
            content: ContentCalendarStore::new(pool.clone()),
            tasks: TaskStore::new(pool.clone()),
            approvals: ApprovalStore::new(pool.clone()),
            inventory: InventoryStore::new(pool.clone()),
            income: IncomeStore::new(pool.clone()),
            messages: MessageStore::new(pool.clone()),
            files,
            whatsapp,
            pool,
            config,
        }
    }
}
