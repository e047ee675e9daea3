use keeper_database::Database;
use keeper_domain::config::ApiConfig;
use keeper_identity::SessionManager;
use keeper_transfer::{FileService, TransferEngine};
use keeper_vault::Vault;

/// Everything a handler can reach. Cheap to clone; every member is a shared handle.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub db: Database,
    pub sessions: SessionManager,
    pub vault: Vault,
    pub transfers: TransferEngine,
    pub files: FileService,
}
