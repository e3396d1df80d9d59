use std::sync::Arc;

use crate::config::Config;
use crate::db::store::Store;
use crate::middleware::auth::{create_actor_cache, ActorCache};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub actor_cache: ActorCache,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let actor_cache = create_actor_cache(config.actor_cache_ttl);
        Self { store, config: Arc::new(config), actor_cache }
    }
}
