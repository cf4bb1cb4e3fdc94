use std::sync::Arc;

use flowsmith_core::cost::CostEngine;
use flowsmith_core::store::{CatalogStore, GraphStore, NodeRegistry};
use flowsmith_core::validation::{RuleCache, TtlRuleCache, ValidationEngine};
use flowsmith_core::versioning::DefinitionVersioningService;
use flowsmith_core::workflows::WorkflowService;
use flowsmith_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every member is an `Arc` or a service holding `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, for health reporting. `None` when the services run
    /// over in-process stores.
    pub pool: Option<flowsmith_db::DbPool>,
    pub config: Arc<ServerConfig>,
    pub workflows: WorkflowService,
    pub definitions: DefinitionVersioningService,
    pub validation: ValidationEngine,
    pub cost: CostEngine,
    /// Activity events published by handlers after successful writes.
    pub event_bus: Arc<EventBus>,
}

impl AppState {
    /// Wire the services over the given stores. The validation engine and
    /// the versioning service share one rule cache so catalog edits
    /// invalidate what the save path reads.
    pub fn from_stores<C>(
        config: ServerConfig,
        graph: Arc<dyn GraphStore>,
        catalog: Arc<C>,
        event_bus: Arc<EventBus>,
        pool: Option<flowsmith_db::DbPool>,
    ) -> Self
    where
        C: CatalogStore + 'static,
    {
        let cache: Arc<dyn RuleCache> = Arc::new(TtlRuleCache::with_ttl(config.rule_cache_ttl));
        let registry: Arc<dyn NodeRegistry> = catalog.clone();
        let catalog: Arc<dyn CatalogStore> = catalog;

        let validation = ValidationEngine::new(Arc::clone(&registry), Arc::clone(&cache));
        Self {
            pool,
            config: Arc::new(config),
            workflows: WorkflowService::new(graph, validation.clone()),
            definitions: DefinitionVersioningService::new(catalog, cache),
            validation,
            cost: CostEngine::new(registry),
            event_bus,
        }
    }
}
