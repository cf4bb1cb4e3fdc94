use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::cache::RuleCache;
use super::evaluator::validate_field;
use super::rules::{FieldError, RuleSet, ValidationReport, DEFINITION_NOT_FOUND};
use crate::definition::IoDefinition;
use crate::error::CoreError;
use crate::graph::WorkflowNode;
use crate::store::NodeRegistry;
use crate::types::DbId;

/// Resolves rule sets through the registry (with caching) and validates the
/// configured values of workflow nodes against them.
#[derive(Clone)]
pub struct ValidationEngine {
    registry: Arc<dyn NodeRegistry>,
    cache: Arc<dyn RuleCache>,
}

impl ValidationEngine {
    pub fn new(registry: Arc<dyn NodeRegistry>, cache: Arc<dyn RuleCache>) -> Self {
        Self { registry, cache }
    }

    pub fn cache(&self) -> &Arc<dyn RuleCache> {
        &self.cache
    }

    /// Rule set for one definition. Served from the cache when fresh.
    pub async fn get_rules(&self, definition_id: DbId) -> Result<Arc<RuleSet>, CoreError> {
        if let Some(rules) = self.cache.get(definition_id) {
            return Ok(rules);
        }
        let generation = self.cache.generation();

        if self.registry.find_definition(definition_id).await?.is_none() {
            return Err(CoreError::NotFound {
                entity: "NodeDefinition",
                id: definition_id,
            });
        }
        let io = self.registry.list_io(definition_id).await?;
        let rules = Arc::new(RuleSet::from_io(definition_id, &io));
        self.cache.set(definition_id, Arc::clone(&rules), generation);
        tracing::debug!(definition_id, fields = rules.fields.len(), "Rule set cached");
        Ok(rules)
    }

    /// Validate every definition-bound node's configured values.
    ///
    /// Uncached rule sets are resolved with one batched registry lookup.
    /// Nodes whose definition no longer exists get a `DEFINITION_NOT_FOUND`
    /// error on the `type` field.
    pub async fn validate_workflow(
        &self,
        nodes: &[WorkflowNode],
    ) -> Result<ValidationReport, CoreError> {
        let rule_sets = self.resolve_rules(nodes).await?;

        let mut report = ValidationReport::default();
        for node in nodes {
            let Some(definition_id) = node.binding.definition_id() else {
                continue;
            };
            let Some(rules) = rule_sets.get(&definition_id) else {
                report.push(
                    &node.id,
                    FieldError {
                        field: "type".to_string(),
                        code: DEFINITION_NOT_FOUND.to_string(),
                        message: format!("Node definition {definition_id} not found"),
                        node_id: None,
                    },
                );
                continue;
            };
            for rule in &rules.fields {
                for error in validate_field(node.config_values.get(&rule.field), rule) {
                    report.push(&node.id, error);
                }
            }
        }
        Ok(report)
    }

    async fn resolve_rules(
        &self,
        nodes: &[WorkflowNode],
    ) -> Result<HashMap<DbId, Arc<RuleSet>>, CoreError> {
        let mut resolved = HashMap::new();
        let mut missing = Vec::new();
        let mut seen = HashSet::new();

        for id in nodes.iter().filter_map(|n| n.binding.definition_id()) {
            if !seen.insert(id) {
                continue;
            }
            match self.cache.get(id) {
                Some(rules) => {
                    resolved.insert(id, rules);
                }
                None => missing.push(id),
            }
        }
        if missing.is_empty() {
            return Ok(resolved);
        }
        let generation = self.cache.generation();

        let found: HashSet<DbId> = self
            .registry
            .find_definitions(&missing)
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        let found_ids: Vec<DbId> = missing.into_iter().filter(|id| found.contains(id)).collect();

        let mut io_by_definition: HashMap<DbId, Vec<IoDefinition>> = HashMap::new();
        for io in self.registry.list_io_for(&found_ids).await? {
            io_by_definition.entry(io.definition_id).or_default().push(io);
        }
        for id in found_ids {
            let io = io_by_definition.remove(&id).unwrap_or_default();
            let rules = Arc::new(RuleSet::from_io(id, &io));
            self.cache.set(id, Arc::clone(&rules), generation);
            resolved.insert(id, rules);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        DefinitionKind, DefinitionStatus, IoDirection, NewIoDefinition, NodeDefinition,
    };
    use crate::graph::{NodeBinding, Position};
    use crate::store::memory::InMemoryCatalog;
    use crate::store::{CatalogStore, DefinitionRecord};
    use crate::validation::cache::{ManualClock, TtlRuleCache};
    use crate::validation::rules::{MAX_LENGTH, REQUIRED};
    use assert_matches::assert_matches;
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn seeded() -> (Arc<InMemoryCatalog>, DbId) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let def = catalog
            .create_definition(
                &DefinitionRecord {
                    kind: DefinitionKind::AiModel,
                    slug: "flux".into(),
                    name: "Flux".into(),
                    description: None,
                    icon: None,
                    color: None,
                    version: "1.0.0".into(),
                    status: DefinitionStatus::Active,
                    config_schema: json!({}),
                    pricing: None,
                },
                &[
                    NewIoDefinition {
                        name: "prompt".into(),
                        label: None,
                        direction: IoDirection::Input,
                        socket_type: "text".into(),
                        required: true,
                        is_list: false,
                        constraints: json!({"maxLength": 10}),
                        sort_order: 0,
                    },
                    NewIoDefinition {
                        name: "image".into(),
                        label: None,
                        direction: IoDirection::Output,
                        socket_type: "image".into(),
                        required: false,
                        is_list: false,
                        constraints: json!({}),
                        sort_order: 1,
                    },
                ],
            )
            .await
            .unwrap();
        (catalog, def.id)
    }

    fn engine(catalog: Arc<InMemoryCatalog>, clock: Arc<ManualClock>) -> ValidationEngine {
        ValidationEngine::new(
            catalog,
            Arc::new(TtlRuleCache::new(Duration::from_secs(300), clock)),
        )
    }

    fn node(id: &str, definition_id: DbId, config: Value) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            workflow_id: 0,
            binding: NodeBinding::AiModel { definition_id },
            position: Position::default(),
            size: None,
            config_values: config.as_object().cloned().unwrap_or_default(),
            ui: Value::Null,
        }
    }

    #[tokio::test]
    async fn rules_contain_inputs_only() {
        let (catalog, id) = seeded().await;
        let engine = engine(catalog, Arc::new(ManualClock::new()));
        let rules = engine.get_rules(id).await.unwrap();
        assert_eq!(rules.fields.len(), 1);
        assert_eq!(rules.fields[0].field, "prompt");
    }

    #[tokio::test]
    async fn unknown_definition_is_not_found() {
        let (catalog, _) = seeded().await;
        let engine = engine(catalog, Arc::new(ManualClock::new()));
        assert_matches!(
            engine.get_rules(999).await,
            Err(CoreError::NotFound { entity: "NodeDefinition", id: 999 })
        );
    }

    #[tokio::test]
    async fn cached_rules_survive_until_ttl_or_invalidation() {
        let (catalog, id) = seeded().await;
        let clock = Arc::new(ManualClock::new());
        let engine = engine(Arc::clone(&catalog), Arc::clone(&clock));
        engine.get_rules(id).await.unwrap();

        catalog
            .create_io(
                id,
                &NewIoDefinition {
                    name: "seed".into(),
                    label: None,
                    direction: IoDirection::Input,
                    socket_type: "number".into(),
                    required: false,
                    is_list: false,
                    constraints: json!({}),
                    sort_order: 5,
                },
            )
            .await
            .unwrap();

        assert_eq!(engine.get_rules(id).await.unwrap().fields.len(), 1);
        clock.advance(Duration::from_secs(301));
        assert_eq!(engine.get_rules(id).await.unwrap().fields.len(), 2);

        engine.cache().invalidate(id);
        assert_eq!(engine.get_rules(id).await.unwrap().fields.len(), 2);
    }

    #[tokio::test]
    async fn workflow_report_groups_by_node() {
        let (catalog, id) = seeded().await;
        let engine = engine(catalog, Arc::new(ManualClock::new()));
        let nodes = vec![
            node("ok", id, json!({"prompt": "cat"})),
            node("empty", id, json!({})),
            node("long", id, json!({"prompt": "far too long prompt"})),
        ];
        let report = engine.validate_workflow(&nodes).await.unwrap();
        assert!(!report.is_valid());
        let codes: Vec<(&str, &str)> = report
            .errors
            .iter()
            .map(|e| (e.node_id.as_deref().unwrap(), e.code.as_str()))
            .collect();
        assert_eq!(codes, vec![("empty", REQUIRED), ("long", MAX_LENGTH)]);
        assert!(!report.node_errors.contains_key("ok"));
    }

    #[tokio::test]
    async fn valid_workflow_and_builtins_pass() {
        let (catalog, id) = seeded().await;
        let engine = engine(catalog, Arc::new(ManualClock::new()));
        let mut note = node("note", id, json!({}));
        note.binding = NodeBinding::Builtin {
            name: "note".into(),
        };
        let nodes = vec![node("a", id, json!({"prompt": "dog"})), note];
        assert!(engine.validate_workflow(&nodes).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn missing_definition_is_reported_on_type_field() {
        let (catalog, _) = seeded().await;
        let engine = engine(catalog, Arc::new(ManualClock::new()));
        let report = engine
            .validate_workflow(&[node("n1", 404, json!({}))])
            .await
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "type");
        assert_eq!(report.errors[0].code, DEFINITION_NOT_FOUND);
    }

    /// Registry whose single-definition IO read is followed by a catalog
    /// write that invalidates the cache before the engine stores its result.
    struct WriteAfterRead {
        inner: Arc<InMemoryCatalog>,
        cache: Arc<dyn RuleCache>,
    }

    #[async_trait::async_trait]
    impl NodeRegistry for WriteAfterRead {
        async fn find_definition(&self, id: DbId) -> Result<Option<NodeDefinition>, CoreError> {
            self.inner.find_definition(id).await
        }
        async fn find_definitions(&self, ids: &[DbId]) -> Result<Vec<NodeDefinition>, CoreError> {
            self.inner.find_definitions(ids).await
        }
        async fn find_active_by_slug(
            &self,
            slug: &str,
        ) -> Result<Option<NodeDefinition>, CoreError> {
            self.inner.find_active_by_slug(slug).await
        }
        async fn list_definitions(
            &self,
            filter: &crate::store::DefinitionFilter,
        ) -> Result<Vec<NodeDefinition>, CoreError> {
            self.inner.list_definitions(filter).await
        }
        async fn list_io(&self, definition_id: DbId) -> Result<Vec<IoDefinition>, CoreError> {
            let io = self.inner.list_io(definition_id).await;
            self.cache.invalidate(definition_id);
            io
        }
        async fn list_io_for(&self, ids: &[DbId]) -> Result<Vec<IoDefinition>, CoreError> {
            let io = self.inner.list_io_for(ids).await;
            self.cache.invalidate_all();
            io
        }
        async fn find_io(&self, io_id: DbId) -> Result<Option<IoDefinition>, CoreError> {
            self.inner.find_io(io_id).await
        }
        async fn list_socket_types(
            &self,
        ) -> Result<Vec<crate::definition::SocketType>, CoreError> {
            self.inner.list_socket_types().await
        }
    }

    #[tokio::test]
    async fn rules_read_before_an_invalidation_are_not_cached() {
        let (catalog, id) = seeded().await;
        let cache: Arc<dyn RuleCache> = Arc::new(TtlRuleCache::new(
            Duration::from_secs(3600),
            Arc::new(ManualClock::new()),
        ));
        let registry = Arc::new(WriteAfterRead {
            inner: catalog,
            cache: Arc::clone(&cache),
        });
        let engine = ValidationEngine::new(registry, Arc::clone(&cache));

        let rules = engine.get_rules(id).await.unwrap();
        assert_eq!(rules.fields.len(), 1);
        assert!(cache.get(id).is_none());

        engine
            .validate_workflow(&[node("n1", id, json!({"prompt": "cat"}))])
            .await
            .unwrap();
        assert!(cache.get(id).is_none());
    }
}
