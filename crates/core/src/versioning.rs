//! Copy-on-write versioning of node definitions.
//!
//! Drafts are edited in place. An active definition's contract (config
//! schema and IO set) is immutable: an edit that changes it deprecates the
//! current row and creates a new active row with the next version, in one
//! storage transaction. Edits that leave the contract alone are applied in
//! place. Deprecated and archived definitions reject every edit.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::{
    io_set_changed, next_version, normalize_json_document, schema_changed, DefinitionKind,
    DefinitionStatus, IoDefinition, IoPatch, NewIoDefinition, NewNodeDefinition, NodeDefinition,
    NodeDefinitionWithIo, SocketType, DEFAULT_VERSION,
};
use crate::error::CoreError;
use crate::store::{
    clamp_limit, clamp_offset, CatalogStore, DefinitionFields, DefinitionFilter, DefinitionRecord,
    VersionBump,
};
use crate::types::DbId;
use crate::validation::RuleCache;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Whitelisted fields of a definition update. Anything else in the request
/// body is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionPatch {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    /// Accepted either as a JSON object or as JSON text.
    pub config_schema: Option<Value>,
    pub pricing: Option<Value>,
    pub status: Option<DefinitionStatus>,
    /// Only honoured for drafts; active rows get their version from a bump.
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDefinitionRequest {
    #[serde(flatten)]
    pub patch: DefinitionPatch,
    /// Full replacement IO set, when the editor submits one.
    pub io: Option<Vec<NewIoDefinition>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionedDefinition {
    pub message: String,
    pub new_definition_id: DbId,
    pub previous_definition_id: DbId,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdateOutcome {
    Updated(NodeDefinition),
    Versioned(VersionedDefinition),
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DefinitionVersioningService {
    catalog: Arc<dyn CatalogStore>,
    cache: Arc<dyn RuleCache>,
}

impl DefinitionVersioningService {
    pub fn new(catalog: Arc<dyn CatalogStore>, cache: Arc<dyn RuleCache>) -> Self {
        Self { catalog, cache }
    }

    pub async fn list(
        &self,
        kind: Option<DefinitionKind>,
        status: Option<DefinitionStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<NodeDefinition>, CoreError> {
        self.catalog
            .list_definitions(&DefinitionFilter {
                kind,
                status,
                limit: clamp_limit(limit),
                offset: clamp_offset(offset),
            })
            .await
    }

    pub async fn socket_types(&self) -> Result<Vec<SocketType>, CoreError> {
        self.catalog.list_socket_types().await
    }

    pub async fn get(&self, id: DbId) -> Result<NodeDefinitionWithIo, CoreError> {
        let definition = self.load(id).await?;
        let io = self.catalog.list_io(id).await?;
        Ok(NodeDefinitionWithIo { definition, io })
    }

    /// Create a draft definition with its IO rows.
    pub async fn create(
        &self,
        input: NewNodeDefinition,
    ) -> Result<NodeDefinitionWithIo, CoreError> {
        let slug = input.slug.trim().to_string();
        let name = input.name.trim().to_string();
        if slug.is_empty() || name.is_empty() {
            return Err(CoreError::Validation("Slug and name are required".into()));
        }
        if input.kind == DefinitionKind::System && input.pricing.is_some() {
            return Err(CoreError::Validation(
                "Pricing applies to AI model definitions only".into(),
            ));
        }
        self.check_io_rows(&input.io).await?;
        if self.catalog.slug_in_use(&slug, None).await? {
            return Err(CoreError::Conflict(format!(
                "Slug '{slug}' is already used by another definition"
            )));
        }

        let version = input
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        let record = DefinitionRecord {
            kind: input.kind,
            slug,
            name,
            description: input.description,
            icon: input.icon,
            color: input.color,
            version,
            status: DefinitionStatus::Draft,
            config_schema: normalize_json_document(&input.config_schema),
            pricing: input.pricing.map(|p| normalize_json_document(&p)),
        };
        let definition = self.catalog.create_definition(&record, &input.io).await?;
        tracing::info!(
            definition_id = definition.id,
            slug = %definition.slug,
            kind = definition.kind.as_str(),
            "Node definition created"
        );
        let io = self.catalog.list_io(definition.id).await?;
        Ok(NodeDefinitionWithIo { definition, io })
    }

    /// Apply an update, versioning the definition when an active contract
    /// changes.
    pub async fn update(
        &self,
        id: DbId,
        request: UpdateDefinitionRequest,
    ) -> Result<UpdateOutcome, CoreError> {
        let current = self.load(id).await?;
        if !current.status.accepts_edits() {
            return Err(CoreError::ImmutableState(format!(
                "Node definition {id} is {} and cannot be modified",
                current.status
            )));
        }

        let UpdateDefinitionRequest { patch, io } = request;

        if let Some(next) = patch.status {
            if !current.status.can_transition_to(next) {
                return Err(CoreError::Validation(format!(
                    "Cannot move a {} definition to {next}",
                    current.status
                )));
            }
        }
        if current.kind == DefinitionKind::System && patch.pricing.is_some() {
            return Err(CoreError::Validation(
                "Pricing applies to AI model definitions only".into(),
            ));
        }
        let slug = patch.slug.as_deref().map(str::trim);
        if let Some(slug) = slug {
            if slug.is_empty() {
                return Err(CoreError::Validation("Slug must not be empty".into()));
            }
            if slug != current.slug && self.catalog.slug_in_use(slug, Some(id)).await? {
                return Err(CoreError::Conflict(format!(
                    "Slug '{slug}' is already used by another definition"
                )));
            }
        }
        if let Some(rows) = &io {
            self.check_io_rows(rows).await?;
        }

        let config_schema = patch.config_schema.as_ref().map(normalize_json_document);
        let stored_io = self.catalog.list_io(id).await?;
        let schema_differs = config_schema
            .as_ref()
            .is_some_and(|schema| schema_changed(&current.config_schema, schema));
        let io_differs = io
            .as_deref()
            .is_some_and(|rows| io_set_changed(&stored_io, rows));

        if current.status == DefinitionStatus::Active && (schema_differs || io_differs) {
            if patch.status.is_some_and(|s| s != DefinitionStatus::Active) {
                return Err(CoreError::Validation(
                    "A status change cannot be combined with a contract change".into(),
                ));
            }
            return self
                .bump_version(&current, &patch, config_schema, io, &stored_io)
                .await;
        }

        let replace_io = match (current.status, io) {
            (DefinitionStatus::Draft, Some(rows)) => Some(rows),
            _ => None,
        };
        let version = match (current.status, patch.version) {
            (DefinitionStatus::Draft, Some(v)) if !v.trim().is_empty() => {
                Some(v.trim().to_string())
            }
            (DefinitionStatus::Active, Some(_)) => {
                tracing::debug!(
                    definition_id = id,
                    "Ignoring explicit version on active definition"
                );
                None
            }
            _ => None,
        };
        let fields = DefinitionFields {
            slug: slug.map(str::to_string),
            name: patch.name,
            description: patch.description,
            icon: patch.icon,
            color: patch.color,
            config_schema,
            pricing: patch.pricing.map(|p| normalize_json_document(&p)),
            status: patch.status,
            version,
        };

        let Some(updated) = self
            .catalog
            .update_definition_in_place(id, current.status, &fields, replace_io.as_deref())
            .await?
        else {
            // The row moved on between the read above and the write.
            let now = self.load(id).await?;
            tracing::info!(
                definition_id = id,
                expected = %current.status,
                found = %now.status,
                "Lost definition update race"
            );
            return Err(CoreError::ImmutableState(format!(
                "Node definition {id} changed to {} while it was being updated",
                now.status
            )));
        };
        if replace_io.is_some() {
            self.cache.invalidate(id);
        }
        tracing::info!(
            definition_id = id,
            status = %updated.status,
            io_replaced = replace_io.is_some(),
            "Node definition updated in place"
        );
        Ok(UpdateOutcome::Updated(updated))
    }

    async fn bump_version(
        &self,
        current: &NodeDefinition,
        patch: &DefinitionPatch,
        config_schema: Option<Value>,
        io: Option<Vec<NewIoDefinition>>,
        stored_io: &[IoDefinition],
    ) -> Result<UpdateOutcome, CoreError> {
        let mut record = DefinitionRecord::from_definition(current);
        if let Some(slug) = &patch.slug {
            record.slug = slug.trim().to_string();
        }
        if let Some(name) = &patch.name {
            record.name = name.clone();
        }
        if let Some(description) = &patch.description {
            record.description = Some(description.clone());
        }
        if let Some(icon) = &patch.icon {
            record.icon = Some(icon.clone());
        }
        if let Some(color) = &patch.color {
            record.color = Some(color.clone());
        }
        if let Some(pricing) = &patch.pricing {
            record.pricing = Some(normalize_json_document(pricing));
        }
        if let Some(schema) = config_schema {
            record.config_schema = schema;
        }
        record.version = next_version(&current.version);
        record.status = DefinitionStatus::Active;

        let io = io
            .unwrap_or_else(|| stored_io.iter().map(NewIoDefinition::from_existing).collect());
        let created = self
            .catalog
            .apply_version_bump(&VersionBump {
                old_id: current.id,
                record,
                io,
            })
            .await?;

        self.cache.invalidate(current.id);
        self.cache.invalidate(created.id);
        tracing::info!(
            previous_definition_id = current.id,
            new_definition_id = created.id,
            version = %created.version,
            "Node definition versioned"
        );
        Ok(UpdateOutcome::Versioned(VersionedDefinition {
            message: format!(
                "Contract changed: created version {} and deprecated version {}",
                created.version, current.version
            ),
            new_definition_id: created.id,
            previous_definition_id: current.id,
            version: created.version,
        }))
    }

    // -- IO sub-resources (draft parents only) --------------------------------

    pub async fn create_io(
        &self,
        definition_id: DbId,
        io: NewIoDefinition,
    ) -> Result<IoDefinition, CoreError> {
        self.load_draft(definition_id).await?;
        self.check_io_rows(std::slice::from_ref(&io)).await?;
        let existing = self.catalog.list_io(definition_id).await?;
        if existing
            .iter()
            .any(|row| row.name == io.name && row.direction == io.direction)
        {
            return Err(CoreError::Conflict(format!(
                "Socket '{}' already exists on definition {definition_id}",
                io.name
            )));
        }
        let created = self.catalog.create_io(definition_id, &io).await?;
        self.cache.invalidate(definition_id);
        Ok(created)
    }

    pub async fn update_io(
        &self,
        definition_id: DbId,
        io_id: DbId,
        mut patch: IoPatch,
    ) -> Result<IoDefinition, CoreError> {
        self.load_draft(definition_id).await?;
        let existing = self.load_io(definition_id, io_id).await?;
        if let Some(name) = patch.name.take() {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CoreError::Validation("Socket name must not be empty".into()));
            }
            patch.name = Some(name);
        }
        let name = patch.name.as_deref().unwrap_or(&existing.name);
        let direction = patch.direction.unwrap_or(existing.direction);
        let siblings = self.catalog.list_io(definition_id).await?;
        if siblings
            .iter()
            .any(|row| row.id != io_id && row.name == name && row.direction == direction)
        {
            return Err(CoreError::Conflict(format!(
                "Socket '{name}' already exists on definition {definition_id}"
            )));
        }
        if let Some(socket_type) = &patch.socket_type {
            self.check_socket_types([socket_type.as_str()]).await?;
        }
        let updated = self
            .catalog
            .update_io(io_id, &patch)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "IoDefinition",
                id: io_id,
            })?;
        self.cache.invalidate(definition_id);
        Ok(updated)
    }

    pub async fn delete_io(&self, definition_id: DbId, io_id: DbId) -> Result<(), CoreError> {
        self.load_draft(definition_id).await?;
        self.load_io(definition_id, io_id).await?;
        if !self.catalog.delete_io(io_id).await? {
            return Err(CoreError::NotFound {
                entity: "IoDefinition",
                id: io_id,
            });
        }
        self.cache.invalidate(definition_id);
        Ok(())
    }

    // -- helpers ---------------------------------------------------------------

    async fn load(&self, id: DbId) -> Result<NodeDefinition, CoreError> {
        self.catalog
            .find_definition(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "NodeDefinition",
                id,
            })
    }

    async fn load_draft(&self, id: DbId) -> Result<NodeDefinition, CoreError> {
        let definition = self.load(id).await?;
        if definition.status != DefinitionStatus::Draft {
            return Err(CoreError::ImmutableState(format!(
                "Sockets of node definition {id} can only be edited as a draft (status: {})",
                definition.status
            )));
        }
        Ok(definition)
    }

    async fn load_io(&self, definition_id: DbId, io_id: DbId) -> Result<IoDefinition, CoreError> {
        self.catalog
            .find_io(io_id)
            .await?
            .filter(|io| io.definition_id == definition_id)
            .ok_or(CoreError::NotFound {
                entity: "IoDefinition",
                id: io_id,
            })
    }

    /// Names present and unique, socket types known.
    async fn check_io_rows(&self, rows: &[NewIoDefinition]) -> Result<(), CoreError> {
        let mut names = HashSet::new();
        for row in rows {
            let name = row.name.trim();
            if name.is_empty() {
                return Err(CoreError::Validation("Socket name must not be empty".into()));
            }
            if !names.insert((name, row.direction)) {
                return Err(CoreError::Validation(format!(
                    "Duplicate {} socket '{name}'",
                    row.direction.as_str()
                )));
            }
        }
        self.check_socket_types(rows.iter().map(|r| r.socket_type.as_str()))
            .await
    }

    async fn check_socket_types<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), CoreError> {
        let known: HashSet<String> = self
            .catalog
            .list_socket_types()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        for name in names {
            if !known.contains(name) {
                return Err(CoreError::Validation(format!("Unknown socket type '{name}'")));
            }
        }
        Ok(())
    }
}
