//! Name Resolution Engine
//!
//! Turns an [`UnresolvedPayload`] into a [`RefPayload`]:
//! - entities with deferred names get their names computed from the names
//!   of the entities they depend on
//! - reference fields holding a name are rewritten to hold the target's id
//!
//! Both kinds of work are nodes of one dependency graph. Edges run from a
//! dependency to its dependent, and the topological order of that graph is
//! the evaluation order. A cycle is reported with every node of its strongly
//! connected component.

use petgraph::algo::{has_path_connecting, kosaraju_scc, toposort, DfsSpace};
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use std::collections::HashMap;

use crate::collect::extract_definition_refs;
use crate::config::ResolveOptions;
use crate::error::{RefError, Result};
use crate::path::{self, ReferencePath};
use crate::schema::Schema;
use crate::types::{
    EntityName, NameDependency, RefPayload, Reference, ResolvedName, ResolvedNames, UnresolvedEntity,
    UnresolvedPayload,
};

// =============================================================================
// Entry Points
// =============================================================================

/// Parse `input` and collect its entities and references, without resolving
pub fn parse_schema_with_references(schema: &Schema, input: &Value) -> Result<UnresolvedPayload> {
    let marked = schema.parse(input)?;
    extract_definition_refs(marked)
}

/// Parse `input` and resolve it according to `options`.
///
/// With `skip_reference_name_resolution` the document is expected to store
/// ids in its reference fields already; only entity names are resolved.
pub fn parse_schema_with_transformed_references(
    schema: &Schema,
    input: &Value,
    options: &ResolveOptions,
) -> Result<RefPayload> {
    let payload = parse_schema_with_references(schema, input)?;
    resolve_ref_payload_names(payload, options)
}

/// Parse a human-authored document whose reference fields hold names.
///
/// Always resolves reference names, whatever `options` says about skipping.
pub fn deserialize_schema_with_transformed_references(
    schema: &Schema,
    input: &Value,
    options: &ResolveOptions,
) -> Result<RefPayload> {
    let options = ResolveOptions {
        skip_reference_name_resolution: false,
        ..options.clone()
    };
    parse_schema_with_transformed_references(schema, input, &options)
}

// =============================================================================
// Dependency Graph
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResolveStep {
    /// Compute a deferred entity name
    Entity(usize),
    /// Rewrite a reference name to an id
    Reference(usize),
}

struct ResolutionGraph<'p> {
    graph: DiGraph<ResolveStep, ()>,
    entity_nodes: HashMap<usize, NodeIndex>,
    reference_nodes: HashMap<usize, NodeIndex>,
    ids: HashMap<&'p str, usize>,
    references_by_path: HashMap<&'p ReferencePath, usize>,
    data: &'p Value,
}

impl<'p> ResolutionGraph<'p> {
    fn build(payload: &'p UnresolvedPayload, resolve_references: bool) -> Self {
        let mut this = Self {
            graph: DiGraph::new(),
            entity_nodes: HashMap::new(),
            reference_nodes: HashMap::new(),
            ids: payload
                .entities
                .iter()
                .enumerate()
                .map(|(i, e)| (e.id.as_str(), i))
                .collect(),
            references_by_path: HashMap::new(),
            data: &payload.data,
        };

        for (i, entity) in payload.entities.iter().enumerate() {
            if entity.name_resolver().is_some() {
                let node = this.graph.add_node(ResolveStep::Entity(i));
                this.entity_nodes.insert(i, node);
            }
        }
        if resolve_references {
            for (j, reference) in payload.references.iter().enumerate() {
                let node = this.graph.add_node(ResolveStep::Reference(j));
                this.reference_nodes.insert(j, node);
                this.references_by_path.insert(&reference.path, j);
            }
        }

        // deferred names wait for whatever they read
        for (i, entity) in payload.entities.iter().enumerate() {
            let Some(resolver) = entity.name_resolver() else {
                continue;
            };
            let target = this.entity_nodes[&i];
            for dependency in resolver.ids_to_resolve.values() {
                match dependency {
                    NameDependency::Id(id) => this.depend_on_entity(id, target),
                    NameDependency::Ids(ids) => {
                        for id in ids {
                            this.depend_on_entity(id, target);
                        }
                    }
                    NameDependency::Path(path) => this.depend_on_path(path, target),
                }
            }
        }

        if !resolve_references {
            return this;
        }

        // references wait for their own scope and the scopes of their candidates
        for (j, reference) in payload.references.iter().enumerate() {
            let target = this.reference_nodes[&j];
            for entity in payload.entities.iter() {
                if entity.entity_type != reference.entity_type {
                    continue;
                }
                if let Some(parent_path) = &entity.parent_path {
                    this.depend_on_reference_at(parent_path, target);
                }
            }
            if let Some(parent_path) = &reference.parent_path {
                this.depend_on_reference_at(parent_path, target);
            }
        }

        // and for the deferred names of their type, except names that are
        // themselves waiting on the reference
        let mut space = DfsSpace::new(&this.graph);
        let mut candidate_edges = Vec::new();
        for (j, reference) in payload.references.iter().enumerate() {
            let target = this.reference_nodes[&j];
            for (i, entity) in payload.entities.iter().enumerate() {
                if entity.entity_type != reference.entity_type {
                    continue;
                }
                let Some(&node) = this.entity_nodes.get(&i) else {
                    continue;
                };
                if !has_path_connecting(&this.graph, target, node, Some(&mut space)) {
                    candidate_edges.push((node, target));
                }
            }
        }
        for (node, target) in candidate_edges {
            this.graph.add_edge(node, target, ());
        }

        this
    }

    fn depend_on_entity(&mut self, id: &str, target: NodeIndex) {
        let node = self.ids.get(id).and_then(|i| self.entity_nodes.get(i)).copied();
        if let Some(node) = node {
            self.graph.add_edge(node, target, ());
        }
    }

    /// Returns whether a reference lives at `path`
    fn depend_on_reference_at(&mut self, path: &ReferencePath, target: NodeIndex) -> bool {
        match self.references_by_path.get(path) {
            Some(j) => {
                let node = self.reference_nodes[j];
                if node != target {
                    self.graph.add_edge(node, target, ());
                }
                true
            }
            None => false,
        }
    }

    fn depend_on_path(&mut self, path: &ReferencePath, target: NodeIndex) {
        if self.depend_on_reference_at(path, target) {
            return;
        }
        let data = self.data;
        match path::get(data, path) {
            Some(Value::String(id)) => self.depend_on_entity(id, target),
            Some(Value::Array(items)) => {
                for (k, item) in items.iter().enumerate() {
                    if self.depend_on_reference_at(&path.index(k), target) {
                        continue;
                    }
                    if let Some(id) = item.as_str() {
                        self.depend_on_entity(id, target);
                    }
                }
            }
            _ => {}
        }
    }

    fn order(&self, payload: &UnresolvedPayload) -> Result<Vec<ResolveStep>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let start = cycle.node_id();
            let component = kosaraju_scc(&self.graph)
                .into_iter()
                .find(|component| component.contains(&start))
                .unwrap_or_else(|| vec![start]);
            let mut members: Vec<String> = component
                .into_iter()
                .map(|node| describe(payload, self.graph[node]))
                .collect();
            members.sort();
            RefError::NameCycle { members }
        })?;
        Ok(sorted.into_iter().map(|node| self.graph[node]).collect())
    }
}

fn describe(payload: &UnresolvedPayload, step: ResolveStep) -> String {
    match step {
        ResolveStep::Entity(i) => payload.entities[i].id.clone(),
        ResolveStep::Reference(j) => format!("reference at {}", payload.references[j].path),
    }
}

// =============================================================================
// Resolution
// =============================================================================

struct NameTable {
    data: Value,
    entities: Vec<UnresolvedEntity>,
    names: Vec<Option<String>>,
    ids: HashMap<String, usize>,
    allow_invalid_references: bool,
    allow_missing_name_refs: bool,
}

impl NameTable {
    fn name_of(&self, id: &str) -> Result<String> {
        match self.ids.get(id).map(|&i| self.names[i].as_ref()) {
            Some(Some(name)) => Ok(name.clone()),
            None if self.allow_invalid_references => {
                tracing::warn!(id, "no entity with this id, keeping the raw id as its name");
                Ok(id.to_string())
            }
            _ => Err(RefError::UnresolvedEntityName { id: id.to_string() }),
        }
    }

    fn resolve_entity_name(&mut self, i: usize) -> Result<()> {
        let entity = &self.entities[i];
        let Some(resolver) = entity.name_resolver() else {
            return Ok(());
        };

        let mut names = ResolvedNames::default();
        for (key, dependency) in &resolver.ids_to_resolve {
            let name = match dependency {
                NameDependency::Id(id) => ResolvedName::One(self.name_of(id)?),
                NameDependency::Ids(ids) => ResolvedName::Many(
                    ids.iter().map(|id| self.name_of(id)).collect::<Result<_>>()?,
                ),
                NameDependency::Path(path) => match path::get(&self.data, path) {
                    Some(Value::String(id)) => ResolvedName::One(self.name_of(id)?),
                    Some(Value::Array(items)) => ResolvedName::Many(
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|id| self.name_of(id))
                            .collect::<Result<_>>()?,
                    ),
                    _ if self.allow_missing_name_refs => ResolvedName::One(String::new()),
                    _ => {
                        return Err(RefError::MissingNameRef {
                            id: entity.id.clone(),
                            path: path.to_string(),
                        })
                    }
                },
            };
            names.insert(key.clone(), name);
        }

        let name = resolver.resolve_name(&names);
        tracing::trace!(id = %entity.id, name = %name, "resolved deferred name");
        self.names[i] = Some(name);
        Ok(())
    }

    fn resolve_reference(&mut self, reference: &Reference) -> Result<()> {
        let Some(name) = path::get_str(&self.data, &reference.path) else {
            return Ok(());
        };
        let scope = reference
            .parent_path
            .as_ref()
            .map(|parent_path| path::get(&self.data, parent_path));

        let candidates: Vec<&str> = self
            .entities
            .iter()
            .zip(&self.names)
            .filter(|(entity, entity_name)| {
                entity.entity_type == reference.entity_type && entity_name.as_deref() == Some(name)
            })
            .filter(|(entity, _)| match scope {
                None => true,
                Some(expected) => {
                    let actual = entity
                        .parent_path
                        .as_ref()
                        .and_then(|parent_path| path::get(&self.data, parent_path));
                    matches!((expected, actual), (Some(a), Some(b)) if a == b)
                }
            })
            .map(|(entity, _)| entity.id.as_str())
            .collect();

        let id = match candidates.as_slice() {
            [id] => id.to_string(),
            [] if self.allow_invalid_references => {
                tracing::warn!(reference = name, path = %reference.path, "leaving unresolved reference as is");
                return Ok(());
            }
            [] => {
                return Err(RefError::UnresolvedReference {
                    name: name.to_string(),
                    entity_type: reference.entity_type.to_string(),
                    path: reference.path.to_string(),
                })
            }
            _ if self.allow_invalid_references => {
                tracing::warn!(reference = name, path = %reference.path, "leaving ambiguous reference as is");
                return Ok(());
            }
            many => {
                return Err(RefError::AmbiguousReference {
                    name: name.to_string(),
                    entity_type: reference.entity_type.to_string(),
                    path: reference.path.to_string(),
                    candidates: many.iter().map(|id| id.to_string()).collect(),
                })
            }
        };
        path::set(&mut self.data, &reference.path, Value::String(id))
    }
}

/// Resolve deferred entity names and (unless skipped) reference names.
///
/// Entities with a literal name seed the name table; everything else is
/// evaluated in dependency order.
pub fn resolve_ref_payload_names(
    payload: UnresolvedPayload,
    options: &ResolveOptions,
) -> Result<RefPayload> {
    let resolve_references = !options.skip_reference_name_resolution;
    let order = ResolutionGraph::build(&payload, resolve_references).order(&payload)?;
    tracing::debug!(
        steps = order.len(),
        entities = payload.entities.len(),
        references = payload.references.len(),
        resolve_references,
        "resolving payload names"
    );

    let RefPayload {
        data,
        entities,
        references,
    } = payload;
    let names = entities
        .iter()
        .map(|entity| match &entity.name {
            EntityName::Resolved(name) => Some(name.clone()),
            EntityName::Deferred(_) => None,
        })
        .collect();
    let ids = entities
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id.clone(), i))
        .collect();
    let mut table = NameTable {
        data,
        entities,
        names,
        ids,
        allow_invalid_references: options.allow_invalid_references,
        allow_missing_name_refs: options.allow_missing_name_refs,
    };

    for step in order {
        match step {
            ResolveStep::Entity(i) => table.resolve_entity_name(i)?,
            ResolveStep::Reference(j) => table.resolve_reference(&references[j])?,
        }
    }

    let NameTable {
        data,
        entities,
        names,
        ..
    } = table;
    let entities = entities
        .into_iter()
        .zip(names)
        .map(|(entity, name)| match name {
            Some(name) => Ok(entity.into_entity(name)),
            None => Err(RefError::UnresolvedEntityName { id: entity.id }),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RefPayload {
        data,
        entities,
        references,
    })
}
