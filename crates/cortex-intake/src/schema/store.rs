//! Compiled schema store and path lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::SchemaError;
use super::compile::{CompiledDocument, compile_document};
use super::types::{AdditionalProperties, SchemaNode};

/// Immutable compiled schema. Build once, share through `Arc`.
#[derive(Debug)]
pub struct SchemaStore {
    root: SchemaNode,
    defs: BTreeMap<String, SchemaNode>,
}

/// A sub-schema selected by path, bound to the store that resolves its references.
#[derive(Debug, Clone)]
pub struct SubSchema {
    store: Arc<SchemaStore>,
    node: SchemaNode,
    path: String,
}

impl SchemaStore {
    pub fn compile(source: &str) -> Result<Self, SchemaError> {
        let CompiledDocument { root, defs } = compile_document(source)?;
        tracing::debug!("compiled schema with {} definition(s)", defs.len());
        Ok(Self { root, defs })
    }

    /// Compile the schema embedded in this binary.
    pub fn embedded() -> Result<Self, SchemaError> {
        Self::compile(super::EMBEDDED_SCHEMA)
    }

    pub fn definition(&self, name: &str) -> Option<&SchemaNode> {
        self.defs.get(name)
    }

    pub fn definition_names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    /// Select a sub-schema such as `#/$defs/CortexAgent` or
    /// `#/$defs/CortexAgent/properties/profile/properties/display_name`.
    /// References are followed when a path descends through them.
    pub fn lookup(self: &Arc<Self>, path: &str) -> Result<SubSchema, SchemaError> {
        let not_found = || SchemaError::PathNotFound(path.to_string());
        let trimmed = path.strip_prefix('#').unwrap_or(path);
        let mut segments = trimmed.split('/').filter(|s| !s.is_empty());

        let mut node: &SchemaNode = &self.root;
        while let Some(segment) = segments.next() {
            node = match segment {
                "$defs" => {
                    let name = segments.next().ok_or_else(not_found)?;
                    if !std::ptr::eq(node, &self.root) {
                        return Err(not_found());
                    }
                    self.defs.get(name).ok_or_else(not_found)?
                }
                "properties" => {
                    let name = segments.next().ok_or_else(not_found)?;
                    self.deref(node)
                        .properties
                        .get(name)
                        .ok_or_else(not_found)?
                }
                "items" => self.deref(node).items.as_deref().ok_or_else(not_found)?,
                "additionalProperties" => match &self.deref(node).additional {
                    AdditionalProperties::Schema(extra) => extra.as_ref(),
                    _ => return Err(not_found()),
                },
                _ => return Err(not_found()),
            };
        }

        Ok(SubSchema {
            store: Arc::clone(self),
            node: node.clone(),
            path: format!("#{trimmed}"),
        })
    }

    /// Follow `$ref` chains until a node without a reference.
    fn deref<'a>(&'a self, mut node: &'a SchemaNode) -> &'a SchemaNode {
        let mut hops = 0;
        while let Some(target) = &node.reference {
            match self.defs.get(target) {
                Some(next) if hops < self.defs.len() => {
                    node = next;
                    hops += 1;
                }
                _ => break,
            }
        }
        node
    }
}

impl SubSchema {
    pub fn node(&self) -> &SchemaNode {
        &self.node
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
