use crate::import::traits::{EntityExporter, EntityImporter};
use crate::models::EntityType;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a registered component does for its entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Importer,
    Exporter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Importer => "importer",
            Self::Exporter => "exporter",
        })
    }
}

/// Explicit `(entity type, role)` lookup, built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct Registry {
    importers: HashMap<EntityType, Arc<dyn EntityImporter>>,
    exporters: HashMap<EntityType, Arc<dyn EntityExporter>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn importer(&self, entity_type: &EntityType) -> Result<Arc<dyn EntityImporter>> {
        self.importers
            .get(entity_type)
            .cloned()
            .ok_or_else(|| not_registered(entity_type, Role::Importer))
    }

    pub fn exporter(&self, entity_type: &EntityType) -> Result<Arc<dyn EntityExporter>> {
        self.exporters
            .get(entity_type)
            .cloned()
            .ok_or_else(|| not_registered(entity_type, Role::Exporter))
    }

    pub fn supports(&self, entity_type: &EntityType, role: Role) -> bool {
        match role {
            Role::Importer => self.importers.contains_key(entity_type),
            Role::Exporter => self.exporters.contains_key(entity_type),
        }
    }

    /// Registered entity types for `role`, sorted.
    pub fn entity_types(&self, role: Role) -> Vec<EntityType> {
        let mut out: Vec<EntityType> = match role {
            Role::Importer => self.importers.keys().cloned().collect(),
            Role::Exporter => self.exporters.keys().cloned().collect(),
        };
        out.sort();
        out
    }
}

fn not_registered(entity_type: &EntityType, role: Role) -> Error {
    Error::InvalidInput(format!("no {role} registered for '{entity_type}'"))
}

#[derive(Default)]
pub struct RegistryBuilder {
    importers: Vec<Arc<dyn EntityImporter>>,
    exporters: Vec<Arc<dyn EntityExporter>>,
}

impl RegistryBuilder {
    pub fn importer(mut self, importer: impl EntityImporter + 'static) -> Self {
        self.importers.push(Arc::new(importer));
        self
    }

    pub fn exporter(mut self, exporter: impl EntityExporter + 'static) -> Self {
        self.exporters.push(Arc::new(exporter));
        self
    }

    /// Rejects duplicate registrations and dependency edges pointing at unregistered importers.
    pub fn build(self) -> Result<Registry> {
        let mut registry = Registry::default();
        for importer in self.importers {
            let ty = importer.entity_type().clone();
            if registry.importers.insert(ty.clone(), importer).is_some() {
                return Err(Error::InvalidInput(format!(
                    "importer for '{ty}' registered twice"
                )));
            }
        }
        for exporter in self.exporters {
            let ty = exporter.entity_type().clone();
            if registry.exporters.insert(ty.clone(), exporter).is_some() {
                return Err(Error::InvalidInput(format!(
                    "exporter for '{ty}' registered twice"
                )));
            }
        }
        for (ty, importer) in &registry.importers {
            for edge in importer.dependencies() {
                if !registry.importers.contains_key(&edge.entity_type) {
                    return Err(Error::InvalidInput(format!(
                        "'{ty}' depends on '{}' which has no importer",
                        edge.entity_type
                    )));
                }
            }
        }
        Ok(registry)
    }
}
