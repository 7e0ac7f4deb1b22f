//! Loading and validating the capability catalogue.

use super::{Budget, Capability, DEFAULT_CONCURRENCY};
use crate::error::{PatchbayError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogueFile {
    #[serde(default)]
    capabilities: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CapabilityEntry {
    tags: Vec<String>,
    docker_image: String,
    concurrency: usize,
    budget: Budget,
}

impl Default for CapabilityEntry {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            docker_image: String::new(),
            concurrency: DEFAULT_CONCURRENCY,
            budget: Budget::default(),
        }
    }
}

/// Immutable, ordered set of capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalogue {
    pub(super) entries: Vec<Capability>,
}

impl Catalogue {
    /// Build a catalogue from capabilities in declaration order.
    ///
    /// Tags are stored lowercased.
    pub fn new(mut entries: Vec<Capability>) -> Result<Self> {
        for cap in &mut entries {
            for tag in &mut cap.tags {
                *tag = tag.to_lowercase();
            }
        }
        let catalogue = Self { entries };
        catalogue.validate()?;
        Ok(catalogue)
    }

    /// Load the catalogue from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to read capability catalogue '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Load the catalogue, or fall back to a single default capability when
    /// the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P, default_name: &str) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(
                path = %path.display(),
                capability = default_name,
                "no capability catalogue, routing every task to the default capability"
            );
            Self::new(vec![Capability::new(default_name)])
        }
    }

    /// Parse the `capabilities:` mapping, keeping declaration order.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: CatalogueFile = serde_yaml::from_str(yaml).map_err(|e| {
            PatchbayError::UserError(format!("failed to parse capability catalogue: {}", e))
        })?;

        let mut entries = Vec::with_capacity(file.capabilities.len());
        for (key, value) in file.capabilities {
            let name = key
                .as_str()
                .ok_or_else(|| {
                    PatchbayError::UserError(format!(
                        "capability names must be strings, got {:?}",
                        key
                    ))
                })?
                .to_string();
            let entry: CapabilityEntry = if value.is_null() {
                CapabilityEntry::default()
            } else {
                serde_yaml::from_value(value).map_err(|e| {
                    PatchbayError::UserError(format!("invalid capability '{}': {}", name, e))
                })?
            };
            entries.push(Capability {
                name,
                tags: entry.tags,
                docker_image: entry.docker_image,
                concurrency: entry.concurrency,
                budget: entry.budget,
            });
        }

        Self::new(entries)
    }

    fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(PatchbayError::UserError(
                "capability catalogue is empty".to_string(),
            ));
        }
        for cap in &self.entries {
            if cap.concurrency == 0 {
                return Err(PatchbayError::UserError(format!(
                    "capability '{}': concurrency must be greater than 0",
                    cap.name
                )));
            }
            if cap.budget.max_tasks_inflight == 0 {
                return Err(PatchbayError::UserError(format!(
                    "capability '{}': budget.max_tasks_inflight must be greater than 0",
                    cap.name
                )));
            }
        }
        Ok(())
    }

    /// Capabilities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
