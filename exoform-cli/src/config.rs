//! Configuration file - provider block, state backend and resource list

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use exoform_core::resource::Resource;
use exoform_core::schema::ResourceSchema;
use exoform_core::timeouts::TimeoutsConfig;
use exoform_provider_exoscale::ProviderConfig;
use exoform_state::BackendConfig;
use serde::Deserialize;

/// Top-level JSON document read by every command
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub backend: Option<BackendBlock>,
    #[serde(default)]
    pub resources: Vec<ResourceBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendBlock {
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_backend_type() -> String {
    "local".to_string()
}

/// One configured resource
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceBlock {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl Configuration {
    pub fn load(file: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(file)
            .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", file.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;
        config.provider.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// State backend settings; a missing block means the local default file
    pub fn backend_config(&self) -> BackendConfig {
        match &self.backend {
            None => BackendConfig::local(),
            Some(block) => {
                let mut config = BackendConfig {
                    backend_type: block.backend_type.clone(),
                    ..Default::default()
                };
                if let Some(path) = &block.path {
                    config = config.with_attribute("path", path.display().to_string());
                }
                config
            }
        }
    }

    /// Decode, validate and resolve timeouts of every configured resource.
    ///
    /// Errors of all resources are reported together.
    pub fn resources(
        &self,
        schemas: &HashMap<String, ResourceSchema>,
    ) -> Result<Vec<Resource>, String> {
        let mut resources = Vec::new();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for block in &self.resources {
            let label = format!("{}.{}", block.resource_type, block.name);
            if !seen.insert(label.clone()) {
                errors.push(format!("{}: declared more than once", label));
                continue;
            }

            let Some(schema) = schemas.get(&block.resource_type) else {
                errors.push(format!(
                    "{}: unknown resource type '{}'",
                    label, block.resource_type
                ));
                continue;
            };

            let attributes = match schema.decode_json(&block.attributes) {
                Ok(attributes) => attributes,
                Err(e) => {
                    errors.push(format!("{}: {}", label, e));
                    continue;
                }
            };
            if let Err(validation) = schema.validate(&attributes) {
                errors.extend(validation.into_iter().map(|e| format!("{}: {}", label, e)));
                continue;
            }

            let mut resource = Resource::new(&block.resource_type, &block.name)
                .with_timeouts(block.timeouts.resolve(self.provider.timeout));
            resource.attributes = attributes;
            resources.push(resource);
        }

        if errors.is_empty() {
            Ok(resources)
        } else {
            Err(format!("Validation failed:\n  {}", errors.join("\n  ")))
        }
    }
}
