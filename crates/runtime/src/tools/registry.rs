//! Discovered tool catalog.

use crate::llm::ToolSpec;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// A tool advertised by the host. Immutable after discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<mcp::Tool> for ToolDescriptor {
    fn from(tool: mcp::Tool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool.input_schema,
        }
    }
}

/// Tools known to one session, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry. When a name repeats, the first descriptor wins.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        let mut registry = Self::default();
        for descriptor in descriptors {
            if registry.index.contains_key(&descriptor.name) {
                warn!(tool = %descriptor.name, "duplicate tool name, keeping the first");
                continue;
            }
            registry
                .index
                .insert(descriptor.name.clone(), registry.tools.len());
            registry.tools.push(descriptor);
        }
        registry
    }

    /// Tool definitions in the shape the provider expects.
    pub fn as_provider_schema(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            description: description.into(),
            input_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn keeps_insertion_order() {
        let registry = ToolRegistry::from_descriptors([
            descriptor("get_forecast", "forecast"),
            descriptor("calculate_expression", "math"),
            descriptor("get_alerts", "alerts"),
        ]);

        let names: Vec<_> = registry
            .as_provider_schema()
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        assert_eq!(names, ["get_forecast", "calculate_expression", "get_alerts"]);
        assert_eq!(registry.as_provider_schema(), registry.as_provider_schema());
    }

    #[test]
    fn first_duplicate_wins() {
        let registry = ToolRegistry::from_descriptors([
            descriptor("get_alerts", "first"),
            descriptor("get_alerts", "second"),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("get_alerts").unwrap().description, "first");
    }

    #[test]
    fn lookup_by_name() {
        let registry = ToolRegistry::from_descriptors([descriptor("get_alerts", "alerts")]);
        assert!(registry.has("get_alerts"));
        assert!(!registry.has("delete_everything"));
        assert!(registry.get("delete_everything").is_none());
        assert!(ToolRegistry::default().is_empty());
    }

    #[test]
    fn missing_description_becomes_empty() {
        let tool = mcp::Tool {
            name: "ping".into(),
            description: None,
            input_schema: json!({"type": "object"}),
        };
        assert_eq!(ToolDescriptor::from(tool).description, "");
    }
}
