//! Tool catalog: the set of tools discovered from one session.
//!
//! Built once from a `tools/list` result and read-only afterwards. Lookup
//! is by exact tool name; iteration is ordered by name.

use std::collections::BTreeMap;

use serde_json::Value;

use super::types::Tool;

/// Name → tool mapping for a single session.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, Tool>,
}

impl ToolCatalog {
    /// Build a catalog from the `result` of a `tools/list` reply.
    ///
    /// Structural checks only: `tools` must be an array of objects that each
    /// carry a string `name`. Duplicate names keep the last definition.
    pub fn from_list_result(result: &Value) -> Result<Self, String> {
        let entries = result
            .get("tools")
            .ok_or_else(|| "result has no 'tools' field".to_string())?
            .as_array()
            .ok_or_else(|| "'tools' is not an array".to_string())?;

        let mut tools = BTreeMap::new();
        for (index, entry) in entries.iter().enumerate() {
            if !entry.get("name").map(Value::is_string).unwrap_or(false) {
                return Err(format!("tool #{index} has no string 'name'"));
            }
            let tool: Tool = serde_json::from_value(entry.clone())
                .map_err(|e| format!("tool #{index} is malformed: {e}"))?;
            if tools.contains_key(&tool.name) {
                tracing::warn!(tool = %tool.name, "duplicate tool name in catalog");
            }
            tools.insert(tool.name.clone(), tool);
        }

        Ok(Self { tools })
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Whether a tool with this name was discovered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// All tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    /// Number of discovered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Fields listed under `required` in a tool's schema.
    pub fn required_fields(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .and_then(|tool| tool.input_schema.get("required"))
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_tool_catalog() {
        let result = json!({"tools": [{"name": "catalog_search", "description": "d", "inputSchema": {}}]});
        let catalog = ToolCatalog::from_list_result(&result).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.names(), vec!["catalog_search"]);
        assert_eq!(catalog.get("catalog_search").unwrap().description, "d");
    }

    #[test]
    fn test_names_sorted() {
        let result = json!({"tools": [
            {"name": "chunks_search", "description": "", "inputSchema": {}},
            {"name": "all_chunks_search", "description": "", "inputSchema": {}},
            {"name": "catalog_search", "description": "", "inputSchema": {}}
        ]});
        let catalog = ToolCatalog::from_list_result(&result).unwrap();
        assert_eq!(
            catalog.names(),
            vec!["all_chunks_search", "catalog_search", "chunks_search"]
        );
    }

    #[test]
    fn test_missing_tools_field() {
        let err = ToolCatalog::from_list_result(&json!({})).unwrap_err();
        assert!(err.contains("no 'tools'"));
    }

    #[test]
    fn test_tools_not_array() {
        let err = ToolCatalog::from_list_result(&json!({"tools": {"a": 1}})).unwrap_err();
        assert!(err.contains("not an array"));
    }

    #[test]
    fn test_tool_without_name() {
        let err =
            ToolCatalog::from_list_result(&json!({"tools": [{"description": "nameless"}]}))
                .unwrap_err();
        assert!(err.contains("#0"));
    }

    #[test]
    fn test_empty_tools_array_is_valid() {
        let catalog = ToolCatalog::from_list_result(&json!({"tools": []})).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_required_fields() {
        let result = json!({"tools": [{
            "name": "chunks_search",
            "description": "",
            "inputSchema": {"type": "object", "required": ["text", "source"]}
        }]});
        let catalog = ToolCatalog::from_list_result(&result).unwrap();
        assert_eq!(catalog.required_fields("chunks_search"), vec!["text", "source"]);
        assert!(catalog.required_fields("missing").is_empty());
    }
}
