//! Tool namespacing for unified sessions
//!
//! Each server in a unified session gets a namespace derived from its name;
//! tool names are exposed as `<namespace><SEP><original>`. Routing splits
//! on the first separator occurrence only, so tool names containing the
//! separator survive.

use std::collections::HashMap;

use rand::Rng;
use uuid::Uuid;

/// A namespaced tool name resolved back to its server and original name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToolName {
    pub server_id: Uuid,
    pub original_name: String,
}

/// Per-session mapping between servers and their namespaces
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    separator: String,
    by_namespace: HashMap<String, Uuid>,
    by_server: HashMap<Uuid, String>,
}

impl NamespaceRegistry {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            by_namespace: HashMap::new(),
            by_server: HashMap::new(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Register a server and return its namespace
    ///
    /// Collisions after sanitization get a 2-character random suffix;
    /// registering the same server twice returns the existing namespace.
    pub fn register(&mut self, server_id: Uuid, server_name: &str) -> String {
        if let Some(existing) = self.by_server.get(&server_id) {
            return existing.clone();
        }

        let base = sanitize(server_name);
        let mut namespace = base.clone();
        while self.by_namespace.contains_key(&namespace) {
            namespace = format!("{}_{}", base, disambiguator());
        }

        self.by_namespace.insert(namespace.clone(), server_id);
        self.by_server.insert(server_id, namespace.clone());
        namespace
    }

    pub fn namespace_of(&self, server_id: Uuid) -> Option<&str> {
        self.by_server.get(&server_id).map(String::as_str)
    }

    /// Build the exposed name for a tool of a registered server
    pub fn namespaced_name(&self, server_id: Uuid, tool_name: &str) -> Option<String> {
        self.namespace_of(server_id)
            .map(|ns| format!("{}{}{}", ns, self.separator, tool_name))
    }

    /// Split a namespaced name at the first separator and resolve the server
    pub fn parse(&self, namespaced: &str) -> Option<ParsedToolName> {
        let (namespace, original) = namespaced.split_once(self.separator.as_str())?;
        let server_id = *self.by_namespace.get(namespace)?;
        Some(ParsedToolName {
            server_id,
            original_name: original.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.by_server.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_server.is_empty()
    }
}

/// Lowercase and restrict to `[a-z0-9_]`
fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' { c } else { '_' })
        .collect();

    if sanitized.is_empty() {
        "server".to_string()
    } else {
        sanitized
    }
}

fn disambiguator() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..2)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Brave Search"), "brave_search");
        assert_eq!(sanitize("notes-v2"), "notes_v2");
        assert_eq!(sanitize("UPPER_case9"), "upper_case9");
        assert_eq!(sanitize(""), "server");
    }

    #[test]
    fn test_round_trip() {
        let mut registry = NamespaceRegistry::new(".");
        let server = Uuid::new_v4();
        let ns = registry.register(server, "Brave Search");
        assert_eq!(ns, "brave_search");

        let exposed = registry.namespaced_name(server, "web_search").unwrap();
        assert_eq!(exposed, "brave_search.web_search");

        let parsed = registry.parse(&exposed).unwrap();
        assert_eq!(parsed.server_id, server);
        assert_eq!(parsed.original_name, "web_search");
    }

    #[test]
    fn test_collisions_stay_distinct() {
        let mut registry = NamespaceRegistry::new(".");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let ns_a = registry.register(a, "notes");
        let ns_b = registry.register(b, "Notes");
        assert_ne!(ns_a, ns_b);
        assert_eq!(registry.parse(&format!("{}.t", ns_a)).unwrap().server_id, a);
        assert_eq!(registry.parse(&format!("{}.t", ns_b)).unwrap().server_id, b);
    }

    #[test]
    fn test_separator_inside_tool_name_survives() {
        let mut registry = NamespaceRegistry::new(".");
        let server = Uuid::new_v4();
        registry.register(server, "files");

        let parsed = registry.parse("files.read.metadata").unwrap();
        assert_eq!(parsed.original_name, "read.metadata");
    }

    #[test]
    fn test_unknown_namespace_is_none() {
        let registry = NamespaceRegistry::new(".");
        assert!(registry.parse("ghost.tool").is_none());
        assert!(registry.parse("no_separator_here").is_none());
    }

    #[test]
    fn test_double_underscore_separator() {
        let mut registry = NamespaceRegistry::new("__");
        let server = Uuid::new_v4();
        registry.register(server, "files");

        let exposed = registry.namespaced_name(server, "read_file").unwrap();
        assert_eq!(exposed, "files__read_file");
        let parsed = registry.parse(&exposed).unwrap();
        assert_eq!(parsed.original_name, "read_file");
    }

    #[test]
    fn test_reregistering_is_idempotent() {
        let mut registry = NamespaceRegistry::new(".");
        let server = Uuid::new_v4();
        let first = registry.register(server, "files");
        let second = registry.register(server, "files");
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }
}
