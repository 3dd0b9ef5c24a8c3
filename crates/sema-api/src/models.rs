//! Request and response bodies

use serde::{Deserialize, Serialize};

use sema_lsp::ReferenceResult;

/// `GET /health` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "healthy" when every tracked backend is ready, "degraded" otherwise
    pub status: String,
    /// Seconds since the server started
    pub uptime_seconds: u64,
    /// Languages with a ready backend
    pub active_languages: Vec<String>,
    /// Host memory snapshot
    pub memory: MemoryInfo,
}

/// Memory block of the health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Used memory in megabytes
    #[serde(rename = "usedMB")]
    pub used_mb: u64,
    /// Total memory in megabytes
    #[serde(rename = "totalMB")]
    pub total_mb: u64,
}

/// `GET /lsps/status` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Languages with a ready backend
    pub available: Vec<String>,
}

/// `POST /symbols/search` body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Symbol query
    pub query: String,
    /// Restrict the fan-out to these languages
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    /// Cap on merged results
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// Position within a document, zero-based
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    /// Line number
    pub line: u32,
    /// Column number
    pub character: u32,
}

/// `POST /references` body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencesRequest {
    /// File the position belongs to
    pub file_path: String,
    /// Position to resolve
    pub position: Position,
    /// Whether the declaration itself counts as a reference
    #[serde(default)]
    pub include_declaration: bool,
}

/// `POST /references` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencesResponse {
    /// The resolved references; empty for a position outside any symbol
    pub references: Vec<ReferenceResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_accepts_minimal_body() {
        let request: SearchRequest = serde_json::from_str(r#"{"query": "Foo"}"#).unwrap();
        assert_eq!(request.query, "Foo");
        assert!(request.languages.is_none());
        assert!(request.max_results.is_none());
    }

    #[test]
    fn test_references_request_camel_case() {
        let request: ReferencesRequest = serde_json::from_str(
            r#"{"filePath": "/src/a.rs", "position": {"line": 3, "character": 7},
                "includeDeclaration": true}"#,
        )
        .unwrap();
        assert_eq!(request.file_path, "/src/a.rs");
        assert!(request.include_declaration);
    }

    #[test]
    fn test_memory_info_field_names() {
        let info = MemoryInfo {
            used_mb: 512,
            total_mb: 2048,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["usedMB"], 512);
        assert_eq!(json["totalMB"], 2048);
    }
}
