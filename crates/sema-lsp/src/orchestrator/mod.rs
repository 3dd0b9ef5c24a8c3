//! The orchestration facade
//!
//! Single entry point for logical code-intelligence requests: selects the
//! relevant backends, fans out through their process clients, merges and
//! filters results, and serves cached results while they are valid. One
//! backend failing or timing out never aborts the others — the caller gets
//! partial results with per-language annotations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use sema_cache::{CacheConfig, SearchMetrics, TtlCache, TtlClass};

use crate::client::{BackendClient, ReconnectPolicy};
use crate::error::{Result, SemaLspError};
use crate::install::{DependencyResolver, InstallationReport};
use crate::types::{BackendRegistry, ClientState};

/// Result cap applied when the caller does not give one
const DEFAULT_MAX_RESULTS: usize = 100;

/// One symbol hit from a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolResult {
    /// Symbol name
    pub name: String,
    /// Symbol kind, when the backend reported a known one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Language whose backend produced the hit
    pub language: String,
    /// File the symbol is defined in
    pub path: String,
    /// Zero-based line of the definition
    pub line: u32,
    /// Zero-based column of the definition
    pub character: u32,
    /// Enclosing container, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

/// One reference hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceResult {
    /// File containing the reference
    pub path: String,
    /// Zero-based line
    pub line: u32,
    /// Zero-based column
    pub character: u32,
}

/// Per-language outcome of a fan-out search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Backend answered
    Ok,
    /// Backend call exceeded its deadline
    TimedOut,
    /// Backend errored
    Failed,
    /// No usable backend: missing dependency, disabled, or closed
    Unavailable,
}

/// Success/failure annotation for one targeted language
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageOutcome {
    /// The language
    pub language: String,
    /// How its backend fared
    pub status: OutcomeStatus,
    /// Error detail when the status is not `Ok`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Merged fan-out search result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// The query as issued
    pub query: String,
    /// Languages targeted, in enablement order
    pub languages: Vec<String>,
    /// Number of symbols returned after truncation
    pub total: usize,
    /// Merged symbols: language enablement order, then order received
    pub symbols: Vec<SymbolResult>,
    /// Per-language annotations
    pub outcomes: Vec<LanguageOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SymbolsKey {
    query: String,
    languages: Vec<String>,
    max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReferencesKey {
    path: String,
    line: u32,
    character: u32,
    include_declaration: bool,
}

/// Registry of live backend clients
///
/// The only mutation surface for the shared client map; the raw map is
/// never exposed. Shared by the facade and the health monitor.
pub struct LiveClientRegistry {
    clients: RwLock<HashMap<String, Arc<BackendClient>>>,
}

impl LiveClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the live client for a language
    pub async fn get(&self, language: &str) -> Option<Arc<BackendClient>> {
        self.clients.read().await.get(language).cloned()
    }

    /// Track a client, replacing any previous entry for the language
    pub async fn insert(&self, language: String, client: Arc<BackendClient>) {
        self.clients.write().await.insert(language, client);
    }

    /// Stop tracking a language; the client itself is returned
    pub async fn remove(&self, language: &str) -> Option<Arc<BackendClient>> {
        self.clients.write().await.remove(language)
    }

    /// Snapshot of every tracked (language, client) pair
    pub async fn list(&self) -> Vec<(String, Arc<BackendClient>)> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(language, client)| (language.clone(), Arc::clone(client)))
            .collect()
    }

    /// Number of tracked clients
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether no clients are tracked
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl Default for LiveClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The single call surface over all backends
pub struct Orchestrator {
    config: BackendRegistry,
    workspace_root: PathBuf,
    clients: Arc<LiveClientRegistry>,
    resolver: DependencyResolver,
    reports: RwLock<HashMap<String, InstallationReport>>,
    symbols_cache: TtlCache<SymbolsKey, SearchResponse>,
    references_cache: TtlCache<ReferencesKey, Vec<ReferenceResult>>,
    metrics: Arc<SearchMetrics>,
    /// Serializes client creation so one language gets one process
    creation: Mutex<()>,
}

impl Orchestrator {
    /// Create a facade for the given configuration and workspace
    pub fn new(config: BackendRegistry, workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        let staging = workspace_root.join(".sema").join("staging");
        Self {
            config,
            workspace_root,
            clients: Arc::new(LiveClientRegistry::new()),
            resolver: DependencyResolver::new(staging),
            reports: RwLock::new(HashMap::new()),
            symbols_cache: TtlCache::new(),
            references_cache: TtlCache::new(),
            metrics: Arc::new(SearchMetrics::new()),
            creation: Mutex::new(()),
        }
    }

    /// Replace both caches with ones using the given configuration
    pub fn with_cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.symbols_cache = TtlCache::with_config(cache_config.clone());
        self.references_cache = TtlCache::with_config(cache_config);
        self
    }

    /// The backend configuration this facade routes over
    pub fn config(&self) -> &BackendRegistry {
        &self.config
    }

    /// The live-client registry (shared with the health monitor)
    pub fn clients(&self) -> Arc<LiveClientRegistry> {
        Arc::clone(&self.clients)
    }

    /// The metrics collector
    pub fn metrics(&self) -> Arc<SearchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The retained installation report for a language, if any
    pub async fn install_report(&self, language: &str) -> Option<InstallationReport> {
        self.reports.read().await.get(language).cloned()
    }

    /// Languages whose client is currently `Ready`, in enablement order
    pub async fn available_languages(&self) -> Vec<String> {
        let mut available = Vec::new();
        for language in self.config.enabled_languages() {
            if let Some(client) = self.clients.get(&language).await {
                if client.state().await == ClientState::Ready {
                    available.push(language);
                }
            }
        }
        available
    }

    /// Find a symbol across the targeted backends
    ///
    /// Cache key is `(query, language_filter, max_results)`. On a miss the
    /// targeted backends are queried concurrently; a failure or timeout in
    /// one language never aborts the others. Results merge in language
    /// enablement order, then order received, truncated to `max_results`.
    /// The merged response is cached under the primary TTL only when every
    /// targeted backend answered; otherwise it gets the fallback TTL.
    pub async fn find_symbol(
        &self,
        query: &str,
        language_filter: Option<Vec<String>>,
        max_results: Option<usize>,
    ) -> Result<SearchResponse> {
        if query.trim().is_empty() {
            return Err(SemaLspError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }
        let max_results = match max_results {
            Some(0) => {
                return Err(SemaLspError::InvalidRequest(
                    "maxResults must be positive".to_string(),
                ))
            }
            Some(limit) => limit,
            None => DEFAULT_MAX_RESULTS,
        };

        let started = Instant::now();
        self.metrics.record_search();

        let key = SymbolsKey {
            query: query.to_string(),
            languages: language_filter.clone().unwrap_or_default(),
            max_results,
        };

        if let Some(cached) = self.symbols_cache.get(&key).await {
            debug!(query, "Symbol search served from cache");
            self.metrics
                .set_cache_hit_ratio(self.symbols_cache.hit_ratio());
            return Ok(cached);
        }
        self.metrics
            .set_cache_hit_ratio(self.symbols_cache.hit_ratio());

        // Target set: the filter when given, every enabled backend
        // otherwise — always walked in enablement order so the merge is
        // deterministic regardless of completion timing.
        let enabled = self.config.enabled_languages();
        let mut targets = Vec::new();
        let mut outcomes = Vec::new();
        match &language_filter {
            Some(filter) => {
                for language in &enabled {
                    if filter.iter().any(|f| f == language) {
                        targets.push(language.clone());
                    }
                }
                for language in filter {
                    if !enabled.contains(language) {
                        outcomes.push(LanguageOutcome {
                            language: language.clone(),
                            status: OutcomeStatus::Unavailable,
                            detail: Some("no enabled backend".to_string()),
                        });
                    }
                }
            }
            None => targets = enabled,
        }

        let searches = targets
            .iter()
            .map(|language| self.search_language(language, query));
        let collected = futures::future::join_all(searches).await;

        let mut symbols = Vec::new();
        for (language, result) in collected {
            match result {
                Ok(mut hits) => {
                    symbols.append(&mut hits);
                    outcomes.push(LanguageOutcome {
                        language,
                        status: OutcomeStatus::Ok,
                        detail: None,
                    });
                }
                Err(error) => {
                    warn!(language = %language, error = %error, "Backend search failed");
                    outcomes.push(LanguageOutcome {
                        language,
                        status: outcome_status(&error),
                        detail: Some(error.to_string()),
                    });
                }
            }
        }
        symbols.truncate(max_results);

        let all_ok = !outcomes.is_empty()
            && outcomes.iter().all(|o| o.status == OutcomeStatus::Ok);
        if !all_ok {
            self.metrics.record_fallback();
        }

        let response = SearchResponse {
            query: query.to_string(),
            languages: targets,
            total: symbols.len(),
            symbols,
            outcomes,
        };

        let class = if all_ok {
            TtlClass::Primary
        } else {
            TtlClass::Fallback
        };
        self.symbols_cache.put(key, response.clone(), class).await;
        self.metrics.record_response_time(started.elapsed());

        Ok(response)
    }

    /// Find references for a position; routed to exactly one backend
    ///
    /// The owning backend is resolved by file extension — a position
    /// belongs to exactly one language, so there is no fan-out. A position
    /// outside any known symbol yields an empty list, not an error.
    pub async fn find_references(
        &self,
        path: &str,
        line: u32,
        character: u32,
        include_declaration: bool,
    ) -> Result<Vec<ReferenceResult>> {
        if path.trim().is_empty() {
            return Err(SemaLspError::InvalidRequest(
                "filePath must not be empty".to_string(),
            ));
        }
        let extension = Path::new(path)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .ok_or_else(|| {
                SemaLspError::InvalidRequest(format!("'{path}' has no file extension"))
            })?;

        let descriptor = self
            .config
            .language_for_extension(&extension)
            .ok_or_else(|| SemaLspError::NoActiveBackend {
                language: extension.clone(),
            })?;
        let language = descriptor.language.clone();

        let started = Instant::now();
        self.metrics.record_search();

        let key = ReferencesKey {
            path: path.to_string(),
            line,
            character,
            include_declaration,
        };
        if let Some(cached) = self.references_cache.get(&key).await {
            debug!(path, "References served from cache");
            return Ok(cached);
        }

        self.metrics.record_attempt();
        let client = self.client_for(&language).await?;
        client.ensure_ready().await?;

        let params = json!({
            "textDocument": {"uri": format!("file://{path}")},
            "position": {"line": line, "character": character},
            "context": {"includeDeclaration": include_declaration},
        });
        let value = client
            .call(
                "textDocument/references",
                Some(params),
                client.descriptor().request_timeout(),
            )
            .await?;
        self.metrics.record_success();

        let references = parse_references(&value);
        self.references_cache
            .put(key, references.clone(), TtlClass::Primary)
            .await;
        self.metrics.record_response_time(started.elapsed());

        Ok(references)
    }

    /// Invalidate cached results referencing a changed file
    ///
    /// Also nudges the owning backend so its own state can refresh.
    pub async fn invalidate_path(&self, path: &Path) -> usize {
        let path_string = path.to_string_lossy().into_owned();
        let removed = self
            .references_cache
            .invalidate_matching(|key| key.path == path_string)
            .await;
        if removed > 0 {
            debug!(path = %path.display(), removed, "Invalidated cached references");
        }

        if let Some(extension) = path.extension() {
            let extension = format!(".{}", extension.to_string_lossy());
            if let Some(descriptor) = self.config.language_for_extension(&extension) {
                if let Some(client) = self.clients.get(&descriptor.language).await {
                    if client.state().await == ClientState::Ready {
                        let params = json!({
                            "changes": [{"uri": format!("file://{path_string}"), "type": 2}]
                        });
                        let _ = client
                            .notify("workspace/didChangeWatchedFiles", Some(params))
                            .await;
                    }
                }
            }
        }

        removed
    }

    /// Shut every live client down and clear the registry
    pub async fn shutdown(&self) {
        for (language, client) in self.clients.list().await {
            info!(language = %language, "Shutting down backend client");
            client.shutdown().await;
            self.clients.remove(&language).await;
        }
    }

    /// One fan-out leg; never panics the merge, returns its own outcome
    async fn search_language(
        &self,
        language: &str,
        query: &str,
    ) -> (String, Result<Vec<SymbolResult>>) {
        self.metrics.record_attempt();

        let result = async {
            let client = self.client_for(language).await?;
            client.ensure_ready().await?;
            let value = client
                .call(
                    "workspace/symbol",
                    Some(json!({"query": query})),
                    client.descriptor().request_timeout(),
                )
                .await?;
            Ok(parse_symbols(language, &value))
        }
        .await;

        if result.is_ok() {
            self.metrics.record_success();
        }
        (language.to_string(), result)
    }

    /// Get the live client for a language, creating it on first demand
    ///
    /// Creation resolves dependencies first; a missing required dependency
    /// leaves the language without a client and the report retained for
    /// diagnostics. At most one live client exists per language.
    async fn client_for(&self, language: &str) -> Result<Arc<BackendClient>> {
        if let Some(existing) = self.clients.get(language).await {
            return Ok(existing);
        }

        let _guard = self.creation.lock().await;
        // Someone else may have created it while we waited.
        if let Some(existing) = self.clients.get(language).await {
            return Ok(existing);
        }

        let descriptor = self
            .config
            .get(language)
            .filter(|d| d.enabled)
            .cloned()
            .ok_or_else(|| SemaLspError::NoActiveBackend {
                language: language.to_string(),
            })?;

        let report = self.resolver.resolve(&descriptor).await;
        let launchable = report.is_launchable();
        let missing = report
            .results
            .iter()
            .find(|r| !r.success && r.spec.required)
            .map(|r| r.spec.name.clone());
        self.reports
            .write()
            .await
            .insert(language.to_string(), report);

        if !launchable {
            return Err(SemaLspError::DependencyMissing {
                language: language.to_string(),
                name: missing.unwrap_or_default(),
            });
        }

        let policy = ReconnectPolicy::from_settings(&self.config.global);
        let client = Arc::new(BackendClient::new(
            descriptor,
            &self.workspace_root,
            policy,
            self.config.global.consecutive_timeout_limit,
        ));
        self.clients
            .insert(language.to_string(), Arc::clone(&client))
            .await;

        Ok(client)
    }
}

/// Map an error to the annotation callers see
fn outcome_status(error: &SemaLspError) -> OutcomeStatus {
    match error {
        SemaLspError::RequestTimeout { .. } | SemaLspError::HandshakeTimeout { .. } => {
            OutcomeStatus::TimedOut
        }
        SemaLspError::DependencyMissing { .. }
        | SemaLspError::NoActiveBackend { .. }
        | SemaLspError::LaunchFailure { .. }
        | SemaLspError::ReconnectExhausted { .. } => OutcomeStatus::Unavailable,
        _ => OutcomeStatus::Failed,
    }
}

/// Parse a `workspace/symbol` response into results
fn parse_symbols(language: &str, value: &Value) -> Vec<SymbolResult> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.to_string();
            let location = item.get("location")?;
            let path = uri_to_path(location.get("uri")?.as_str()?);
            let start = location.get("range")?.get("start")?;
            Some(SymbolResult {
                name,
                kind: item
                    .get("kind")
                    .and_then(Value::as_u64)
                    .and_then(symbol_kind_name)
                    .map(str::to_string),
                language: language.to_string(),
                path,
                line: start.get("line")?.as_u64()? as u32,
                character: start.get("character")?.as_u64()? as u32,
                container: item
                    .get("containerName")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

/// Parse a `textDocument/references` response; `null` means no references
fn parse_references(value: &Value) -> Vec<ReferenceResult> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let start = item.get("range")?.get("start")?;
            Some(ReferenceResult {
                path: uri_to_path(item.get("uri")?.as_str()?),
                line: start.get("line")?.as_u64()? as u32,
                character: start.get("character")?.as_u64()? as u32,
            })
        })
        .collect()
}

fn uri_to_path(uri: &str) -> String {
    uri.strip_prefix("file://").unwrap_or(uri).to_string()
}

/// LSP symbol kind numbers worth naming for callers
fn symbol_kind_name(kind: u64) -> Option<&'static str> {
    Some(match kind {
        2 => "module",
        5 => "class",
        6 => "method",
        7 => "property",
        8 => "field",
        9 => "constructor",
        10 => "enum",
        11 => "interface",
        12 => "function",
        13 => "variable",
        14 => "constant",
        23 => "struct",
        _ => return None,
    })
}
