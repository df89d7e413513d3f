//! Integration tests for Hybrid Code Search
//!
//! These tests build real projects on disk, index them through the public
//! API, and validate queries through the indexer and the tool interface.

use anyhow::Result;
use hybrid_code_search::config::{Config, EmbeddingProviderKind};
use hybrid_code_search::index::IncrementalIndexer;
use hybrid_code_search::query::QueryInterface;
use hybrid_code_search::{UnitKind, UpdateSummary, VectorBackend};
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Three units; `get` and `user` appear in all of them, `authentication` in one
const USERS_PY: &str = r#"def get_user_by_id(user_id):
    """Get user record."""
    user = db.get_user(user_id)
    return user


def authenticate(user, password):
    """Run authentication for the user."""
    record = get_user(user)
    ok = verify(record, password)
    return ok


class UserService:
    def get(self, user_id):
        return get_user(user_id)

    def all(self):
        return []
"#;

const RUST_FILE: &str = r#"pub struct TokenStore {
    tokens: Vec<String>,
}

impl TokenStore {
    pub fn issue(&mut self, user: &str) -> String {
        let token = format!("{}-token", user);
        self.tokens.push(token.clone());
        token
    }
}
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app/users.py", USERS_PY);
    write(dir.path(), "src/tokens.rs", RUST_FILE);
    write(dir.path(), "node_modules/dep/index.js", "module.exports = {}");
    write(dir.path(), "docs/logo.png", "not really a png");
    dir
}

/// Voyage provider whose credential variable is never set
fn offline_config() -> Config {
    let mut config = Config::default();
    config.embeddings.provider = EmbeddingProviderKind::Voyage;
    config.embeddings.api_key_env = vec!["HCS_TEST_KEY_THAT_IS_NEVER_SET".to_string()];
    config
}

fn hashed_config() -> Config {
    let mut config = Config::default();
    config.embeddings.provider = EmbeddingProviderKind::Hashed;
    config.embeddings.dimensions = 128;
    config
}

#[tokio::test]
async fn test_rare_term_ranks_first_without_credentials() -> Result<()> {
    let dir = project();
    let mut indexer = IncrementalIndexer::open(&offline_config(), dir.path())?;
    indexer.index().await?;

    assert!(!indexer.embedder().is_available());
    assert!(indexer.embedder().permanently_unavailable());
    assert!(indexer.vector_store().is_empty());

    let results = indexer.search("get user authentication", 5).await;
    assert!(!results.is_empty());
    assert_eq!(results[0].unit.name.as_deref(), Some("authenticate"));
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    Ok(())
}

#[tokio::test]
async fn test_excluded_files_never_indexed() -> Result<()> {
    let dir = project();
    let mut indexer = IncrementalIndexer::open(&offline_config(), dir.path())?;
    indexer.index().await?;

    let paths: Vec<&str> = indexer.units().iter().map(|u| u.file_path.as_str()).collect();
    assert!(paths.iter().all(|p| *p == "app/users.py" || *p == "src/tokens.rs"));
    assert_eq!(indexer.stats().files, 2);
    Ok(())
}

#[tokio::test]
async fn test_update_cycle() -> Result<()> {
    let dir = project();
    let mut indexer = IncrementalIndexer::open(&offline_config(), dir.path())?;

    let first = indexer.update().await?;
    assert_eq!(first.added, 2);
    assert_eq!(indexer.update().await?, UpdateSummary::default());

    fs::remove_file(dir.path().join("src/tokens.rs"))?;
    let summary = indexer.update().await?;
    assert_eq!(
        summary,
        UpdateSummary {
            added: 0,
            updated: 0,
            removed: 1
        }
    );
    let results = indexer.search("token store issue", 5).await;
    assert!(results.iter().all(|r| r.unit.file_path != "src/tokens.rs"));
    Ok(())
}

#[tokio::test]
async fn test_reopen_restores_index() -> Result<()> {
    let dir = project();
    let units = {
        let mut indexer = IncrementalIndexer::open(&offline_config(), dir.path())?;
        indexer.index().await?
    };

    let mut reopened = IncrementalIndexer::open(&offline_config(), dir.path())?;
    assert_eq!(reopened.units().len(), units);
    assert_eq!(reopened.update().await?, UpdateSummary::default());
    Ok(())
}

#[tokio::test]
async fn test_changed_chunking_config_invalidates_snapshot() -> Result<()> {
    let dir = project();
    {
        let mut indexer = IncrementalIndexer::open(&offline_config(), dir.path())?;
        indexer.index().await?;
    }

    let mut config = offline_config();
    config.chunking.min_lines = 3;
    let mut indexer = IncrementalIndexer::open(&config, dir.path())?;
    assert!(indexer.units().is_empty());
    assert_eq!(indexer.update().await?.added, 2);
    Ok(())
}

#[tokio::test]
async fn test_hnsw_backend_persists_vectors() -> Result<()> {
    let dir = project();
    let mut config = hashed_config();
    config.vector.backend = VectorBackend::Hnsw;

    let units = {
        let mut indexer = IncrementalIndexer::open(&config, dir.path())?;
        let units = indexer.index().await?;
        assert_eq!(indexer.vector_store().len(), units);
        units
    };
    assert!(dir.path().join(".rag_cache/ann/vectors.bin").exists());

    let reopened = IncrementalIndexer::open(&config, dir.path())?;
    assert_eq!(reopened.vector_store().backend(), VectorBackend::Hnsw);
    assert_eq!(reopened.vector_store().len(), units);

    let results = reopened.search("issue token for user", 3).await;
    assert!(results
        .iter()
        .any(|r| r.unit.file_path == "src/tokens.rs"));
    Ok(())
}

#[tokio::test]
async fn test_chunk_kinds_across_languages() -> Result<()> {
    let dir = project();
    let mut indexer = IncrementalIndexer::open(&offline_config(), dir.path())?;
    indexer.index().await?;

    let kind_of = |name: &str| {
        indexer
            .units()
            .iter()
            .find(|u| u.name.as_deref() == Some(name))
            .map(|u| u.kind)
    };
    assert_eq!(kind_of("get_user_by_id"), Some(UnitKind::Function));
    assert_eq!(kind_of("UserService"), Some(UnitKind::Class));
    assert_eq!(kind_of("issue"), Some(UnitKind::Method));
    Ok(())
}

#[tokio::test]
async fn test_tool_interface_end_to_end() -> Result<()> {
    let dir = project();
    let mut indexer = IncrementalIndexer::open(&hashed_config(), dir.path())?;
    indexer.index().await?;
    let mut tools = QueryInterface::new(indexer);

    let response = tools
        .call_tool("search_code", &json!({"query": "authentication"}))
        .await;
    assert!(!response.is_error);
    assert!(response.first_text().contains("Name: authenticate"));

    let response = tools
        .call_tool("search_by_symbol", &json!({"name": "get_", "mode": "prefix"}))
        .await;
    assert!(response.first_text().contains("Name: get_user_by_id"));

    let response = tools
        .call_tool("get_file_structure", &json!({"depth": 2}))
        .await;
    let text = response.first_text();
    assert!(text.contains("app/"));
    assert!(text.contains("users.py"));
    assert!(!text.contains("node_modules"));
    assert!(!text.contains("logo.png"));

    let response = tools
        .call_tool(
            "get_similar_patterns",
            &json!({"code_snippet": "fn issue(&mut self, user: &str) -> String", "top_k": 1}),
        )
        .await;
    assert!(!response.is_error);
    assert!(response.first_text().contains("(1 result)"));

    write(
        dir.path(),
        "app/sessions.py",
        "def open_session(user):\n    session = Session(user)\n    session.start()\n    store(session)\n    return session\n",
    );
    let response = tools.call_tool("reindex", &json!({})).await;
    assert!(response.first_text().contains("1 added"));
    Ok(())
}

#[tokio::test]
async fn test_similar_patterns_without_credentials() -> Result<()> {
    let dir = project();
    let mut indexer = IncrementalIndexer::open(&offline_config(), dir.path())?;
    indexer.index().await?;
    let tools = QueryInterface::new(indexer);

    let response = tools.get_similar_patterns("def f(): pass", 5).await;
    assert!(response.is_error);
    assert!(response.first_text().contains("Vector search unavailable"));
    Ok(())
}

#[test]
fn test_template_config_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("hybrid_code_search.toml");
    Config::write_template(&path)?;
    let config = Config::from_file(&path)?;
    config.validate()?;
    assert_eq!(config.search.default_top_k, 5);
    assert_eq!(config.chunking, Config::default().chunking);
    Ok(())
}
