//! Search requests and responses, shared by the CLI and the HTTP service.

use anyhow::{bail, Result};
use rolesearch_core::{
    ChunkMetadata, SearchError, SearchMode, SearchOutcome, Searcher, SimilarityOptions,
    UserPermissionView, VectorIndex,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::index_store::load_index;
use crate::users::{UserProvision, UserStore};

/// Body of `POST /search`, `/smart-search` and `/strict-search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
    /// Profile used to create the user if it does not exist.
    #[serde(default)]
    pub user_info: Option<UserProvision>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchUserInfo {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub similarity: f32,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub user_info: SearchUserInfo,
    pub query: String,
    pub total_found: usize,
    pub allowed_categories: Vec<String>,
    pub results: Vec<SearchHit>,
    /// `[lowest, highest]` similarity returned, or empty.
    pub similarity_range: Vec<f32>,
}

impl SearchResponse {
    pub fn from_outcome(user: &UserPermissionView, query: &str, outcome: SearchOutcome) -> Self {
        let similarity_range = outcome
            .similarity_range()
            .map(|(lo, hi)| vec![lo, hi])
            .unwrap_or_default();
        Self {
            user_info: SearchUserInfo {
                user_id: user.user_id.clone(),
                username: user.username.clone(),
                role: user.role.clone(),
            },
            query: query.to_string(),
            total_found: outcome.total_found,
            allowed_categories: outcome.allowed_categories.into_iter().collect(),
            results: outcome
                .results
                .into_iter()
                .map(|r| SearchHit {
                    category: r.metadata.category.clone(),
                    id: r.id,
                    content: r.content,
                    metadata: r.metadata,
                    similarity: r.similarity,
                })
                .collect(),
            similarity_range,
        }
    }
}

/// Find the permissions to search with.
///
/// Order: the stored user; a user provisioned from `user_info`; the
/// configured fallback role; otherwise `None`.
pub async fn resolve_user(
    store: &UserStore,
    fallback_role: Option<&str>,
    user_id: &str,
    user_info: Option<UserProvision>,
) -> Result<Option<UserPermissionView>> {
    if let Some(view) = store.permission_view(user_id).await? {
        return Ok(Some(view));
    }

    if let Some(profile) = user_info {
        match store.provision(user_id, profile).await {
            Ok(view) => return Ok(Some(view)),
            Err(e) => {
                warn!(user = %user_id, error = %format!("{:#}", e), "could not provision user");
                if let Some(view) = store.permission_view(user_id).await? {
                    return Ok(Some(view));
                }
            }
        }
    }

    if let Some(role) = fallback_role {
        let view = store.role_view(user_id, role).await?;
        if view.is_none() {
            warn!(role = %role, "fallback role does not exist");
        }
        return Ok(view);
    }

    Ok(None)
}

/// Run one search against a snapshot. Blocking; CPU-bound.
pub fn execute(
    index: Arc<VectorIndex>,
    user: Option<&UserPermissionView>,
    query: &str,
    top_k: usize,
    threshold: f32,
    options: SimilarityOptions,
) -> Result<SearchOutcome, SearchError> {
    Searcher::new(&index)
        .with_options(options)
        .search(user, query, top_k, threshold)
}

/// `rolesearch search`.
pub async fn run_search(
    config: &Config,
    query: &str,
    user_id: &str,
    mode: SearchMode,
    top_k: Option<usize>,
    threshold: Option<f32>,
) -> Result<()> {
    let threshold = threshold.unwrap_or_else(|| mode.threshold());
    let top_k = top_k.unwrap_or(config.retrieval.default_top_k);

    let store = UserStore::open(config).await?;
    let user = store.permission_view(user_id).await;
    store.close().await;
    let user = user?;

    let index = Arc::new(load_index(config));
    let outcome = execute(
        index,
        user.as_ref(),
        query,
        top_k,
        threshold,
        config.similarity_options(),
    )?;

    let Some(user) = user else {
        bail!("{}: {}", outcome.error.as_deref().unwrap_or("user not found"), user_id);
    };

    let categories: Vec<&str> = user.allowed_categories.iter().map(String::as_str).collect();
    println!("user: {} ({}), categories: {}", user.username, user.role, categories.join(", "));
    println!("mode: {} (threshold {:.2})", mode, threshold);

    if outcome.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "found {}, showing {}",
        outcome.total_found,
        outcome.results.len()
    );
    println!();
    for (i, result) in outcome.results.iter().enumerate() {
        let title = if result.metadata.title.is_empty() {
            "(untitled)"
        } else {
            result.metadata.title.as_str()
        };
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            result.similarity,
            result.metadata.category,
            title
        );
        println!(
            "    excerpt: \"{}\"",
            crate::chat::excerpt(result.content.replace('\n', " ").trim(), 160)
        );
        println!("    id: {}", result.id);
        println!();
    }
    Ok(())
}
