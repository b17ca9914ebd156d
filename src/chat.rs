//! Chat-style replies built from the best search hit.

use rolesearch_core::SearchOutcome;
use serde::{Deserialize, Serialize};

/// Characters of chunk content quoted in a reply.
pub const MAX_EXCERPT_CHARS: usize = 250;

const NO_RESULTS: &str =
    "Xin lỗi, tôi không tìm thấy thông tin phù hợp với câu hỏi của bạn trong tài liệu công ty.";
const LOOKUP_FAILED: &str = "Xin lỗi, tôi gặp sự cố khi tìm thông tin. Vui lòng thử lại sau.";

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub success: bool,
    pub response: String,
    /// Title of the quoted chunk.
    pub source: Option<String>,
    pub category: Option<String>,
    /// Similarity of the quoted chunk.
    pub confidence: Option<f32>,
    pub total_results: usize,
}

impl ChatReply {
    fn apology(success: bool, text: &str) -> Self {
        Self {
            success,
            response: text.to_string(),
            source: None,
            category: None,
            confidence: None,
            total_results: 0,
        }
    }
}

/// Turn a search outcome into a reply quoting its best result.
pub fn format_chat_reply(outcome: &SearchOutcome) -> ChatReply {
    if outcome.is_error() {
        return ChatReply::apology(false, LOOKUP_FAILED);
    }
    let Some(best) = outcome.results.first() else {
        return ChatReply::apology(true, NO_RESULTS);
    };

    let title = if best.metadata.title.is_empty() {
        "Tài liệu"
    } else {
        best.metadata.title.as_str()
    };
    let category = if best.metadata.category.is_empty() {
        "general"
    } else {
        best.metadata.category.as_str()
    };

    let response = format!(
        "Dựa trên tài liệu công ty, tôi tìm thấy thông tin sau:\n\n**{}**\n\n{}\n\n*Nguồn: {}*",
        title,
        excerpt(&best.content, MAX_EXCERPT_CHARS),
        category
    );

    ChatReply {
        success: true,
        response,
        source: Some(title.to_string()),
        category: Some(category.to_string()),
        confidence: Some(best.similarity),
        total_results: outcome.total_found,
    }
}

/// First `max_chars` characters of `content`, with `...` if cut.
pub fn excerpt(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolesearch_core::{ChunkMetadata, SearchResult};
    use std::collections::BTreeSet;

    fn hit(content: &str, similarity: f32) -> SearchResult {
        SearchResult {
            id: "leave_0".into(),
            content: content.into(),
            metadata: ChunkMetadata {
                document_id: "leave".into(),
                category: "policy".into(),
                allowed_roles: BTreeSet::new(),
                title: "Chính sách nghỉ phép".into(),
            },
            similarity,
        }
    }

    fn outcome(results: Vec<SearchResult>, total_found: usize) -> SearchOutcome {
        SearchOutcome {
            total_found,
            allowed_categories: BTreeSet::from(["policy".to_string()]),
            results,
            error: None,
        }
    }

    #[test]
    fn test_no_results_is_successful_apology() {
        let reply = format_chat_reply(&outcome(Vec::new(), 0));
        assert!(reply.success);
        assert_eq!(reply.total_results, 0);
        assert!(reply.source.is_none());
        assert!(reply.confidence.is_none());
    }

    #[test]
    fn test_unknown_user_is_failed_reply() {
        let reply = format_chat_reply(&SearchOutcome::user_not_found());
        assert!(!reply.success);
        assert_eq!(reply.total_results, 0);
    }

    #[test]
    fn test_quotes_best_result() {
        let reply = format_chat_reply(&outcome(
            vec![hit("Nghỉ phép 12 ngày.", 0.8), hit("other", 0.2)],
            4,
        ));
        assert!(reply.success);
        assert_eq!(reply.source.as_deref(), Some("Chính sách nghỉ phép"));
        assert_eq!(reply.category.as_deref(), Some("policy"));
        assert_eq!(reply.confidence, Some(0.8));
        assert_eq!(reply.total_results, 4);
        assert!(reply.response.contains("Nghỉ phép 12 ngày."));
        assert!(reply.response.contains("*Nguồn: policy*"));
        assert!(!reply.response.contains("other"));
    }

    #[test]
    fn test_excerpt_truncates_on_chars() {
        let long = "ệ".repeat(300);
        let cut = excerpt(&long, MAX_EXCERPT_CHARS);
        assert_eq!(cut.chars().count(), MAX_EXCERPT_CHARS + 3);
        assert!(cut.ends_with("..."));

        let exact = "a".repeat(MAX_EXCERPT_CHARS);
        assert_eq!(excerpt(&exact, MAX_EXCERPT_CHARS), exact);
    }
}
