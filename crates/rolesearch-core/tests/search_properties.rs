//! Behavioural properties of the search engine, exercised through the
//! public API only.

use std::sync::Arc;
use std::thread;

use rolesearch_core::corpus::{parse_corpus, CorpusChunk};
use rolesearch_core::embedding::l2_norm;
use rolesearch_core::persist::{read_index, write_index};
use rolesearch_core::search::USER_NOT_FOUND;
use rolesearch_core::{
    IndexConfig, RolePermission, SearchMode, Searcher, UserPermissionView, VectorIndex,
};

const CORPUS: &str = r#"{
    "statistics": { "total_documents": 4 },
    "chunks": [
        { "id": "leave_0", "document_id": "leave", "category": "policy",
          "title": "Chính sách nghỉ phép", "allowed_roles": ["employee", "manager"],
          "content": "Nhân viên chính thức được nghỉ phép 12 ngày mỗi năm. Nghỉ phép phải đăng ký trước 3 ngày." },
        { "id": "pay_0", "document_id": "pay", "category": "salary",
          "title": "Quy chế lương thưởng", "allowed_roles": ["manager"],
          "content": "Lương thưởng tháng 13 được chi trả vào tháng 1. Mức thưởng theo hiệu suất." },
        { "id": "hours_0", "document_id": "hours", "category": "rules",
          "title": "Nội quy", "allowed_roles": ["employee"],
          "content": "Giờ làm việc từ 8 giờ đến 17 giờ, nghỉ trưa 1 giờ." },
        { "id": "ins_0", "document_id": "ins", "category": "confidential",
          "title": "Bảo hiểm", "allowed_roles": ["hr"],
          "content": "Hợp đồng bảo hiểm sức khỏe cho nhân viên và người thân." }
    ]
}"#;

fn corpus() -> Vec<CorpusChunk> {
    parse_corpus(CORPUS).unwrap()
}

fn index() -> VectorIndex {
    VectorIndex::build(&corpus(), IndexConfig::default()).unwrap()
}

fn user(role: &str, categories: &[&str]) -> UserPermissionView {
    let permission = RolePermission::new(role, categories.iter().copied(), "");
    UserPermissionView::for_role("user001", "Nguyễn Văn A", &permission)
}

const QUERIES: &[&str] = &[
    "nghỉ phép",
    "lương thưởng tháng 13",
    "giờ làm việc",
    "bảo hiểm hợp đồng",
    "nhân viên",
    "",
    "!!!",
    "hoàn toàn không liên quan",
];

#[test]
fn test_two_chunk_scenario_returns_only_permitted_chunk() {
    let chunks = parse_corpus(
        r#"[
            { "id": "p", "content": "nghỉ phép", "category": "policy" },
            { "id": "s", "content": "lương thưởng", "category": "salary" }
        ]"#,
    )
    .unwrap();
    let index = VectorIndex::build(&chunks, IndexConfig::default()).unwrap();
    let employee = user("employee", &["policy"]);

    let outcome = Searcher::new(&index)
        .search(Some(&employee), "nghỉ phép", 5, 0.05)
        .unwrap();

    assert_eq!(outcome.total_found, 1);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].id, "p");
    assert_eq!(outcome.results[0].metadata.category, "policy");
    assert!(outcome.error.is_none());
}

#[test]
fn test_encode_is_deterministic() {
    let a = index();
    let b = index();
    assert_eq!(a, b);
    for q in QUERIES {
        assert_eq!(a.encode(q), a.encode(q));
        assert_eq!(a.encode(q), b.encode(q));
    }
}

#[test]
fn test_embeddings_have_unit_norm_or_are_zero() {
    let index = index();
    for entry in index.all_entries() {
        assert_eq!(entry.embedding.len(), index.vector_dim());
        assert!((l2_norm(&entry.embedding) - 1.0).abs() < 1e-5);
    }
    assert_eq!(l2_norm(&index.encode("")), 0.0);
    assert_eq!(l2_norm(&index.encode("!!! ???")), 0.0);
    assert_eq!(l2_norm(&index.encode("zzzqqq")), 0.0);
    // A phrase hit alone is enough for a non-zero vector.
    let no_vocab = VectorIndex::empty(IndexConfig::default());
    assert!((l2_norm(&no_vocab.encode("bảo hiểm")) - 1.0).abs() < 1e-5);
    assert_eq!(l2_norm(&no_vocab.encode("nhân viên")), 0.0);
}

#[test]
fn test_results_respect_permissions_bounds_and_order() {
    let index = index();
    let searcher = Searcher::new(&index);
    let users = [
        user("employee", &["policy", "rules", "basic_info"]),
        user("manager", &["policy", "rules", "basic_info", "salary", "team_info"]),
        user("nobody", &[]),
    ];

    for u in &users {
        for q in QUERIES {
            for top_k in [1, 2, 5] {
                for mode in [SearchMode::Smart, SearchMode::Standard, SearchMode::Strict] {
                    let outcome = searcher.search_mode(Some(u), q, top_k, mode).unwrap();
                    assert!(outcome.results.len() <= top_k);
                    assert!(outcome.total_found >= outcome.results.len());
                    assert_eq!(outcome.allowed_categories, u.allowed_categories);
                    for r in &outcome.results {
                        assert!(u.allowed_categories.contains(&r.metadata.category));
                        assert!((0.0..=1.0).contains(&r.similarity));
                        assert!(r.similarity >= mode.threshold());
                    }
                    for w in outcome.results.windows(2) {
                        assert!(w[0].similarity >= w[1].similarity);
                    }
                }
            }
        }
    }
}

#[test]
fn test_repeated_searches_are_identical() {
    let index = index();
    let searcher = Searcher::new(&index);
    let manager = user("manager", &["policy", "salary", "rules"]);
    let first = searcher.search(Some(&manager), "nghỉ phép lương", 5, 0.0).unwrap();
    for _ in 0..5 {
        let again = searcher.search(Some(&manager), "nghỉ phép lương", 5, 0.0).unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn test_empty_query_finds_nothing() {
    let index = index();
    let hr = user("hr", &["policy", "rules", "salary", "confidential"]);
    for q in ["", "   ", "?!."] {
        let outcome = Searcher::new(&index).search(Some(&hr), q, 5, 0.1).unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.total_found, 0);
        assert!(!outcome.is_error());
    }
}

#[test]
fn test_unknown_user_gets_error_marker() {
    let index = index();
    let outcome = Searcher::new(&index).smart_search(None, "nghỉ phép", 5).unwrap();
    assert_eq!(outcome.error.as_deref(), Some(USER_NOT_FOUND));
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.total_found, 0);
}

#[test]
fn test_no_overlap_yields_zero_results() {
    let index = index();
    let outsider = user("guest", &["team_info"]);
    let outcome = Searcher::new(&index)
        .search(Some(&outsider), "nghỉ phép", 5, 0.0)
        .unwrap();
    assert_eq!(outcome.total_found, 0);
    assert!(outcome.results.is_empty());
    assert!(!outcome.is_error());
}

#[test]
fn test_forbidden_chunks_never_take_result_slots() {
    let index = index();
    let employee = user("employee", &["policy", "rules"]);
    // The salary chunk is the best match but must not crowd out allowed hits.
    let outcome = Searcher::new(&index)
        .search(Some(&employee), "lương thưởng tháng 13", 1, 0.0)
        .unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_ne!(outcome.results[0].metadata.category, "salary");
}

#[test]
fn test_reloaded_index_answers_the_same() {
    let index = index();
    let mut buf = Vec::new();
    write_index(&index, &mut buf).unwrap();
    let restored = read_index(buf.as_slice()).unwrap();

    let manager = user("manager", &["policy", "salary", "rules"]);
    for q in QUERIES {
        let a = Searcher::new(&index).search(Some(&manager), q, 5, 0.0).unwrap();
        let b = Searcher::new(&restored).search(Some(&manager), q, 5, 0.0).unwrap();
        let ids_a: Vec<&str> = a.results.iter().map(|r| r.id.as_str()).collect();
        let ids_b: Vec<&str> = b.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(a.total_found, b.total_found);
    }
}

#[test]
fn test_concurrent_searches_share_one_snapshot() {
    let index = Arc::new(index());
    let expected = Searcher::new(&index)
        .search(Some(&user("employee", &["policy", "rules"])), "nghỉ phép", 5, 0.05)
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let employee = user("employee", &["policy", "rules"]);
                (0..20)
                    .map(|_| {
                        Searcher::new(&index)
                            .search(Some(&employee), "nghỉ phép", 5, 0.05)
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        for outcome in handle.join().unwrap() {
            assert_eq!(outcome, expected);
        }
    }
}
