use reqwest::StatusCode;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

use rolesearch::config::parse_config;
use rolesearch::db;
use rolesearch::index_store::{build_index, IndexHandle};
use rolesearch::migrate::{run_migrations, seed_default_roles, seed_sample_users};
use rolesearch::server::{serve, AppState};
use rolesearch::users::UserStore;

const CORPUS: &str = r#"[
  { "id": "leave_000", "document_id": "leave", "category": "policy",
    "title": "Chính sách nghỉ phép", "allowed_roles": ["employee", "manager", "hr", "admin"],
    "content": "Nhân viên chính thức được nghỉ phép 12 ngày mỗi năm. Đơn nghỉ phép gửi trước 3 ngày làm việc." },
  { "id": "pay_000", "document_id": "pay", "category": "salary",
    "title": "Quy chế lương thưởng", "allowed_roles": ["manager", "hr", "admin"],
    "content": "Lương thưởng tháng 13 được chi trả vào tháng 1 hằng năm theo hiệu suất." },
  { "id": "ins_000", "document_id": "ins", "category": "confidential",
    "title": "Hợp đồng bảo hiểm", "allowed_roles": ["hr", "admin"],
    "content": "Hợp đồng bảo hiểm sức khỏe cho nhân viên và người thân, chi phí do công ty chi trả." }
]"#;

struct TestServer {
    tmp: TempDir,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

/// Start a server on an ephemeral port. `extra` is appended to the config.
async fn start_server(extra: &str) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::write(root.join("chunks.json"), CORPUS).unwrap();

    let toml = format!(
        r#"[db]
path = "{root}/users.sqlite"

[corpus]
path = "{root}/chunks.json"

[index]
path = "{root}/index.json"

{extra}
"#,
        root = root.display(),
        extra = extra
    );
    let config = parse_config(&toml).unwrap();

    let pool = db::connect(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    seed_default_roles(&pool).await.unwrap();
    seed_sample_users(&pool).await.unwrap();
    let store = UserStore::new(pool);

    let index = IndexHandle::new(build_index(&config).unwrap());
    let state = AppState::new(config, store, index);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state));

    TestServer {
        tmp,
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
    }
}

fn result_ids(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let server = start_server("").await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["total_users"], 6);
    assert_eq!(body["total_documents"], 3);
    assert_eq!(body["vector_dim"], 300);
}

#[tokio::test]
async fn test_get_user() {
    let server = start_server("").await;

    let (status, body) = server.get("/user/user005").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "hr");
    assert!(body["allowed_categories"]
        .as_array()
        .unwrap()
        .contains(&json!("confidential")));

    let (status, body) = server.get("/user/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_search_filters_by_role() {
    let server = start_server("").await;
    let query = "lương thưởng tháng 13";

    let (status, body) = server
        .post(
            "/search",
            json!({"user_id": "user001", "query": query, "similarity_threshold": 0.0}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!result_ids(&body).contains(&"pay_000".to_string()));
    assert_eq!(body["user_info"]["role"], "employee");
    for result in body["results"].as_array().unwrap() {
        assert_ne!(result["category"], "salary");
        assert_ne!(result["category"], "confidential");
    }

    let (status, body) = server
        .post("/search", json!({"user_id": "user003", "query": query}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_ids(&body)[0], "pay_000");
    assert_eq!(body["results"][0]["metadata"]["title"], "Quy chế lương thưởng");
    assert_eq!(body["similarity_range"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_smart_and_strict_search() {
    let server = start_server("").await;
    let body = json!({"user_id": "user005", "query": "nghỉ phép", "similarity_threshold": 0.99});

    let (status, smart) = server.post("/smart-search", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(result_ids(&smart).contains(&"leave_000".to_string()));

    let (status, strict) = server.post("/strict-search", body).await;
    assert_eq!(status, StatusCode::OK);
    for result in strict["results"].as_array().unwrap() {
        assert!(result["similarity"].as_f64().unwrap() >= 0.3 - 1e-6);
    }
    assert!(strict["total_found"].as_u64().unwrap() <= smart["total_found"].as_u64().unwrap());
}

#[tokio::test]
async fn test_search_unknown_user() {
    let server = start_server("").await;
    let (status, body) = server
        .post("/search", json!({"user_id": "ghost", "query": "nghỉ phép"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "user not found: ghost");
}

#[tokio::test]
async fn test_search_provisions_user() {
    let server = start_server("").await;
    let (status, body) = server
        .post(
            "/search",
            json!({
                "user_id": "user900",
                "query": "lương thưởng",
                "user_info": {"username": "Đỗ Thị F", "role": "manager"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_info"]["role"], "manager");

    let (status, body) = server.get("/user/user900").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "Đỗ Thị F");
}

#[tokio::test]
async fn test_fallback_role() {
    let server = start_server("[server]\nfallback_role = \"employee\"").await;
    let (status, body) = server
        .post("/search", json!({"user_id": "walk-in", "query": "lương thưởng tháng 13"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_info"]["role"], "employee");
    assert!(!result_ids(&body).contains(&"pay_000".to_string()));
}

#[tokio::test]
async fn test_zero_top_k_rejected() {
    let server = start_server("").await;
    let (status, body) = server
        .post(
            "/search",
            json!({"user_id": "user001", "query": "nghỉ phép", "top_k": 0}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_rate_limit() {
    let server = start_server("[rate_limit]\nrequests_per_minute = 2").await;
    let body = json!({"user_id": "user001", "query": "nghỉ phép"});

    for _ in 0..2 {
        let (status, _) = server.post("/search", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, err) = server.post("/search", body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err["error"]["code"], "rate_limited");
    assert_eq!(err["error"]["limit"], 2);
    assert_eq!(err["error"]["remaining_requests"], 0);

    // Other users have their own window.
    let (status, _) = server
        .post("/search", json!({"user_id": "user002", "query": "nghỉ phép"}))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_required() {
    let server = start_server("[server]\napi_keys = [\"s3cret\"]").await;

    let (status, _) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.get("/users").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let resp = server
        .client
        .get(server.url("/users"))
        .header("X-API-Key", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = server
        .client
        .get(server.url("/users"))
        .header("X-API-Key", "s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total_users"], 6);
}

#[tokio::test]
async fn test_chat() {
    let server = start_server("").await;

    let (status, body) = server
        .post("/chat", json!({"user_id": "user001", "message": "nghỉ phép"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["source"], "Chính sách nghỉ phép");
    assert_eq!(body["category"], "policy");
    assert!(body["confidence"].as_f64().unwrap() > 0.0);
    assert!(body["response"].as_str().unwrap().contains("*Nguồn: policy*"));

    let (status, body) = server
        .post("/chat", json!({"user_id": "user001", "message": "xyzzy"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["total_results"], 0);
    assert!(body["source"].is_null());

    let (status, body) = server
        .post("/chat", json!({"user_id": "ghost", "message": "nghỉ phép"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_categories_and_index_info() {
    let server = start_server("").await;

    let (status, body) = server.get("/categories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_roles"], 4);
    assert_eq!(body["roles"]["admin"]["category_count"], 7);
    assert!(body["roles"]["employee"]["allowed_categories"]
        .as_array()
        .unwrap()
        .contains(&json!("policy")));

    let (status, body) = server.get("/index-info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_documents"], 3);
    assert_eq!(
        body["categories"],
        json!(["confidential", "policy", "salary"])
    );
}

#[tokio::test]
async fn test_reindex_picks_up_new_chunks() {
    let server = start_server("").await;
    let corpus_path = server.tmp.path().join("chunks.json");

    let mut chunks: Value = serde_json::from_str(CORPUS).unwrap();
    chunks.as_array_mut().unwrap().push(json!({
        "id": "remote_000", "document_id": "remote", "category": "policy",
        "title": "Làm việc từ xa", "allowed_roles": ["employee"],
        "content": "Nhân viên được làm việc từ xa hai ngày mỗi tuần."
    }));
    fs::write(&corpus_path, serde_json::to_string(&chunks).unwrap()).unwrap();

    let (status, body) = server.post("/admin/reindex", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["total_documents"], 4);

    let (_, body) = server
        .post("/search", json!({"user_id": "user001", "query": "làm việc từ xa"}))
        .await;
    assert!(result_ids(&body).contains(&"remote_000".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_reindex_requests() {
    let server = start_server("").await;

    let first = server.post("/admin/reindex", json!({}));
    let second = server.post("/admin/reindex", json!({}));
    let ((status_a, body_a), (status_b, body_b)) = tokio::join!(first, second);
    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    assert_eq!(body_a["total_documents"], 3);
    assert_eq!(body_b["total_documents"], 3);

    let saved = rolesearch::index_store::read_index_file(&server.tmp.path().join("index.json"))
        .unwrap();
    assert_eq!(saved.size(), 3);
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

// Single-threaded runtime so the server tasks log through this thread's
// subscriber.
#[tokio::test(flavor = "current_thread")]
async fn test_requests_are_logged() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = start_server("").await;
    let (status, _) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server.get("/user/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server
        .post("/chat", json!({"user_id": "user001", "message": "nghỉ phép"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let output = logs.contents();
    assert!(output.contains("request served"), "{}", output);
    assert!(output.contains("path=/health"), "{}", output);
    assert!(output.contains("status=200"), "{}", output);
    assert!(output.contains("path=/user/ghost"), "{}", output);
    assert!(output.contains("status=404"), "{}", output);
    assert!(output.contains("elapsed_ms="), "{}", output);
    assert!(output.contains("chat reply"), "{}", output);
    assert!(output.contains("user=user001"), "{}", output);
}
