use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

fn docrag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docrag");
    path
}

fn setup_test_env(generation: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt covers cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("nested/beta.md"),
        "# Beta Document\n\nThis document discusses rivers and mountains.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma notes about the weather.\x0cParis is the capital of France.\n",
    )
    .unwrap();
    fs::write(files_dir.join("ignored.png"), b"\x89PNG").unwrap();

    let config_content = format!(
        r#"[store]
uri = "{}/data/docrag.sqlite"

[chunking]
max_tokens = 64

[embedding]
provider = "hash"
dims = 64

{}
"#,
        root.display(),
        generation
    );

    let config_path = config_dir.join("docrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn files_dir(config_path: &Path) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("files").display().to_string()
}

#[test]
fn test_ingest_directory() {
    let (_tmp, config_path) = setup_test_env("");
    let files = files_dir(&config_path);

    let (stdout, stderr, success) = run_docrag(&config_path, &["ingest", &files]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 3"), "{}", stdout);
    assert!(stdout.contains("dims: 64"));
    assert!(stdout.contains("entries written:"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_ingest_dry_run() {
    let (tmp, config_path) = setup_test_env("");
    let files = files_dir(&config_path);

    let (stdout, _, success) = run_docrag(&config_path, &["ingest", &files, "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("documents: 3"));
    assert!(!stdout.contains("dims:"));
    assert!(!tmp.path().join("data/docrag.sqlite").exists());
}

#[test]
fn test_overwrite_and_append_conflict() {
    let (_tmp, config_path) = setup_test_env("");
    let files = files_dir(&config_path);

    let (_, _, success) = run_docrag(&config_path, &["ingest", &files, "--overwrite", "--append"]);
    assert!(!success, "--overwrite and --append must be exclusive");
}

#[test]
fn test_stats_after_ingest() {
    let (_tmp, config_path) = setup_test_env("");
    let files = files_dir(&config_path);

    let (stdout, _, _) = run_docrag(&config_path, &["stats"]);
    assert!(stdout.contains("not built yet"), "{}", stdout);

    run_docrag(&config_path, &["ingest", &files]);
    let (stdout, stderr, success) = run_docrag(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Dimension:   64"), "{}", stdout);
    assert!(stdout.contains("hash-64"));
    assert!(stdout.contains("alpha.md"));
    assert!(stdout.contains("gamma.txt"));
}

#[test]
fn test_append_accumulates() {
    let (_tmp, config_path) = setup_test_env("");
    let files = files_dir(&config_path);
    let alpha = format!("{}/alpha.md", files);

    run_docrag(&config_path, &["ingest", &alpha]);
    run_docrag(&config_path, &["ingest", &alpha, "--append"]);
    let (stdout, _, _) = run_docrag(&config_path, &["stats"]);
    assert!(stdout.contains("Entries:     4"), "{}", stdout);

    run_docrag(&config_path, &["ingest", &alpha]);
    let (stdout, _, _) = run_docrag(&config_path, &["stats"]);
    assert!(stdout.contains("Entries:     2"), "{}", stdout);
}

#[test]
fn test_chunks_shows_pages() {
    let (_tmp, config_path) = setup_test_env("");
    let gamma = format!("{}/gamma.txt", files_dir(&config_path));

    let (stdout, stderr, success) = run_docrag(&config_path, &["chunks", &gamma]);
    assert!(success, "chunks failed: {}", stderr);
    assert!(stdout.contains("[gamma.txt#0] page=1"), "{}", stdout);
    assert!(stdout.contains("[gamma.txt#1] page=2"), "{}", stdout);
    assert!(stdout.contains("1 documents, 2 chunks (structured)"));

    let (stdout, _, success) =
        run_docrag(&config_path, &["chunks", &gamma, "--export-mode", "plain_text"]);
    assert!(success);
    assert!(stdout.contains("page=-"));
    assert!(stdout.contains("(plain_text)"));
}

#[test]
fn test_query_without_store_fails() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_docrag(&config_path, &["query", "Anything?"]);
    assert!(!success);
    assert!(stderr.contains("index is empty"), "{}", stderr);
}

#[test]
fn test_missing_source_fails() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_docrag(&config_path, &["ingest", "/no/such/dir"]);
    assert!(!success);
    assert!(stderr.contains("source unreachable"), "{}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = setup_test_env("[retrieval]\ntop_k = 0");

    let (_, stderr, success) = run_docrag(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("retrieval.top_k"), "{}", stderr);
}

async fn ollama_generate(Json(body): Json<Value>) -> Json<Value> {
    let prompt = body["prompt"].as_str().unwrap_or_default();
    let response = if prompt.contains("Paris is the capital of France") {
        "Paris."
    } else {
        "I don't know."
    };
    Json(json!({ "model": body["model"], "response": response, "done": true }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_query_answers_with_sources() {
    let app = Router::new().route("/api/generate", post(ollama_generate));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let generation = format!(
        "[generation]\nprovider = \"ollama\"\nmodel = \"stub\"\nurl = \"http://{}\"\ntimeout_secs = 5",
        addr
    );
    let (_tmp, config_path) = setup_test_env(&generation);
    let files = files_dir(&config_path);

    let (stdout, stdout_json) = tokio::task::spawn_blocking(move || {
        let (_, stderr, success) = run_docrag(&config_path, &["ingest", &files]);
        assert!(success, "ingest failed: {}", stderr);

        let (stdout, stderr, success) = run_docrag(
            &config_path,
            &["query", "What is the capital of France?", "--top-k", "1"],
        );
        assert!(success, "query failed: {}", stderr);

        let (stdout_json, _, success) = run_docrag(
            &config_path,
            &["query", "What is the capital of France?", "--top-k", "2", "--json"],
        );
        assert!(success);
        (stdout, stdout_json)
    })
    .await
    .unwrap();

    assert!(stdout.starts_with("Paris."), "{}", stdout);
    assert!(stdout.contains("1. gamma.txt p.2"), "{}", stdout);

    let parsed: Value = serde_json::from_str(&stdout_json).unwrap();
    assert_eq!(parsed["answer"], "Paris.");
    assert_eq!(parsed["sources"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["sources"][0]["metadata"]["page"], 2);
}
