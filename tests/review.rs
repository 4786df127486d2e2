use std::process::{Command, Output};

const PATCH: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1 +1,2 @@
 pub fn a() {}
+pub fn b() { loop {} }
";

fn lookout(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lookout"))
        .args(args)
        .current_dir(dir)
        .env_remove("GITHUB_REPOSITORY")
        .env_remove("PR_NUMBER")
        .env_remove("GITHUB_TOKEN")
        .env_remove("GH_TOKEN")
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

#[test]
fn local_diff_review_prints_sections() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::Regex("pub fn b".into()))
        .with_status(200)
        .with_body(
            r#"{"response":"Summary:\nAdds b.\n\nIssues Found:\n- b never returns\n\nSuggestions:\n- remove the loop","done":true}"#,
        )
        .create();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("change.patch"), PATCH).unwrap();

    let output = lookout(
        dir.path(),
        &[
            "--format",
            "json",
            "review",
            "--diff-file",
            "change.patch",
            "--endpoint",
            &server.url(),
        ],
    );

    assert!(
        output.status.success(),
        "review failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    mock.assert();

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["sections"].as_array().unwrap().len(), 3);
    assert_eq!(json["sections"][1]["body"], "- b never returns");
    assert_eq!(json["prompt"]["filesIncluded"], 1);
    assert!(json["posting"].is_null());
}

#[test]
fn unreachable_model_exits_one_naming_the_stage() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("change.patch"), PATCH).unwrap();

    let output = lookout(
        dir.path(),
        &["review", "--diff-file", "change.patch", "--endpoint", &endpoint],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("model stage"), "stderr: {stderr}");
}

#[test]
fn missing_pull_request_reference_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let output = lookout(dir.path(), &["review"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no repository given"), "stderr: {stderr}");
}

#[test]
fn missing_diff_file_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let output = lookout(dir.path(), &["review", "--diff-file", "nope.patch"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope.patch"));
}
