use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lookout_core::{
    ChangedFile, FileStatus, LookoutError, PrRef, PullRequestDiff, ReviewConfig, RunStatus,
    SectionLabel,
};
use lookout_review::github::{GitHubClient, HostingApi};
use lookout_review::llm::ModelBackend;
use lookout_review::pipeline::ReviewPipeline;

const THREE_SECTIONS: &str =
    "Summary:\nAdds retries.\n\nIssues Found:\n- unbounded loop\n\nSuggestions:\n- cap attempts";

enum Fetch {
    Ok,
    NotFound,
}

struct FakeHosting {
    fetch: Fetch,
    fail_posts: Vec<usize>,
    posts: Mutex<Vec<String>>,
}

impl FakeHosting {
    fn new(fetch: Fetch, fail_posts: Vec<usize>) -> Arc<Self> {
        Arc::new(Self {
            fetch,
            fail_posts,
            posts: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostingApi for FakeHosting {
    async fn fetch_pull_request(&self, pr: &PrRef) -> Result<PullRequestDiff, LookoutError> {
        match self.fetch {
            Fetch::Ok => Ok(PullRequestDiff {
                pr: pr.clone(),
                title: "Add retries".into(),
                body: None,
                files: vec![ChangedFile {
                    path: "src/net.rs".into(),
                    status: FileStatus::Modified,
                    additions: 2,
                    deletions: 0,
                    patch: Some("@@ -1 +1,3 @@\n fn send() {}\n+loop {}\n+fn retry() {}\n".into()),
                }],
            }),
            Fetch::NotFound => Err(LookoutError::NotFound(format!("pull request {pr}"))),
        }
    }

    async fn post_comment(&self, _pr: &PrRef, body: &str) -> Result<(), LookoutError> {
        let mut posts = self.posts.lock().unwrap();
        let index = posts.len();
        posts.push(body.to_string());
        if self.fail_posts.contains(&index) {
            return Err(LookoutError::GitHub("502 Bad Gateway".into()));
        }
        Ok(())
    }
}

enum Reply {
    Text(&'static str),
    Timeout,
}

struct FakeModel {
    reply: Reply,
    calls: AtomicUsize,
}

impl FakeModel {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ModelBackend for FakeModel {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LookoutError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(prompt.contains("--- File: src/net.rs (modified) ---"));
        match self.reply {
            Reply::Text(text) => Ok(text.to_string()),
            Reply::Timeout => Err(LookoutError::Timeout { timeout_ms: 60_000 }),
        }
    }
}

fn pr() -> PrRef {
    "octocat/hello#7".parse().unwrap()
}

fn pipeline(hosting: Arc<FakeHosting>, model: Arc<FakeModel>) -> ReviewPipeline {
    ReviewPipeline::new(hosting, model, &ReviewConfig::default())
}

#[tokio::test]
async fn all_sections_posted_in_order() {
    let hosting = FakeHosting::new(Fetch::Ok, vec![]);
    let model = FakeModel::new(Reply::Text(THREE_SECTIONS));

    let outcome = pipeline(hosting.clone(), model).run(&pr(), false).await.unwrap();

    let report = outcome.posting.as_ref().unwrap();
    assert_eq!(report.status(), RunStatus::Complete);
    assert_eq!(
        report.posted,
        vec![
            SectionLabel::Summary,
            SectionLabel::IssuesFound,
            SectionLabel::Suggestions
        ]
    );
    let posts = hosting.attempts();
    assert!(posts[0].contains("Adds retries."));
    assert!(posts[1].contains("- unbounded loop"));
    assert!(posts[2].contains("- cap attempts"));
    assert!(posts.iter().all(|p| p.contains("fake-model")));
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn missing_pr_never_invokes_model() {
    let hosting = FakeHosting::new(Fetch::NotFound, vec![]);
    let model = FakeModel::new(Reply::Text(THREE_SECTIONS));

    let err = pipeline(hosting.clone(), model.clone())
        .run(&pr(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, LookoutError::NotFound(_)));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert!(hosting.attempts().is_empty());
}

#[tokio::test]
async fn model_timeout_posts_nothing() {
    let hosting = FakeHosting::new(Fetch::Ok, vec![]);
    let model = FakeModel::new(Reply::Timeout);

    let err = pipeline(hosting.clone(), model.clone())
        .run(&pr(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, LookoutError::Timeout { .. }));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert!(hosting.attempts().is_empty());
}

#[tokio::test]
async fn failed_second_post_is_skipped_and_third_attempted() {
    let hosting = FakeHosting::new(Fetch::Ok, vec![1]);
    let model = FakeModel::new(Reply::Text(THREE_SECTIONS));

    let outcome = pipeline(hosting.clone(), model).run(&pr(), false).await.unwrap();

    assert_eq!(hosting.attempts().len(), 3);
    let report = outcome.posting.as_ref().unwrap();
    assert_eq!(
        report.posted,
        vec![SectionLabel::Summary, SectionLabel::Suggestions]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].label, SectionLabel::IssuesFound);
    assert!(report.failures[0].reason.contains("502"));
    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(outcome.exit_code(), 2);
}

#[tokio::test]
async fn dry_run_posts_nothing() {
    let hosting = FakeHosting::new(Fetch::Ok, vec![]);
    let model = FakeModel::new(Reply::Text(THREE_SECTIONS));

    let outcome = pipeline(hosting.clone(), model).run(&pr(), true).await.unwrap();

    assert_eq!(outcome.sections.len(), 3);
    assert!(outcome.posting.is_none());
    assert!(hosting.attempts().is_empty());
}

#[tokio::test]
async fn empty_sections_are_not_posted() {
    let hosting = FakeHosting::new(Fetch::Ok, vec![]);
    let model = FakeModel::new(Reply::Text("Summary:\nFine.\nIssues Found:\n\nSuggestions:\n- none"));

    let outcome = pipeline(hosting.clone(), model).run(&pr(), false).await.unwrap();

    assert_eq!(outcome.sections.len(), 3);
    assert_eq!(hosting.attempts().len(), 2);
    let report = outcome.posting.unwrap();
    assert_eq!(
        report.posted,
        vec![SectionLabel::Summary, SectionLabel::Suggestions]
    );
}

#[tokio::test]
async fn unstructured_reply_posted_as_other() {
    let hosting = FakeHosting::new(Fetch::Ok, vec![]);
    let model = FakeModel::new(Reply::Text("Looks good to me."));

    let outcome = pipeline(hosting.clone(), model).run(&pr(), false).await.unwrap();

    assert_eq!(outcome.posting.unwrap().posted, vec![SectionLabel::Other]);
    assert!(hosting.attempts()[0].contains("Looks good to me."));
}

#[tokio::test]
async fn github_client_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    let pull = server
        .mock("GET", "/repos/octocat/hello/pulls/7")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_body(r#"{"title":"Add retries","body":""}"#)
        .create_async()
        .await;
    let files = server
        .mock("GET", "/repos/octocat/hello/pulls/7/files")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("per_page".into(), "100".into()),
            mockito::Matcher::UrlEncoded("page".into(), "1".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"[{"filename":"src/net.rs","status":"modified","additions":2,"deletions":0,
                "patch":"@@ -1 +1,3 @@\n fn send() {}\n+loop {}\n+fn retry() {}\n"}]"#,
        )
        .create_async()
        .await;
    let comments = server
        .mock("POST", "/repos/octocat/hello/issues/7/comments")
        .with_status(201)
        .with_body(r#"{"id":1}"#)
        .expect(3)
        .create_async()
        .await;

    let client = Arc::new(GitHubClient::new("test-token", &server.url()).unwrap());
    let model = FakeModel::new(Reply::Text(THREE_SECTIONS));
    let pipeline = ReviewPipeline::new(client, model, &ReviewConfig::default());

    let outcome = pipeline.run(&pr(), false).await.unwrap();

    pull.assert_async().await;
    files.assert_async().await;
    comments.assert_async().await;
    assert_eq!(outcome.title, "Add retries");
    assert_eq!(outcome.posting.unwrap().status(), RunStatus::Complete);
}

fn files_page(names: impl Iterator<Item = String>) -> String {
    let entries: Vec<_> = names
        .map(|name| {
            serde_json::json!({
                "filename": name,
                "status": "modified",
                "additions": 1,
                "deletions": 0,
                "patch": "@@ -1 +1,2 @@\n a\n+b\n",
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

fn files_query(page: &str) -> mockito::Matcher {
    mockito::Matcher::AllOf(vec![
        mockito::Matcher::UrlEncoded("per_page".into(), "100".into()),
        mockito::Matcher::UrlEncoded("page".into(), page.into()),
    ])
}

#[tokio::test]
async fn github_client_reads_files_until_short_page() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/repos/octocat/hello/pulls/7")
        .with_status(200)
        .with_body(r#"{"title":"Big change","body":null}"#)
        .create_async()
        .await;
    let first = server
        .mock("GET", "/repos/octocat/hello/pulls/7/files")
        .match_query(files_query("1"))
        .with_status(200)
        .with_body(files_page((0..100).map(|i| format!("src/f{i:03}.rs"))))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/repos/octocat/hello/pulls/7/files")
        .match_query(files_query("2"))
        .with_status(200)
        .with_body(files_page((100..103).map(|i| format!("src/f{i:03}.rs"))))
        .expect(1)
        .create_async()
        .await;
    let third = server
        .mock("GET", "/repos/octocat/hello/pulls/7/files")
        .match_query(files_query("3"))
        .with_status(200)
        .with_body("[]")
        .expect(0)
        .create_async()
        .await;

    let client = GitHubClient::new("test-token", &server.url()).unwrap();
    let diff = client.fetch_pull_request(&pr()).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
    assert_eq!(diff.title, "Big change");
    assert_eq!(diff.files.len(), 103);
    let expected: Vec<String> = (0..103).map(|i| format!("src/f{i:03}.rs")).collect();
    let paths: Vec<String> = diff.files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, expected);
}

#[tokio::test]
async fn github_not_found_maps_to_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/repos/octocat/hello/pulls/7")
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    let client = Arc::new(GitHubClient::new("test-token", &server.url()).unwrap());
    let model = FakeModel::new(Reply::Text(THREE_SECTIONS));
    let err = ReviewPipeline::new(client, model.clone(), &ReviewConfig::default())
        .run(&pr(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, LookoutError::NotFound(_)));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}
