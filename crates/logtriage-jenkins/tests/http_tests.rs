//! Drives `JenkinsClient` against a canned HTTP/1.1 responder on localhost.

use logtriage_core::{
    BuildRef, BuildSource, JenkinsConfig, LogSource, StageStatus, TestStatus, TriageError,
};
use logtriage_jenkins::JenkinsClient;
use logtriage_logs::LogFetcher;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct Reply {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
    /// Content-Length to announce when it differs from the bytes sent.
    announced: Option<usize>,
}

impl Reply {
    fn json(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type", "application/json".to_string())],
            body: body.as_bytes().to_vec(),
            announced: None,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            announced: None,
        }
    }
}

type Handler = dyn Fn(&str, &str) -> Option<Reply> + Send + Sync;

/// Seen request lines and Authorization headers.
#[derive(Default)]
struct Seen {
    targets: Vec<String>,
    auth: Vec<Option<String>>,
}

async fn serve(handler: Arc<Handler>) -> (SocketAddr, Arc<Mutex<Seen>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Seen::default()));
    let seen_by_server = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let handler = handler.clone();
            let seen = seen_by_server.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf).to_string();
                let target = head
                    .lines()
                    .next()
                    .and_then(|l| l.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                let auth = head
                    .lines()
                    .find(|l| l.to_ascii_lowercase().starts_with("authorization:"))
                    .map(|l| l["authorization:".len()..].trim().to_string());
                {
                    let mut seen = seen.lock().unwrap();
                    seen.targets.push(target.clone());
                    seen.auth.push(auth);
                }

                let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
                let Some(reply) = handler(path, query) else {
                    // Hang without answering.
                    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                    return;
                };
                let mut response = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reply.announced.unwrap_or(reply.body.len())
                );
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str("\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&reply.body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen)
}

fn client(addr: SocketAddr, user: Option<&str>, token: Option<&str>) -> JenkinsClient {
    JenkinsClient::from_config(&JenkinsConfig {
        url: format!("http://{}/", addr),
        user: user.map(str::to_string),
        api_token: token.map(str::to_string),
        timeout_secs: 1,
    })
    .unwrap()
}

const LOG: &str = "Started by user ci\n[Pipeline] stage\nERROR: boom\n";

fn progressive(path: &str, query: &str) -> Option<Reply> {
    if path != "/job/team/job/app/7/logText/progressiveText" {
        return Some(Reply::status(404));
    }
    let start: usize = query
        .strip_prefix("start=")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    // Jenkins treats a start past the end as rolled-over text and restarts at 0.
    let start = if start > LOG.len() { 0 } else { start };
    Some(Reply {
        status: 200,
        headers: vec![
            ("X-Text-Size", LOG.len().to_string()),
            ("X-More-Data", "true".to_string()),
        ],
        body: LOG.as_bytes()[start..].to_vec(),
        announced: None,
    })
}

#[tokio::test]
async fn progressive_text_headers_and_auth() {
    let (addr, seen) = serve(Arc::new(progressive)).await;
    let jenkins = client(addr, Some("ci"), Some("s3cret"));

    let chunk = jenkins
        .read_log(&BuildRef::new("team/app", 7), 10)
        .await
        .unwrap();
    assert_eq!(chunk.data, LOG.as_bytes()[10..].to_vec());
    assert_eq!(chunk.text_size, LOG.len() as u64);
    assert!(chunk.more_data);

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen.targets[0],
        "/job/team/job/app/7/logText/progressiveText?start=10"
    );
    assert_eq!(seen.auth[0].as_deref(), Some("Basic Y2k6czNjcmV0"));
}

#[tokio::test]
async fn anonymous_requests_send_no_credentials() {
    let (addr, seen) = serve(Arc::new(progressive)).await;
    let jenkins = client(addr, None, None);
    assert_eq!(
        jenkins.log_length(&BuildRef::new("team/app", 7)).await.unwrap(),
        LOG.len() as u64
    );
    assert_eq!(seen.lock().unwrap().auth[0], None);
}

#[tokio::test]
async fn rolled_over_start_reads_as_end_of_log() {
    let (addr, _) = serve(Arc::new(progressive)).await;
    let jenkins = Arc::new(client(addr, None, None));
    let build = BuildRef::new("team/app", 7);

    let chunk = jenkins.read_log(&build, 1000).await.unwrap();
    assert_eq!(chunk.data, LOG.as_bytes().to_vec());

    let fetcher = LogFetcher::new(jenkins, std::time::Duration::from_secs(1));
    let window = fetcher.fetch(&build, 1000, 100).await.unwrap();
    assert!(window.data.is_empty());
    assert_eq!(window.start_offset, 1000);
    assert_eq!(window.end_offset, 1000);
    assert!(!window.has_more);

    let tail = fetcher.fetch_tail(&build, 12).await.unwrap();
    assert_eq!(tail.text(), "ERROR: boom\n");
}

#[tokio::test]
async fn log_length_reads_only_the_header() {
    // Announces a large body, sends a few bytes and hangs up.
    let (addr, _) = serve(Arc::new(|_: &str, _: &str| {
        Some(Reply {
            status: 200,
            headers: vec![("X-Text-Size", "1048576".to_string())],
            body: b"head of a long log".to_vec(),
            announced: Some(1_048_576),
        })
    }))
    .await;
    let jenkins = client(addr, None, None);
    let build = BuildRef::new("app", 3);

    assert_eq!(jenkins.log_length(&build).await.unwrap(), 1_048_576);
    assert!(jenkins.read_log(&build, 0).await.is_err());
}

#[tokio::test]
async fn missing_build_is_not_found() {
    let (addr, _) = serve(Arc::new(progressive)).await;
    let err = client(addr, None, None)
        .read_log(&BuildRef::new("team/app", 8), 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn server_errors_keep_status() {
    let (addr, _) = serve(Arc::new(|_: &str, _: &str| Some(Reply::status(503)))).await;
    let err = client(addr, None, None)
        .build_metadata(&BuildRef::new("app", 1))
        .await
        .unwrap_err();
    match err {
        TriageError::UpstreamUnavailable { status, .. } => assert_eq!(status, Some(503)),
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn stalled_server_times_out() {
    let (addr, _) = serve(Arc::new(|_: &str, _: &str| None)).await;
    let err = client(addr, None, None)
        .read_log(&BuildRef::new("app", 1), 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
}

const BUILD_JSON: &str = r#"{
    "number": 12, "result": "UNSTABLE", "building": false, "duration": 4200,
    "changeSets": [{"items": [{"commitId": "abc123", "author": {"fullName": "Sam"},
        "msg": "fix", "affectedPaths": ["src/lib.rs"]}]}]
}"#;

#[tokio::test]
async fn metadata_without_pipeline_stages() {
    let (addr, _) = serve(Arc::new(|path: &str, _: &str| match path {
        "/job/app/12/api/json" => Some(Reply::json(BUILD_JSON)),
        _ => Some(Reply::status(404)),
    }))
    .await;
    let jenkins = client(addr, None, None);
    let build = BuildRef::new("app", 12);

    let meta = jenkins.build_metadata(&build).await.unwrap();
    assert_eq!(meta.result, "UNSTABLE");
    assert_eq!(meta.duration_ms, 4200);
    assert!(meta.stages.is_empty());

    let changes = jenkins.scm_changes(&build).await.unwrap();
    assert_eq!(changes[0].commit_id, "abc123");

    assert!(jenkins.test_records(&build).await.unwrap().is_empty());
}

#[tokio::test]
async fn metadata_with_stages_and_tests() {
    let (addr, _) = serve(Arc::new(|path: &str, _: &str| match path {
        "/job/app/12/api/json" => Some(Reply::json(BUILD_JSON)),
        "/job/app/12/wfapi/describe" => Some(Reply::json(
            r#"{"stages": [{"name": "Test", "status": "UNSTABLE", "durationMillis": 3000}]}"#,
        )),
        "/job/app/12/testReport/api/json" => Some(Reply::json(
            r#"{"suites": [{"cases": [{"className": "A", "name": "b", "duration": 1.5, "status": "FAILED"}]}]}"#,
        )),
        _ => Some(Reply::status(404)),
    }))
    .await;
    let jenkins = client(addr, None, None);
    let build = BuildRef::new("app", 12);

    let meta = jenkins.build_metadata(&build).await.unwrap();
    assert_eq!(meta.stages[0].status, StageStatus::Unstable);

    let tests = jenkins.test_records(&build).await.unwrap();
    assert_eq!(tests[0].name, "A.b");
    assert_eq!(tests[0].status, TestStatus::Fail);
    assert_eq!(tests[0].duration_ms, Some(1500));
}

#[tokio::test]
async fn build_listing() {
    let (addr, seen) = serve(Arc::new(|path: &str, query: &str| {
        if path != "/job/app/api/json" {
            return Some(Reply::status(404));
        }
        if query.contains("lastBuild") {
            Some(Reply::json(r#"{"lastBuild": {"number": 31}}"#))
        } else {
            Some(Reply::json(
                r#"{"builds": [{"number": 29}, {"number": 31}, {"number": 30}]}"#,
            ))
        }
    }))
    .await;
    let jenkins = client(addr, None, None);

    assert_eq!(jenkins.recent_builds("app", 3).await.unwrap(), vec![31, 30, 29]);
    assert_eq!(jenkins.last_build_number("app").await.unwrap(), 31);
    assert!(seen.lock().unwrap().targets[0].contains("tree="));

    let err = jenkins.last_build_number("nope").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
