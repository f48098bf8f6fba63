//! Test doubles: an in-process widget API, a scripted prompter and a
//! bundler that never shells out.

use crate::bundler::{BuildEvent, BuildEvents, BuildJob, Bundler};
use crate::prompt::Prompter;
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// One request received by [`StubServer`]
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: Method,
    /// Path with the `/api/v1` prefix removed
    pub path: String,
    pub body: Value,
}

#[derive(Default)]
struct StubState {
    host: String,
    packages: HashMap<String, Value>,
    history: HashMap<String, Value>,
    failures: HashMap<String, (String, i64)>,
    fail_uploads: bool,
    hits: Vec<Hit>,
    next_token: usize,
    next_package: usize,
    uploads: HashMap<String, Vec<u8>>,
}

type Shared = Arc<Mutex<StubState>>;

/// Widget API stand-in bound to `127.0.0.1:0`.
///
/// Knows the package `wpkDeveloper` until told otherwise. Signed upload
/// URLs point back at the stub under `/upload/{token}`.
pub struct StubServer {
    state: Shared,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let addr = listener.local_addr().expect("stub server address");

        let mut state = StubState {
            host: format!("http://{}", addr),
            ..StubState::default()
        };
        state.packages.insert(
            "wpkDeveloper".into(),
            json!({
                "packageId": "wpkDeveloper",
                "spaceId": "spcTest",
                "name": "Developer Widget",
                "status": 3,
                "packageType": 0,
                "releaseType": 0,
                "version": "1.0.0",
                "authorName": null
            }),
        );
        state.history.insert(
            "wpkDeveloper".into(),
            json!([
                {
                    "releaseSha": "5d41402abc4b2a76b9719d911017c592",
                    "version": "1.0.0",
                    "releaseCodeBundle": "widget/wpkDeveloper/1.0.0/widget_bundle.prod.js",
                    "sourceCodeBundle": null,
                    "status": 1
                },
                {
                    "releaseSha": "7d793037a0760186574b0282f2f435e7",
                    "version": "0.9.0",
                    "releaseCodeBundle": null,
                    "sourceCodeBundle": null,
                    "status": 2
                }
            ]),
        );

        let state = Arc::new(Mutex::new(state));
        let app = Router::new().fallback(handle).with_state(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { state, task }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().expect("stub state poisoned")
    }

    pub fn host(&self) -> String {
        self.lock().host.clone()
    }

    /// Answer `path` (without `/api/v1`) with `success: false`
    pub fn fail(&self, path: &str, message: &str, code: i64) {
        self.lock()
            .failures
            .insert(path.to_string(), (message.to_string(), code));
    }

    /// Reject every direct upload with HTTP 500
    pub fn fail_uploads(&self) {
        self.lock().fail_uploads = true;
    }

    pub fn remove_package(&self, package_id: &str) {
        self.lock().packages.remove(package_id);
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.lock().hits.clone()
    }

    /// Number of `method` requests to exactly `path`
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.lock()
            .hits
            .iter()
            .filter(|hit| hit.method.as_str() == method && hit.path == path)
            .count()
    }

    /// JSON bodies sent to `path`, oldest first
    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.lock()
            .hits
            .iter()
            .filter(|hit| hit.path == path)
            .map(|hit| hit.body.clone())
            .collect()
    }

    /// Bytes received for a signed upload token
    pub fn uploaded(&self, token: &str) -> Option<Vec<u8>> {
        self.lock().uploads.get(token).cloned()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn envelope(success: bool, code: i64, message: &str, data: Value) -> Response {
    Json(json!({
        "code": code,
        "success": success,
        "message": message,
        "data": data,
    }))
    .into_response()
}

fn ok(data: Value) -> Response {
    envelope(true, 200, "SUCCESS", data)
}

async fn handle(State(state): State<Shared>, method: Method, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().to_string();
    let json_body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let mut state = state.lock().expect("stub state poisoned");

    if let Some(token) = path.strip_prefix("/upload/") {
        state.hits.push(Hit {
            method,
            path: path.clone(),
            body: Value::Null,
        });
        if state.fail_uploads {
            return (StatusCode::INTERNAL_SERVER_ERROR, "upload rejected").into_response();
        }
        state.uploads.insert(token.to_string(), body.to_vec());
        return StatusCode::OK.into_response();
    }

    let Some(api) = path.strip_prefix("/api/v1") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let api = api.to_string();

    state.hits.push(Hit {
        method: method.clone(),
        path: api.clone(),
        body: json_body.clone(),
    });

    if let Some((message, code)) = state.failures.get(&api) {
        return envelope(false, *code, message, Value::Null);
    }

    match (method.as_str(), api.as_str()) {
        ("POST", "/widget/package/auth") => ok(Value::Null),
        ("POST", "/widget/package/create") => {
            state.next_package += 1;
            let package_id = json_body["packageId"]
                .as_str()
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("wpkCreated{:04}", state.next_package));
            state.packages.insert(
                package_id.clone(),
                json!({
                    "packageId": package_id,
                    "name": json_body["name"],
                    "status": 0,
                    "packageType": json_body["packageType"],
                    "releaseType": json_body["releaseType"],
                }),
            );
            ok(json!({ "packageId": package_id }))
        }
        ("POST", "/widget/package/ban") => {
            let message = if json_body["unban"].as_bool().unwrap_or(false) {
                "unban success"
            } else {
                "ban success"
            };
            envelope(true, 200, message, Value::Null)
        }
        ("POST", "/widget/package/unpublish") => envelope(true, 200, "unpublish success", Value::Null),
        ("POST", "/widget/package/rollback") => {
            let message = format!("rollback to {}", json_body["version"].as_str().unwrap_or(""));
            envelope(true, 200, &message, Value::Null)
        }
        ("POST", "/widget/package/v2/release") | ("POST", "/widget/package/v2/submit") => {
            ok(Value::Null)
        }
        ("GET", "/asset/upload/meta") => {
            let endpoint = format!("{}/assets", state.host);
            ok(json!({ "endpoint": endpoint }))
        }
        ("POST", "/asset/upload/callback") => ok(Value::Null),
        ("POST", p) if p.starts_with("/asset/widgets/") && p.ends_with("/uploadPreSignedUrl") => {
            let count = json_body["count"].as_u64().unwrap_or(0);
            let mut auths = Vec::new();
            for _ in 0..count {
                state.next_token += 1;
                let token = format!("tok{:04}", state.next_token);
                auths.push(json!({
                    "token": token,
                    "uploadUrl": format!("{}/upload/{}", state.host, token),
                    "uploadRequestMethod": "PUT",
                }));
            }
            ok(Value::Array(auths))
        }
        ("GET", p) if p.starts_with("/widget/package/release/history/") => {
            let id = &p["/widget/package/release/history/".len()..];
            ok(state.history.get(id).cloned().unwrap_or_else(|| json!([])))
        }
        ("GET", p) if p.starts_with("/widget/package/") => {
            let id = &p["/widget/package/".len()..];
            ok(state.packages.get(id).cloned().unwrap_or(Value::Null))
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Answers prompts from a fixed script, recording what was asked.
///
/// An empty answer takes the prompt's default; `confirm` accepts
/// `y`, `yes` or `true`.
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().expect("prompter poisoned").clone()
    }

    fn next(&self, prompt: &str) -> Result<String> {
        self.asked
            .lock()
            .expect("prompter poisoned")
            .push(prompt.to_string());
        self.answers
            .lock()
            .expect("prompter poisoned")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("unexpected prompt: {}", prompt))
    }
}

impl Prompter for ScriptedPrompter {
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let answer = self.next(prompt)?;
        if answer.is_empty() {
            return Ok(default.unwrap_or_default().to_string());
        }
        Ok(answer)
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        let answer = self.next(prompt)?.trim().to_ascii_lowercase();
        Ok(match answer.as_str() {
            "" => default,
            "y" | "yes" | "true" => true,
            _ => false,
        })
    }
}

/// Bundler that writes a placeholder bundle and replays fixed events
pub struct FakeBundler {
    events: Vec<BuildEvent>,
    runs: AtomicUsize,
    jobs: Mutex<Vec<BuildJob>>,
}

impl FakeBundler {
    pub fn with_events(events: Vec<BuildEvent>) -> Self {
        Self {
            events,
            runs: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_events(vec![BuildEvent::Succeeded])
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<BuildJob> {
        self.jobs.lock().expect("bundler poisoned").clone()
    }
}

impl Bundler for FakeBundler {
    fn run(&self, job: &BuildJob, events: BuildEvents) -> Result<JoinHandle<Result<()>>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().expect("bundler poisoned").push(job.clone());

        if self.events.contains(&BuildEvent::Succeeded) {
            std::fs::create_dir_all(job.output_dir())?;
            std::fs::write(
                job.output_path(),
                format!("/* {} */ console.log('widget');", job.package_id),
            )?;
        }

        for event in &self.events {
            let _ = events.send(event.clone());
        }

        Ok(tokio::spawn(async { Ok(()) }))
    }
}
