//! Single-page upload and question form served with axum.

use anyhow::Context;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use docux_core::{
    ApiKey, AppConfig, ChatEngine, ChatError, ErrorKind, SessionStore, Turn, UploadedDocument,
    DEFAULT_SESSION_ID,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const MISSING_KEY_WARNING: &str = "Please enter the Groq API key.";

#[derive(Debug, Error)]
pub enum WebError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<MultipartError> for WebError {
    fn from(error: MultipartError) -> Self {
        WebError::BadRequest(error.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

struct ActiveEngine {
    key: ApiKey,
    engine: Arc<ChatEngine>,
}

/// Process-lifetime server state: sessions survive key changes.
pub struct AppState {
    config: AppConfig,
    sessions: Arc<SessionStore>,
    engine: Mutex<Option<ActiveEngine>>,
    upload: Mutex<()>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            sessions: Arc::new(SessionStore::new()),
            engine: Mutex::new(None),
            upload: Mutex::new(()),
        }
    }

    /// Remembers a newly supplied key and returns the engine bound to the current key.
    pub async fn engine_for(&self, key: Option<&str>) -> Result<Option<Arc<ChatEngine>>, ChatError> {
        let mut slot = self.engine.lock().await;
        if let Ok(key) = ApiKey::parse(key) {
            let unchanged = slot.as_ref().is_some_and(|active| active.key == key);
            if !unchanged {
                let engine =
                    ChatEngine::from_config(&self.config, key.clone(), Arc::clone(&self.sessions))?;
                if slot.is_some() {
                    info!("provider key changed; documents must be uploaded again");
                }
                *slot = Some(ActiveEngine {
                    key,
                    engine: Arc::new(engine),
                });
            }
        }
        Ok(slot.as_ref().map(|active| Arc::clone(&active.engine)))
    }
}

#[derive(Debug, Default)]
pub struct FormInput {
    pub api_key: Option<String>,
    pub session_id: Option<String>,
    pub documents: Vec<UploadedDocument>,
    pub question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Warning(String),
    Info(String),
    Error { kind: ErrorKind, message: String },
}

impl Notice {
    fn from_error(error: &ChatError) -> Self {
        Notice::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct PageView {
    pub has_key: bool,
    pub session_id: String,
    pub notices: Vec<Notice>,
    pub answer: Option<String>,
    pub store: BTreeMap<String, Vec<Turn>>,
}

impl PageView {
    fn new(session_id: String) -> Self {
        Self {
            has_key: false,
            session_id,
            notices: Vec::new(),
            answer: None,
            store: BTreeMap::new(),
        }
    }

    fn transcript(&self) -> &[Turn] {
        self.store
            .get(&self.session_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn session_or_default(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => DEFAULT_SESSION_ID.to_string(),
    }
}

/// Credential first, then the upload batch, then the question.
pub async fn process(state: &AppState, input: FormInput) -> PageView {
    let mut view = PageView::new(session_or_default(input.session_id.as_deref()));

    let engine = match state.engine_for(input.api_key.as_deref()).await {
        Ok(Some(engine)) => engine,
        Ok(None) => {
            view.notices.push(Notice::Warning(MISSING_KEY_WARNING.to_string()));
            return view;
        }
        Err(error) => {
            view.notices.push(Notice::from_error(&error));
            return view;
        }
    };
    view.has_key = true;
    let ctx = engine.context();

    if !input.documents.is_empty() {
        let _serialised = state.upload.lock().await;
        match engine.index_if_changed(&input.documents, &ctx).await {
            Ok(Some(summary)) => view.notices.push(Notice::Info(format!(
                "Indexed {} file(s): {} page(s), {} chunk(s).",
                summary.documents, summary.text_units, summary.chunks
            ))),
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "upload batch rejected");
                view.notices.push(Notice::from_error(&error));
                view.store = state.sessions.snapshot();
                return view;
            }
        }
    }

    if let Some(question) = input.question.as_deref().filter(|q| !q.trim().is_empty()) {
        match engine.ask(&view.session_id, question, &ctx).await {
            Ok(report) => view.answer = Some(report.answer.text),
            Err(error) => view.notices.push(Notice::from_error(&error)),
        }
    }

    view.store = state.sessions.snapshot();
    view
}

pub async fn read_form(mut multipart: Multipart) -> Result<FormInput, WebError> {
    let mut input = FormInput::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "documents" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                if !file_name.is_empty() && !bytes.is_empty() {
                    input.documents.push(UploadedDocument::new(file_name, bytes.to_vec()));
                }
            }
            "api_key" => input.api_key = Some(field.text().await?),
            "session_id" => input.session_id = Some(field.text().await?),
            "question" => input.question = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(input)
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn speaker(turn: &Turn) -> &'static str {
    match turn.role {
        docux_core::Role::Human => "User",
        docux_core::Role::Assistant => "Assistant",
    }
}

pub fn render_page(view: &PageView) -> String {
    let mut html = String::from(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>DocuX</title></head><body>\n\
         <h1>DocuX: chat with your PDFs</h1>\n<p>Upload PDFs and ask questions about their content.</p>\n",
    );

    let key_hint = if view.has_key { "key saved" } else { "" };
    html.push_str(&format!(
        "<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n\
         <label>Groq API key <input type=\"password\" name=\"api_key\" placeholder=\"{key_hint}\"></label><br>\n\
         <label>Session ID <input type=\"text\" name=\"session_id\" value=\"{}\"></label><br>\n\
         <label>Choose PDF files <input type=\"file\" name=\"documents\" accept=\".pdf,application/pdf\" multiple></label><br>\n\
         <label>Your question <input type=\"text\" name=\"question\"></label><br>\n\
         <button type=\"submit\">Send</button>\n</form>\n",
        html_escape(&view.session_id)
    ));

    for notice in &view.notices {
        let (class, text) = match notice {
            Notice::Warning(text) => ("warning", text.clone()),
            Notice::Info(text) => ("info", text.clone()),
            Notice::Error { kind, message } => ("error", format!("{kind:?}: {message}")),
        };
        html.push_str(&format!("<p class=\"{class}\">{}</p>\n", html_escape(&text)));
    }

    if let Some(answer) = &view.answer {
        html.push_str(&format!(
            "<p class=\"answer\">Assistant: {}</p>\n",
            html_escape(answer)
        ));
    }

    if !view.store.is_empty() {
        let contents = serde_json::to_string_pretty(&view.store).unwrap_or_default();
        html.push_str(&format!(
            "<h2>Store contents</h2>\n<pre>{}</pre>\n",
            html_escape(&contents)
        ));
    }

    let transcript = view.transcript();
    if !transcript.is_empty() {
        html.push_str("<h2>Chat History</h2>\n<ol>\n");
        for turn in transcript {
            html.push_str(&format!(
                "<li><b>{}</b>: {}</li>\n",
                speaker(turn),
                html_escape(&turn.text)
            ));
        }
        html.push_str("</ol>\n");
    }

    html.push_str("</body></html>\n");
    html
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let view = process(&state, FormInput::default()).await;
    Html(render_page(&view))
}

async fn submit(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Html<String>, WebError> {
    let input = read_form(multipart).await?;
    let view = process(&state, input).await;
    Ok(Html(render_page(&view)))
}

async fn session_transcript(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, WebError> {
    let turns = state
        .sessions
        .snapshot()
        .remove(&session_id)
        .ok_or_else(|| WebError::NotFound(format!("session {session_id}")))?;
    Ok(Json(json!({ "session_id": session_id, "turns": turns })))
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/api/sessions/:session_id", get(session_transcript))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    config: AppConfig,
    api_key: Option<&str>,
    bind: &str,
    max_upload_bytes: usize,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config));
    if state.engine_for(api_key).await?.is_none() {
        warn!("no provider key configured; the page will ask for one");
    }

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind to {bind}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(state, max_upload_bytes))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
