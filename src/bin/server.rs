#![forbid(unsafe_code)]

//! HTTP front-end for the download lifecycle.
//!
//! Each browser gets a session id in the `rg_session` cookie. Analyze and
//! prepare run on the blocking pool while holding that session's lock, so a
//! session never runs two operations at once; progress is published to a
//! separate slot that `/api/progress` reads without waiting for the lock.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use reels_gremlin::{
    AnalysisResult, DownloadLifecycleManager, Error, MediaKind, Platform, PlatformRegistry,
    ProgressEvent,
    config::{SettingsOverrides, resolve_settings},
    extractor::{MediaExtractor, YtDlp},
    janitor::TempFileJanitor,
    logging,
    session::{Activity, SessionHandle, SessionPhase, SessionStore},
};
use serde::{Deserialize, Serialize};
use tokio::{signal, time::MissedTickBehavior};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

const SESSION_COOKIE: &str = "rg_session";
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "server", about = "Serve the reels-gremlin download API")]
struct ServerArgs {
    /// Address to bind (overrides REELS_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Port to bind (overrides REELS_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Shared temp directory for prepared files (overrides TEMP_DOWNLOAD_DIR).
    #[arg(long)]
    temp_dir: Option<PathBuf>,
    /// Dotenv file to read settings from.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl ServerArgs {
    fn into_overrides(self) -> SettingsOverrides {
        SettingsOverrides {
            temp_dir: self.temp_dir,
            host: self.host,
            port: self.port,
            env_path: self.env_file,
        }
    }
}

#[derive(Clone)]
struct AppState {
    manager: Arc<DownloadLifecycleManager>,
    sessions: Arc<SessionStore>,
    verbose_errors: bool,
}

impl AppState {
    fn new(manager: DownloadLifecycleManager, verbose_errors: bool) -> Self {
        Self {
            manager: Arc::new(manager),
            sessions: Arc::new(SessionStore::new()),
            verbose_errors,
        }
    }

    fn error(&self, err: Error) -> ApiError {
        ApiError::from_domain(err, self.verbose_errors)
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    fn from_domain(err: Error, verbose: bool) -> Self {
        let status = match &err {
            Error::InvalidUrl(_)
            | Error::UnknownPlatform(_)
            | Error::UnknownMediaKind(_)
            | Error::UnsupportedMediaKind { .. } => StatusCode::BAD_REQUEST,
            Error::NotAnalyzed | Error::NothingPrepared => StatusCode::CONFLICT,
            Error::StaleFile { .. } => StatusCode::GONE,
            Error::Extraction { .. } => StatusCode::BAD_GATEWAY,
            Error::FileResolution { .. } | Error::Configuration(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.user_message(),
            detail: verbose.then(|| err.to_string()),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            detail: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.detail {
            Some(detail) => serde_json::json!({ "error": self.message, "detail": detail }),
            None => serde_json::json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    platform: String,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRequest {
    platform: String,
    media_kind: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlatformInfo {
    name: &'static str,
    code: &'static str,
    media_kinds: &'static [MediaKind],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreparedView {
    file_name: String,
    mime_type: String,
}

/// Snapshot of a session. While an operation holds the session only the
/// activity is reported and `busy` is set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<SessionPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prepared: Option<PreparedView>,
    ttl_minutes: u64,
    activity: Activity,
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = resolve_settings(ServerArgs::parse().into_overrides())?;
    let _log_guard = logging::init(&settings.log_file)?;

    let extractor: Arc<dyn MediaExtractor> = Arc::new(YtDlp::new(&settings.ytdlp_bin));
    let registry = PlatformRegistry::from_settings(&settings, extractor);
    let janitor = TempFileJanitor::new(&settings.temp_dir, settings.ttl);
    janitor
        .ensure_dir()
        .with_context(|| format!("creating temp dir {}", settings.temp_dir.display()))?;
    janitor.sweep_now();

    for problem in
        DownloadLifecycleManager::check_dependencies(&settings.ytdlp_bin, &settings.ffmpeg_bin)
    {
        warn!("{problem}");
    }

    let manager = DownloadLifecycleManager::new(Arc::new(registry), janitor);
    let state = AppState::new(manager, settings.verbose_errors);
    spawn_maintenance(state.clone(), MAINTENANCE_INTERVAL, settings.session_idle);

    let host: IpAddr = settings
        .host
        .parse()
        .with_context(|| format!("expected an IP address for REELS_HOST, got {}", settings.host))?;
    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(
        %addr,
        temp_dir = %settings.temp_dir.display(),
        ttl_seconds = settings.ttl.as_secs(),
        "API server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/platforms", get(list_platforms))
        .route("/api/session", get(get_session).delete(delete_session))
        .route("/api/analyze", post(analyze))
        .route("/api/prepare", post(prepare))
        .route("/api/progress", get(get_progress))
        .route("/api/file", get(download_file))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {err}");
    }
}

/// Sweeps the temp directory and expires idle sessions on a fixed interval.
fn spawn_maintenance(state: AppState, every: Duration, idle: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let state = state.clone();
            if let Err(err) =
                tokio::task::spawn_blocking(move || run_maintenance(&state, idle, Instant::now()))
                    .await
            {
                warn!("maintenance task failed: {err}");
            }
        }
    });
}

/// Returns the number of sessions expired.
fn run_maintenance(state: &AppState, idle: Duration, now: Instant) -> usize {
    state.manager.janitor().sweep_now();
    let expired = state.sessions.take_idle(idle, now);
    for handle in &expired {
        state.manager.reset(&mut handle.state().lock());
    }
    if !expired.is_empty() {
        info!(count = expired.len(), "expired idle sessions");
    }
    expired.len()
}

/// Reads the session id from the `Cookie` header(s).
fn session_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE)
                .then(|| Uuid::parse_str(value.trim()).ok())
                .flatten()
        })
}

/// Converts the handler result and attaches the cookie for new sessions.
fn respond<T: IntoResponse>(result: ApiResult<T>, session: &SessionHandle, created: bool) -> Response {
    let mut response = match result {
        Ok(body) => body.into_response(),
        Err(err) => err.into_response(),
    };
    if created
        && let Ok(value) = HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            session.id()
        ))
    {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

async fn list_platforms(State(state): State<AppState>) -> Json<Vec<PlatformInfo>> {
    let platforms = state
        .manager
        .registry()
        .platforms()
        .map(|platform| PlatformInfo {
            name: platform.name(),
            code: platform.code(),
            media_kinds: platform.media_kinds(),
        })
        .collect();
    Json(platforms)
}

async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, created) = state.sessions.resolve(session_id_from(&headers));
    let view = session_view(&state, &session);
    respond(Ok(Json(view)), &session, created)
}

fn session_view(state: &AppState, session: &SessionHandle) -> SessionView {
    let ttl_minutes = state.manager.janitor().ttl().as_secs() / 60;
    let activity = session.activity();
    let Some(guard) = session.state().try_lock() else {
        return SessionView {
            busy: true,
            phase: None,
            platform: None,
            source_url: None,
            analysis: None,
            prepared: None,
            ttl_minutes,
            activity,
        };
    };
    SessionView {
        busy: false,
        phase: Some(guard.phase()),
        platform: guard.platform(),
        source_url: Some(guard.source_url().to_string()).filter(|url| !url.is_empty()),
        analysis: guard.analysis().cloned(),
        prepared: guard.prepared().map(|prepared| PreparedView {
            file_name: prepared.file_name.clone(),
            mime_type: prepared.mime_type.clone(),
        }),
        ttl_minutes,
        activity,
    }
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    let (session, created) = state.sessions.resolve(session_id_from(&headers));
    let result = run_analyze(&state, session.clone(), request).await;
    respond(result, &session, created)
}

async fn run_analyze(
    state: &AppState,
    session: Arc<SessionHandle>,
    request: AnalyzeRequest,
) -> ApiResult<Json<AnalysisResult>> {
    let platform: Platform = request.platform.parse().map_err(|err| state.error(err))?;
    session.set_activity(Activity {
        label: Some("Analyzing content...".into()),
        ..Activity::default()
    });

    let manager = state.manager.clone();
    let worker = session.clone();
    let result = tokio::task::spawn_blocking(move || {
        manager.analyze(&mut worker.state().lock(), platform, &request.url)
    })
    .await
    .map_err(|err| {
        warn!("analyze task failed: {err}");
        ApiError::internal("analysis task failed")
    })?;

    match result {
        Ok(analysis) => {
            session.set_activity(Activity {
                label: Some("Content analyzed successfully.".into()),
                ..Activity::default()
            });
            Ok(Json(analysis))
        }
        Err(err) => {
            session.set_activity(Activity {
                error: Some(err.user_message()),
                ..Activity::default()
            });
            Err(state.error(err))
        }
    }
}

async fn prepare(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PrepareRequest>,
) -> Response {
    let (session, created) = state.sessions.resolve(session_id_from(&headers));
    let result = run_prepare(&state, session.clone(), request).await;
    respond(result, &session, created)
}

async fn run_prepare(
    state: &AppState,
    session: Arc<SessionHandle>,
    request: PrepareRequest,
) -> ApiResult<Json<PreparedView>> {
    let platform: Platform = request.platform.parse().map_err(|err| state.error(err))?;
    let kind: MediaKind = request.media_kind.parse().map_err(|err| state.error(err))?;
    session.set_activity(Activity {
        kind: Some(kind),
        label: Some(format!("Preparing {kind} file...")),
        ..Activity::default()
    });

    let manager = state.manager.clone();
    let worker = session.clone();
    let result = tokio::task::spawn_blocking(move || {
        let reporter = worker.clone();
        let mut sink = move |event: ProgressEvent| {
            let label = event.label(kind);
            reporter.update_activity(|activity| {
                activity.label = Some(label);
                activity.progress = Some(event);
            });
        };
        manager.prepare(&mut worker.state().lock(), platform, kind, &mut sink)
    })
    .await
    .map_err(|err| {
        warn!("prepare task failed: {err}");
        ApiError::internal("preparation task failed")
    })?;

    match result {
        Ok(prepared) => {
            session.update_activity(|activity| {
                activity.label = Some(format!("{} is ready.", kind.title_case()));
            });
            Ok(Json(PreparedView {
                file_name: prepared.file_name,
                mime_type: prepared.mime_type,
            }))
        }
        Err(err) => {
            session.set_activity(Activity {
                kind: Some(kind),
                error: Some(format!("Failed to prepare {kind} file. {}", err.user_message())),
                ..Activity::default()
            });
            Err(state.error(err))
        }
    }
}

async fn get_progress(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, created) = state.sessions.resolve(session_id_from(&headers));
    let activity = session.activity();
    respond(Ok(Json(activity)), &session, created)
}

async fn download_file(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, created) = state.sessions.resolve(session_id_from(&headers));
    let result = stream_prepared(&state, session.clone()).await;
    respond(result, &session, created)
}

async fn stream_prepared(state: &AppState, session: Arc<SessionHandle>) -> ApiResult<Response> {
    let manager = state.manager.clone();
    let retrieved = tokio::task::spawn_blocking(move || manager.retrieve(&mut session.state().lock()))
        .await
        .map_err(|err| {
            warn!("retrieve task failed: {err}");
            ApiError::internal("file retrieval failed")
        })?
        .map_err(|err| state.error(err))?;

    let content_type = HeaderValue::from_str(&retrieved.mime_type)
        .map_err(|_| ApiError::internal("invalid content type"))?;
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        retrieved.file_name.replace(['"', '\\'], "_")
    ))
    .map_err(|_| ApiError::internal("invalid file name"))?;

    let file = tokio::fs::File::from_std(retrieved.file);
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(retrieved.size));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

async fn delete_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id_from(&headers)
        && let Some(session) = state.sessions.remove(id)
    {
        let manager = state.manager.clone();
        if let Err(err) =
            tokio::task::spawn_blocking(move || manager.reset(&mut session.state().lock())).await
        {
            warn!("reset task failed: {err}");
            return ApiError::internal("session reset failed").into_response();
        }
    }
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static("rg_session=; Path=/; Max-Age=0"),
    );
    response
}
