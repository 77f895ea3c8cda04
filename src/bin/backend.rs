#![forbid(unsafe_code)]

//! TubeCast API server.
//!
//! All business logic lives in the library crate; this binary wires the HTTP
//! surface: route table, bearer-credential extraction, multipart upload
//! parsing, domain-error to status-code mapping, and streaming of stored
//! media files.

use std::{collections::HashMap, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use clap::Parser;
use mime_guess::MimeGuess;
use serde::Deserialize;
use serde_json::json;
use tokio::{fs::File, signal, task};
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;

use tubecast::{
    accounts::{self, NewSignup, ProfileUpdate, UploadedFile},
    auth::{Claims, TokenKey},
    comments, config,
    error::ServiceError,
    media::MediaStore,
    playlists::{self, PlaylistEdit},
    security,
    store::Store,
    videos::{self, NewVideo, VideoUpdate},
};

/// Uploads carry whole video files; the default axum body cap is far too
/// small for them.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "backend", about = "TubeCast API server")]
struct Args {
    /// Path to the environment config file.
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Clone)]
struct AppState {
    store: Store,
    media: Arc<MediaStore>,
    tokens: Arc<TokenKey>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) | ServiceError::Conflict(_) => StatusCode::BAD_REQUEST,
            ServiceError::Internal(inner) => {
                tracing::error!("internal error: {inner:#}");
                return Self::internal("internal server error");
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct PlaylistCreateRequest {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveVideoRequest {
    video_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRequest {
    #[serde(default)]
    comment_text: String,
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    security::ensure_not_root("backend")?;

    let cfg = config::load_runtime_config_from(&args.config)?;
    let store = Store::open(&cfg.db_path).context("initializing record store")?;
    let media = MediaStore::open(&cfg.media_root).context("initializing media store")?;
    let tokens = TokenKey::from_secret(&cfg.secret_key);

    let state = AppState {
        store,
        media: Arc::new(media),
        tokens: Arc::new(tokens),
    };

    let app = Router::new()
        .route("/subscribe/{targetId}", put(subscribe_channel))
        .route("/unsubscribe/{targetId}", put(unsubscribe_channel))
        .route("/like/{videoId}", put(like_video))
        .route("/dislike/{videoId}", put(dislike_video))
        .route("/views/{videoId}", put(record_view))
        .route("/playlist", get(list_playlists))
        .route(
            "/playlist/{id}",
            post(create_playlist)
                .get(get_playlist)
                .delete(delete_playlist),
        )
        .route("/playlist/add-video/{playlistId}", post(add_playlist_video))
        .route(
            "/playlist/remove-video/{playlistId}",
            post(remove_playlist_video),
        )
        .route("/user/signup", post(signup))
        .route("/user/login", post(login))
        .route("/user/{userId}", post(update_user).get(get_user))
        .route("/video/upload", post(upload_video))
        .route("/video/own", get(own_videos))
        .route("/video/category/{category}", get(videos_by_category))
        .route("/video/channel/{channelId}", get(channel_videos))
        .route("/video/subscribed/video", get(subscribed_feed))
        .route("/video/subscribed/channel", get(subscribed_channels))
        .route(
            "/video/{videoId}",
            post(update_video).get(get_video).delete(delete_video),
        )
        .route("/comment/new-comment/{videoId}", post(new_comment))
        .route(
            "/comment/{id}",
            get(video_comments).put(update_comment).delete(delete_comment),
        )
        .route("/media/{category}/{file}", get(serve_media))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", cfg.tubecast_host, cfg.tubecast_port)
        .parse()
        .context("parsing bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {err}");
    }
}

/// Resolves the caller's identity from the `Authorization` header.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims, ServiceError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ServiceError::unauthenticated("missing authorization header"))?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    state.tokens.verify(token)
}

/// Runs a synchronous domain operation off the async runtime. Every handler
/// goes through here because the record store does blocking I/O.
async fn run_blocking<T>(
    f: impl FnOnce() -> Result<T, ServiceError> + Send + 'static,
) -> ApiResult<T>
where
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
        .map_err(ApiError::from)
}

/// Collected multipart body: plain fields by name plus uploaded files.
#[derive(Default)]
struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    fn require_field(&self, name: &str) -> Result<String, ServiceError> {
        self.field(name)
            .ok_or_else(|| ServiceError::validation(format!("{name} is required")))
    }

    fn file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    fn require_file(&mut self, name: &str) -> Result<UploadedFile, ServiceError> {
        self.file(name)
            .ok_or_else(|| ServiceError::validation(format!("{name} file is required")))
    }

    /// Comma-separated tag list, matching what the upload form sends.
    fn tags(&self) -> Vec<String> {
        self.field("tags")
            .map(|raw| {
                raw.split(',')
                    .map(|tag| tag.trim().to_owned())
                    .filter(|tag| !tag.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

async fn read_form(mut multipart: Multipart) -> Result<MultipartForm, ServiceError> {
    let mut form = MultipartForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServiceError::validation(format!("invalid multipart body: {err}")))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if let Some(file_name) = field.file_name().map(str::to_owned) {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ServiceError::validation(format!("reading {name}: {err}")))?;
            form.files.insert(
                name,
                UploadedFile {
                    file_name,
                    bytes: bytes.to_vec(),
                },
            );
        } else {
            let text = field
                .text()
                .await
                .map_err(|err| ServiceError::validation(format!("reading {name}: {err}")))?;
            form.fields.insert(name, text);
        }
    }
    Ok(form)
}

async fn signup(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let mut form = read_form(multipart).await?;
    let signup = NewSignup {
        channel_name: form.require_field("channelName")?,
        email: form.require_field("email")?,
        phone: form.field("phone").unwrap_or_default(),
        password: form.require_field("password")?,
        logo: form.require_file("logo")?,
    };

    let store = state.store.clone();
    let media = state.media.clone();
    let account = run_blocking(move || accounts::signup(&store, &media, signup)).await?;
    Ok((StatusCode::CREATED, Json(account)).into_response())
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<accounts::LoginResponse>> {
    let store = state.store.clone();
    let tokens = state.tokens.clone();
    let response =
        run_blocking(move || accounts::login(&store, &tokens, &request.email, &request.password))
            .await?;
    Ok(Json(response))
}

async fn get_user(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<String>,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let account = run_blocking(move || accounts::get_account(&store, &user_id)).await?;
    Ok(Json(json!({ "user": account })).into_response())
}

async fn update_user(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let mut form = read_form(multipart).await?;
    let update = ProfileUpdate {
        channel_name: form.field("channelName"),
        email: form.field("email"),
        phone: form.field("phone"),
        password: form.field("password"),
        old_password: form.field("oldPassword"),
    };
    let new_logo = form.file("logo");

    let store = state.store.clone();
    let media = state.media.clone();
    let account = run_blocking(move || {
        accounts::update_profile(&store, &media, &claims, &user_id, update, new_logo)
    })
    .await?;
    Ok(Json(json!({ "msg": "channel updated", "user": account })).into_response())
}

async fn subscribe_channel(
    State(state): State<AppState>,
    AxumPath(target_id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    run_blocking(move || accounts::subscribe(&store, &claims.sub, &target_id)).await?;
    Ok(Json(json!({ "msg": "channel subscribed" })).into_response())
}

async fn unsubscribe_channel(
    State(state): State<AppState>,
    AxumPath(target_id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    run_blocking(move || accounts::unsubscribe(&store, &claims.sub, &target_id)).await?;
    Ok(Json(json!({ "msg": "channel unsubscribed" })).into_response())
}

async fn upload_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let mut form = read_form(multipart).await?;
    let new = NewVideo {
        title: form.require_field("title")?,
        description: form.field("description").unwrap_or_default(),
        category: form.field("category").unwrap_or_default(),
        tags: form.tags(),
        video: form.require_file("video")?,
        thumbnail: form.require_file("thumbnail")?,
    };

    let store = state.store.clone();
    let media = state.media.clone();
    let video = run_blocking(move || videos::upload(&store, &media, &claims.sub, new)).await?;
    Ok((StatusCode::CREATED, Json(video)).into_response())
}

async fn update_video(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let mut form = read_form(multipart).await?;
    let update = VideoUpdate {
        title: form.field("title"),
        description: form.field("description"),
        category: form.field("category"),
        tags: form.field("tags").map(|_| form.tags()),
    };
    let new_thumbnail = form.file("thumbnail");

    let store = state.store.clone();
    let media = state.media.clone();
    let video = run_blocking(move || {
        videos::update(&store, &media, &claims.sub, &video_id, update, new_thumbnail)
    })
    .await?;
    Ok(Json(video).into_response())
}

async fn delete_video(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let media = state.media.clone();
    let deleted =
        run_blocking(move || videos::delete(&store, &media, &claims.sub, &video_id)).await?;
    Ok(Json(json!({ "deletedVideo": deleted })).into_response())
}

async fn get_video(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let video = run_blocking(move || videos::get(&store, &video_id)).await?;
    Ok(Json(json!({ "video": video })).into_response())
}

async fn own_videos(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let listed = run_blocking(move || videos::own_videos(&store, &claims.sub)).await?;
    Ok(Json(json!({ "videos": listed })).into_response())
}

async fn videos_by_category(
    State(state): State<AppState>,
    AxumPath(category): AxumPath<String>,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let listed = run_blocking(move || videos::by_category(&store, &category)).await?;
    Ok(Json(json!({ "videos": listed })).into_response())
}

async fn channel_videos(
    State(state): State<AppState>,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let listed = run_blocking(move || videos::channel_videos(&store, &channel_id)).await?;
    Ok(Json(json!({ "videos": listed })).into_response())
}

async fn subscribed_feed(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let listed = run_blocking(move || videos::subscribed_feed(&store, &claims.sub)).await?;
    Ok(Json(listed).into_response())
}

async fn subscribed_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let listed = run_blocking(move || accounts::subscribed_channels(&store, &claims.sub)).await?;
    Ok(Json(listed).into_response())
}

async fn like_video(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let video = run_blocking(move || videos::like(&store, &claims.sub, &video_id)).await?;
    Ok(Json(video).into_response())
}

async fn dislike_video(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let video = run_blocking(move || videos::dislike(&store, &claims.sub, &video_id)).await?;
    Ok(Json(video).into_response())
}

async fn record_view(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let views = run_blocking(move || videos::record_view(&store, &video_id)).await?;
    Ok(Json(json!({ "views": views })).into_response())
}

async fn create_playlist(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    headers: HeaderMap,
    Json(request): Json<PlaylistCreateRequest>,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let playlist = run_blocking(move || {
        playlists::create_with_video(&store, &claims.sub, &video_id, &request.title)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(playlist)).into_response())
}

async fn get_playlist(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let playlist = run_blocking(move || playlists::get_playlist(&store, &playlist_id)).await?;
    Ok(Json(playlist).into_response())
}

async fn list_playlists(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let page =
        run_blocking(move || playlists::list_page(&store, query.page, query.limit)).await?;
    Ok(Json(page).into_response())
}

async fn add_playlist_video(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
    headers: HeaderMap,
    Json(edit): Json<PlaylistEdit>,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let playlist =
        run_blocking(move || playlists::add_video(&store, &claims.sub, &playlist_id, edit))
            .await?;
    Ok(Json(json!({ "playlist": playlist })).into_response())
}

async fn remove_playlist_video(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
    headers: HeaderMap,
    Json(request): Json<RemoveVideoRequest>,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let playlist = run_blocking(move || {
        playlists::remove_video(
            &store,
            &claims.sub,
            &playlist_id,
            request.video_id.as_deref(),
        )
    })
    .await?;
    Ok(Json(json!({ "playlist": playlist })).into_response())
}

async fn delete_playlist(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    run_blocking(move || playlists::delete_playlist(&store, &claims.sub, &playlist_id)).await?;
    Ok(Json(json!({ "msg": "playlist deleted successfully" })).into_response())
}

async fn new_comment(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    headers: HeaderMap,
    Json(request): Json<CommentRequest>,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let comment = run_blocking(move || {
        comments::create(&store, &claims.sub, &video_id, &request.comment_text)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "newComment": comment }))).into_response())
}

async fn video_comments(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let listed = run_blocking(move || comments::for_video(&store, &video_id)).await?;
    Ok(Json(json!({ "commentList": listed })).into_response())
}

async fn update_comment(
    State(state): State<AppState>,
    AxumPath(comment_id): AxumPath<String>,
    headers: HeaderMap,
    Json(request): Json<CommentRequest>,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    let comment = run_blocking(move || {
        comments::update(&store, &claims.sub, &comment_id, &request.comment_text)
    })
    .await?;
    Ok(Json(json!({ "updatedComment": comment })).into_response())
}

async fn delete_comment(
    State(state): State<AppState>,
    AxumPath(comment_id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = authenticate(&state, &headers)?;
    let store = state.store.clone();
    run_blocking(move || comments::delete(&store, &claims.sub, &comment_id)).await?;
    Ok(Json(json!({ "msg": "comment deleted successfully" })).into_response())
}

/// Streams a stored media object back to the client.
async fn serve_media(
    State(state): State<AppState>,
    AxumPath((category, file)): AxumPath<(String, String)>,
) -> ApiResult<Response> {
    let path = state.media.resolve(&category, &file)?;
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);
    let mut response = body.into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first() {
        if let Ok(value) = mime.to_string().parse() {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }

    Ok(response)
}
