use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use server_api::{
    create_reply, create_vision, get_user, get_vision, import_moment, join_group, leave_group,
    list_users, list_visions, login, share_vision, support_vision, unshare_vision,
    unsupport_vision, ApiContext,
};
use shared::{
    domain::{UserId, VisionId},
    error::{ApiError, ErrorCode},
    protocol::{
        ActorRequest, CreateReplyRequest, CreateVisionRequest, ImportMomentRequest,
        JoinGroupRequest, ListUsersQuery, LoginRequest, LoginResponse, MomentPayload,
        ReplyPayload, ShareRequest, UserPayload, VisionPayload,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

/// Visions and replies are short text; anything bigger than this is
/// not a legitimate request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiResponse<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, site_title = settings.site_title.as_str(), "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(http_login))
        .route(
            "/api/visions",
            get(http_list_visions).post(http_create_vision),
        )
        .route("/api/visions/:vision_id", get(http_get_vision))
        .route("/api/visions/:vision_id/support", post(http_support_vision))
        .route(
            "/api/visions/:vision_id/unsupport",
            post(http_unsupport_vision),
        )
        .route("/api/visions/:vision_id/share", post(http_share_vision))
        .route("/api/visions/:vision_id/unshare", post(http_unshare_vision))
        .route("/api/visions/:vision_id/replies", post(http_create_reply))
        .route("/api/users", get(http_list_users))
        .route("/api/users/:user_id", get(http_get_user))
        .route("/api/users/:user_id/groups", post(http_join_group))
        .route(
            "/api/users/:user_id/groups/:group",
            delete(http_leave_group),
        )
        .route("/api/moments", post(http_import_moment))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| error_response(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok("ok")
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResponse<LoginResponse> {
    let response = login(&state.api, &req).await.map_err(error_response)?;
    Ok(Json(response))
}

async fn http_list_visions(State(state): State<Arc<AppState>>) -> ApiResponse<Vec<VisionPayload>> {
    let visions = list_visions(&state.api).await.map_err(error_response)?;
    Ok(Json(visions))
}

async fn http_create_vision(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVisionRequest>,
) -> ApiResponse<VisionPayload> {
    let vision = create_vision(&state.api, &req)
        .await
        .map_err(error_response)?;
    Ok(Json(vision))
}

async fn http_get_vision(
    State(state): State<Arc<AppState>>,
    Path(vision_id): Path<i64>,
) -> ApiResponse<VisionPayload> {
    let vision = get_vision(&state.api, VisionId(vision_id))
        .await
        .map_err(error_response)?;
    Ok(Json(vision))
}

async fn http_support_vision(
    State(state): State<Arc<AppState>>,
    Path(vision_id): Path<i64>,
    Json(req): Json<ActorRequest>,
) -> ApiResponse<VisionPayload> {
    let vision = support_vision(&state.api, VisionId(vision_id), req.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(vision))
}

async fn http_unsupport_vision(
    State(state): State<Arc<AppState>>,
    Path(vision_id): Path<i64>,
    Json(req): Json<ActorRequest>,
) -> ApiResponse<VisionPayload> {
    let vision = unsupport_vision(&state.api, VisionId(vision_id), req.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(vision))
}

async fn http_share_vision(
    State(state): State<Arc<AppState>>,
    Path(vision_id): Path<i64>,
    Json(req): Json<ShareRequest>,
) -> ApiResponse<VisionPayload> {
    let vision = share_vision(
        &state.api,
        VisionId(vision_id),
        req.user_id,
        req.tweet_id.as_deref(),
    )
    .await
    .map_err(error_response)?;
    Ok(Json(vision))
}

async fn http_unshare_vision(
    State(state): State<Arc<AppState>>,
    Path(vision_id): Path<i64>,
    Json(req): Json<ActorRequest>,
) -> ApiResponse<VisionPayload> {
    let vision = unshare_vision(&state.api, VisionId(vision_id), req.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(vision))
}

async fn http_create_reply(
    State(state): State<Arc<AppState>>,
    Path(vision_id): Path<i64>,
    Json(req): Json<CreateReplyRequest>,
) -> ApiResponse<ReplyPayload> {
    let reply = create_reply(&state.api, VisionId(vision_id), &req)
        .await
        .map_err(error_response)?;
    Ok(Json(reply))
}

async fn http_list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResponse<Vec<UserPayload>> {
    let visible_only = query.visible_on_home.unwrap_or(false);
    let users = list_users(&state.api, visible_only)
        .await
        .map_err(error_response)?;
    Ok(Json(users))
}

async fn http_get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> ApiResponse<UserPayload> {
    let user = get_user(&state.api, UserId(user_id))
        .await
        .map_err(error_response)?;
    Ok(Json(user))
}

async fn http_join_group(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(req): Json<JoinGroupRequest>,
) -> ApiResponse<UserPayload> {
    let user = join_group(&state.api, UserId(user_id), &req.group)
        .await
        .map_err(error_response)?;
    Ok(Json(user))
}

async fn http_leave_group(
    State(state): State<Arc<AppState>>,
    Path((user_id, group)): Path<(i64, String)>,
) -> ApiResponse<UserPayload> {
    let user = leave_group(&state.api, UserId(user_id), &group)
        .await
        .map_err(error_response)?;
    Ok(Json(user))
}

async fn http_import_moment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportMomentRequest>,
) -> ApiResponse<MomentPayload> {
    let moment = import_moment(&state.api, &req.tweet)
        .await
        .map_err(error_response)?;
    Ok(Json(moment))
}
