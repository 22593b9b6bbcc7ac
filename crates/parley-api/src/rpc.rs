//! JSON-over-HTTP RPC surface: one `POST /rpc/<method>` route per call.
//!
//! Each handler authenticates the body's token first (401 on failure), then
//! delegates to the service. Business failures, including a body that does
//! not parse, come back as `{ "ok": false, "error": CODE }` via
//! [`ServiceError`]'s `IntoResponse`.

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde_json::{Value, json};

use parley_types::api::{
    CreateGroupReply, CreateGroupRequest, EnsurePairGroupReply, EnsurePairGroupRequest,
    EventsReply, GetMessagesRequest, GetMessagesSinceRequest, LeaveGroupRequest, LoginReply,
    LoginRequest, MessagesReply, OkReply, RegisterUserRequest, SendGroupMessageReply,
    SendGroupMessageRequest, TokenRequest, WaitEventsRequest,
};
use parley_types::models::{ConversationSummary, UserSummary};

use crate::error::ServiceError;
use crate::state::AppState;

type RpcResult<T> = Result<Json<T>, ServiceError>;

/// A JSON body whose rejection is turned into `INVALID_REQUEST` rather than
/// axum's plain-text reply.
type RpcBody<T> = Result<Json<T>, JsonRejection>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rpc/register_user", post(register_user))
        .route("/rpc/login", post(login))
        .route("/rpc/list_users", post(list_users))
        .route("/rpc/create_group", post(create_group))
        .route("/rpc/ensure_pair_group", post(ensure_pair_group))
        .route("/rpc/send_group_message", post(send_group_message))
        .route("/rpc/list_my_conversations", post(list_my_conversations))
        .route("/rpc/get_messages", post(get_messages))
        .route("/rpc/get_messages_since", post(get_messages_since))
        .route("/rpc/leave_group", post(leave_group))
        .route("/rpc/wait_events", post(wait_events))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn register_user(
    State(state): State<AppState>,
    body: RpcBody<RegisterUserRequest>,
) -> RpcResult<OkReply> {
    let Json(req) = body?;
    state.register_user(&req.email, &req.name, &req.password).await?;
    Ok(Json(OkReply::ok()))
}

pub async fn login(
    State(state): State<AppState>,
    body: RpcBody<LoginRequest>,
) -> RpcResult<LoginReply> {
    let Json(req) = body?;
    let session = state.login(&req.email, &req.password).await?;
    Ok(Json(LoginReply {
        ok: true,
        token: session.token,
        user_id: session.user_id,
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    body: RpcBody<TokenRequest>,
) -> RpcResult<Vec<UserSummary>> {
    let Json(req) = body?;
    state.authenticate(&req.token).await?;
    Ok(Json(state.list_users().await?))
}

pub async fn create_group(
    State(state): State<AppState>,
    body: RpcBody<CreateGroupRequest>,
) -> RpcResult<CreateGroupReply> {
    let Json(req) = body?;
    let me = state.authenticate(&req.token).await?;
    let conversation_id = state.create_group(me, req.title, req.member_ids).await?;
    Ok(Json(CreateGroupReply {
        ok: true,
        conversation_id,
    }))
}

pub async fn ensure_pair_group(
    State(state): State<AppState>,
    body: RpcBody<EnsurePairGroupRequest>,
) -> RpcResult<EnsurePairGroupReply> {
    let Json(req) = body?;
    let me = state.authenticate(&req.token).await?;
    let pair = state.ensure_pair_group(me, req.other_user_id).await?;
    Ok(Json(EnsurePairGroupReply {
        ok: true,
        conversation_id: pair.conversation_id,
        created: pair.created,
    }))
}

pub async fn send_group_message(
    State(state): State<AppState>,
    body: RpcBody<SendGroupMessageRequest>,
) -> RpcResult<SendGroupMessageReply> {
    let Json(req) = body?;
    let me = state.authenticate(&req.token).await?;
    let sent = state
        .send_group_message(me, req.conversation_id, req.content)
        .await?;
    Ok(Json(SendGroupMessageReply {
        ok: true,
        message_id: sent.message_id,
        llm: sent.bot_message_id.map(|_| true),
    }))
}

pub async fn list_my_conversations(
    State(state): State<AppState>,
    body: RpcBody<TokenRequest>,
) -> RpcResult<Vec<ConversationSummary>> {
    let Json(req) = body?;
    let me = state.authenticate(&req.token).await?;
    Ok(Json(state.list_my_conversations(me).await?))
}

pub async fn get_messages(
    State(state): State<AppState>,
    body: RpcBody<GetMessagesRequest>,
) -> RpcResult<MessagesReply> {
    let Json(req) = body?;
    let me = state.authenticate(&req.token).await?;
    let messages = state
        .get_messages(me, req.conversation_id, req.limit, req.offset)
        .await?;
    Ok(Json(MessagesReply { ok: true, messages }))
}

pub async fn get_messages_since(
    State(state): State<AppState>,
    body: RpcBody<GetMessagesSinceRequest>,
) -> RpcResult<MessagesReply> {
    let Json(req) = body?;
    let me = state.authenticate(&req.token).await?;
    let messages = state
        .get_messages_since(me, req.conversation_id, req.after_id)
        .await?;
    Ok(Json(MessagesReply { ok: true, messages }))
}

pub async fn leave_group(
    State(state): State<AppState>,
    body: RpcBody<LeaveGroupRequest>,
) -> RpcResult<OkReply> {
    let Json(req) = body?;
    let me = state.authenticate(&req.token).await?;
    state.leave_group(me, req.conversation_id).await?;
    Ok(Json(OkReply::ok()))
}

/// Long-poll. If the client goes away axum drops this future, which ends
/// the wait.
pub async fn wait_events(
    State(state): State<AppState>,
    body: RpcBody<WaitEventsRequest>,
) -> RpcResult<EventsReply> {
    let Json(req) = body?;
    let me = state.authenticate(&req.token).await?;
    let timeout = req.timeout_ms.map(Duration::from_millis);
    let events = state.wait_events(me, req.after_event_id, timeout).await?;
    Ok(Json(EventsReply { ok: true, events }))
}
