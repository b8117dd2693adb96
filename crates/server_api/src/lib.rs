use std::collections::HashMap;

use serde_json::Value;
use shared::{
    domain::{MomentId, UserId, VisionId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateReplyRequest, CreateVisionRequest, LoginRequest, LoginResponse, MomentPayload,
        ReplyPayload, UserPayload, UserRef, VisionPayload, MAX_CATEGORY_CHARS, MAX_REPLY_CHARS,
        MAX_TWEET_ID_CHARS,
    },
};
use storage::{Storage, StoredMoment, StoredReply, StoredUser, StoredUserRef, StoredVision};
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn login(ctx: &ApiContext, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "username is required"));
    }
    let full_name = match request.full_name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.trim(),
        _ => username,
    };

    let user_id = ctx
        .storage
        .create_user(username, full_name, None)
        .await
        .map_err(internal)?;
    let user = require_user(ctx, user_id).await?;
    info!(user_id = user_id.0, username, "user logged in");
    Ok(LoginResponse {
        user: user_payload(user),
    })
}

pub async fn list_visions(ctx: &ApiContext) -> Result<Vec<VisionPayload>, ApiError> {
    let visions = ctx.storage.list_visions().await.map_err(internal)?;

    // One import batch often shares an inspiration moment, so cache
    // lookups across the list.
    let mut moment_cache: HashMap<MomentId, MomentPayload> = HashMap::new();
    let mut payloads = Vec::with_capacity(visions.len());
    for vision in visions {
        payloads.push(hydrate_vision(ctx, vision, &mut moment_cache).await?);
    }
    Ok(payloads)
}

pub async fn get_vision(ctx: &ApiContext, vision_id: VisionId) -> Result<VisionPayload, ApiError> {
    let vision = require_vision(ctx, vision_id).await?;
    hydrate_vision(ctx, vision, &mut HashMap::new()).await
}

pub async fn create_vision(
    ctx: &ApiContext,
    request: &CreateVisionRequest,
) -> Result<VisionPayload, ApiError> {
    require_actor(ctx, request.author).await?;

    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "vision text is required"));
    }
    let category = match request.category.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(label) if label.chars().count() > MAX_CATEGORY_CHARS => {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("category is limited to {MAX_CATEGORY_CHARS} characters"),
            ));
        }
        Some(label) => Some(label),
    };
    if let Some(moment_id) = request.inspiration {
        ctx.storage
            .get_moment(moment_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "inspiration moment not found"))?;
    }

    let vision_id = ctx
        .storage
        .create_vision(request.author, category, text, request.inspiration)
        .await
        .map_err(internal)?;
    info!(
        vision_id = vision_id.0,
        author = request.author.0,
        category = category.unwrap_or(""),
        "vision created"
    );
    get_vision(ctx, vision_id).await
}

pub async fn support_vision(
    ctx: &ApiContext,
    vision_id: VisionId,
    user_id: UserId,
) -> Result<VisionPayload, ApiError> {
    require_vision(ctx, vision_id).await?;
    require_actor(ctx, user_id).await?;
    ctx.storage
        .add_supporter(vision_id, user_id)
        .await
        .map_err(internal)?;
    info!(vision_id = vision_id.0, user_id = user_id.0, "vision supported");
    get_vision(ctx, vision_id).await
}

pub async fn unsupport_vision(
    ctx: &ApiContext,
    vision_id: VisionId,
    user_id: UserId,
) -> Result<VisionPayload, ApiError> {
    require_vision(ctx, vision_id).await?;
    require_actor(ctx, user_id).await?;
    ctx.storage
        .remove_supporter(vision_id, user_id)
        .await
        .map_err(internal)?;
    info!(vision_id = vision_id.0, user_id = user_id.0, "vision unsupported");
    get_vision(ctx, vision_id).await
}

pub async fn share_vision(
    ctx: &ApiContext,
    vision_id: VisionId,
    user_id: UserId,
    tweet_id: Option<&str>,
) -> Result<VisionPayload, ApiError> {
    require_vision(ctx, vision_id).await?;
    require_actor(ctx, user_id).await?;
    if let Some(tweet_id) = tweet_id {
        validate_tweet_id(tweet_id)?;
    }
    ctx.storage
        .upsert_share(vision_id, user_id, tweet_id)
        .await
        .map_err(internal)?;
    info!(vision_id = vision_id.0, user_id = user_id.0, "vision shared");
    get_vision(ctx, vision_id).await
}

pub async fn unshare_vision(
    ctx: &ApiContext,
    vision_id: VisionId,
    user_id: UserId,
) -> Result<VisionPayload, ApiError> {
    require_vision(ctx, vision_id).await?;
    require_actor(ctx, user_id).await?;
    let removed = ctx
        .storage
        .delete_share(vision_id, user_id)
        .await
        .map_err(internal)?;
    if removed == 0 {
        return Err(ApiError::new(ErrorCode::NotFound, "share not found"));
    }
    info!(vision_id = vision_id.0, user_id = user_id.0, "vision unshared");
    get_vision(ctx, vision_id).await
}

pub async fn create_reply(
    ctx: &ApiContext,
    vision_id: VisionId,
    request: &CreateReplyRequest,
) -> Result<ReplyPayload, ApiError> {
    require_vision(ctx, vision_id).await?;
    require_actor(ctx, request.author).await?;

    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "reply text is required"));
    }
    if text.chars().count() > MAX_REPLY_CHARS {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("replies are limited to {MAX_REPLY_CHARS} characters"),
        ));
    }

    let reply_id = ctx
        .storage
        .create_reply(vision_id, request.author, text)
        .await
        .map_err(internal)?;
    info!(
        reply_id = reply_id.0,
        vision_id = vision_id.0,
        author = request.author.0,
        "reply created"
    );

    let replies = ctx
        .storage
        .replies_for_vision(vision_id)
        .await
        .map_err(internal)?;
    replies
        .into_iter()
        .find(|r| r.id == reply_id)
        .map(reply_payload)
        .ok_or_else(|| {
            ApiError::new(ErrorCode::Internal, "stored reply vanished during hydration")
        })
}

pub async fn list_users(ctx: &ApiContext, visible_only: bool) -> Result<Vec<UserPayload>, ApiError> {
    let users = ctx
        .storage
        .list_users(visible_only)
        .await
        .map_err(internal)?;
    Ok(users.into_iter().map(user_payload).collect())
}

pub async fn get_user(ctx: &ApiContext, user_id: UserId) -> Result<UserPayload, ApiError> {
    let user = require_user(ctx, user_id).await?;
    Ok(user_payload(user))
}

pub async fn join_group(
    ctx: &ApiContext,
    user_id: UserId,
    group: &str,
) -> Result<UserPayload, ApiError> {
    require_user(ctx, user_id).await?;
    let group = group.trim();
    if group.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "group name is required"));
    }
    ctx.storage
        .add_user_to_group(user_id, group)
        .await
        .map_err(internal)?;
    info!(user_id = user_id.0, group, "user joined group");
    get_user(ctx, user_id).await
}

pub async fn leave_group(
    ctx: &ApiContext,
    user_id: UserId,
    group: &str,
) -> Result<UserPayload, ApiError> {
    require_user(ctx, user_id).await?;
    ctx.storage
        .remove_user_from_group(user_id, group.trim())
        .await
        .map_err(internal)?;
    info!(user_id = user_id.0, group, "user left group");
    get_user(ctx, user_id).await
}

/// Accepts whatever the firehose delivers: a bare id as a number or a
/// decimal string, or a whole tweet object. Bare ids record a stub
/// moment whose text fills in when the full tweet arrives later.
pub async fn import_moment(ctx: &ApiContext, tweet: &Value) -> Result<MomentPayload, ApiError> {
    let fields = tweet_fields(tweet)?;
    let moment_id = ctx
        .storage
        .upsert_moment_by_tweet_id(
            &fields.tweet_id,
            &fields.username,
            &fields.text,
            fields.media_url.as_deref(),
        )
        .await
        .map_err(internal)?;
    info!(
        moment_id = moment_id.0,
        tweet_id = fields.tweet_id.as_str(),
        "moment imported"
    );

    let moment = ctx
        .storage
        .get_moment(moment_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "stored moment vanished"))?;
    Ok(moment_payload(moment))
}

struct TweetFields {
    tweet_id: String,
    username: String,
    text: String,
    media_url: Option<String>,
}

fn tweet_fields(tweet: &Value) -> Result<TweetFields, ApiError> {
    let tweet_id = tweet_id_of(tweet)?;
    validate_tweet_id(&tweet_id)?;

    let Value::Object(object) = tweet else {
        // Bare id, nothing more to record yet.
        return Ok(TweetFields {
            tweet_id,
            username: String::new(),
            text: String::new(),
            media_url: None,
        });
    };

    let username = object
        .get("user")
        .and_then(|u| u.get("screen_name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let text = object
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let media_url = first_photo_url(object);

    Ok(TweetFields {
        tweet_id,
        username,
        text,
        media_url,
    })
}

fn tweet_id_of(tweet: &Value) -> Result<String, ApiError> {
    match tweet {
        Value::Number(n) => n
            .as_i64()
            .filter(|id| *id >= 0)
            .map(|id| id.to_string())
            .ok_or_else(|| ApiError::new(ErrorCode::Validation, "tweet id must be a whole number")),
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Object(object) => match object.get("id") {
            Some(id @ (Value::Number(_) | Value::String(_))) => tweet_id_of(id),
            _ => Err(ApiError::new(
                ErrorCode::Validation,
                "tweet object is missing an id",
            )),
        },
        _ => Err(ApiError::new(
            ErrorCode::Validation,
            "expected a tweet id or tweet object",
        )),
    }
}

fn first_photo_url(tweet: &serde_json::Map<String, Value>) -> Option<String> {
    tweet
        .get("entities")?
        .get("media")?
        .as_array()?
        .iter()
        .find(|m| m.get("type").and_then(Value::as_str) == Some("photo"))?
        .get("media_url")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn validate_tweet_id(tweet_id: &str) -> Result<(), ApiError> {
    if tweet_id.chars().count() > MAX_TWEET_ID_CHARS {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("tweet id is limited to {MAX_TWEET_ID_CHARS} characters"),
        ));
    }
    Ok(())
}

async fn hydrate_vision(
    ctx: &ApiContext,
    vision: StoredVision,
    moment_cache: &mut HashMap<MomentId, MomentPayload>,
) -> Result<VisionPayload, ApiError> {
    let supporters = ctx
        .storage
        .supporters_for_vision(vision.id)
        .await
        .map_err(internal)?;
    let sharers = ctx
        .storage
        .sharers_for_vision(vision.id)
        .await
        .map_err(internal)?;
    let replies = ctx
        .storage
        .replies_for_vision(vision.id)
        .await
        .map_err(internal)?;

    let inspiration = match vision.inspiration_id {
        Some(moment_id) => {
            if let Some(cached) = moment_cache.get(&moment_id) {
                Some(cached.clone())
            } else {
                let moment = ctx
                    .storage
                    .get_moment(moment_id)
                    .await
                    .map_err(internal)?
                    .map(moment_payload);
                if let Some(ref payload) = moment {
                    moment_cache.insert(moment_id, payload.clone());
                }
                moment
            }
        }
        None => None,
    };

    Ok(VisionPayload {
        id: vision.id,
        author: vision.author.id,
        author_details: user_ref_payload(vision.author),
        category: vision.category,
        text: vision.text,
        featured: vision.featured,
        inspiration,
        supporters: supporters.into_iter().map(user_ref_payload).collect(),
        sharers,
        replies: replies.into_iter().map(reply_payload).collect(),
        tweet_id: vision.tweet_id,
        created_at: vision.created_at,
        updated_at: vision.updated_at,
    })
}

async fn require_vision(ctx: &ApiContext, vision_id: VisionId) -> Result<StoredVision, ApiError> {
    ctx.storage
        .get_vision(vision_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "vision not found"))
}

async fn require_user(ctx: &ApiContext, user_id: UserId) -> Result<StoredUser, ApiError> {
    ctx.storage
        .get_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "user not found"))
}

/// Every mutation names an acting user. An id we have never seen
/// means the caller skipped sign-in.
async fn require_actor(ctx: &ApiContext, user_id: UserId) -> Result<StoredUser, ApiError> {
    ctx.storage
        .get_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "sign in first"))
}

fn user_payload(user: StoredUser) -> UserPayload {
    UserPayload {
        id: user.id,
        username: user.username,
        full_name: user.full_name,
        avatar_url: user.avatar_url,
        groups: user.groups,
        visible_on_home: user.visible_on_home,
        date_joined: user.date_joined,
    }
}

fn user_ref_payload(user: StoredUserRef) -> UserRef {
    UserRef {
        id: user.id,
        username: user.username,
        full_name: user.full_name,
        avatar_url: user.avatar_url,
    }
}

fn reply_payload(reply: StoredReply) -> ReplyPayload {
    ReplyPayload {
        id: reply.id,
        vision_id: reply.vision_id,
        author: reply.author.id,
        author_details: user_ref_payload(reply.author),
        text: reply.text,
        tweet_id: reply.tweet_id,
        created_at: reply.created_at,
        updated_at: reply.updated_at,
    }
}

fn moment_payload(moment: StoredMoment) -> MomentPayload {
    MomentPayload {
        id: moment.id,
        tweet_id: moment.tweet_id,
        username: moment.username,
        text: moment.text,
        media_url: moment.media_url,
        created_at: moment.created_at,
        updated_at: moment.updated_at,
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup() -> (ApiContext, UserId) {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let author = storage
            .create_user("louise", "Louise V", None)
            .await
            .expect("user");
        (ApiContext { storage }, author)
    }

    #[tokio::test]
    async fn login_rejects_blank_username() {
        let (ctx, _) = setup().await;
        let err = login(
            &ctx,
            &LoginRequest {
                username: "   ".into(),
                full_name: None,
            },
        )
        .await
        .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Validation));
    }

    #[tokio::test]
    async fn login_upserts_and_defaults_full_name() {
        let (ctx, _) = setup().await;
        let first = login(
            &ctx,
            &LoginRequest {
                username: "newcomer".into(),
                full_name: None,
            },
        )
        .await
        .expect("login");
        assert_eq!(first.user.full_name, "newcomer");

        let second = login(
            &ctx,
            &LoginRequest {
                username: "newcomer".into(),
                full_name: Some("New Comer".into()),
            },
        )
        .await
        .expect("login again");
        assert_eq!(second.user.id, first.user.id);
        assert_eq!(second.user.full_name, "New Comer");
    }

    #[tokio::test]
    async fn create_vision_requires_known_author() {
        let (ctx, _) = setup().await;
        let err = create_vision(
            &ctx,
            &CreateVisionRequest {
                author: UserId(4242),
                category: None,
                text: "ghost vision".into(),
                inspiration: None,
            },
        )
        .await
        .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Unauthorized));
    }

    #[tokio::test]
    async fn create_vision_validates_text_and_category() {
        let (ctx, author) = setup().await;

        let blank = create_vision(
            &ctx,
            &CreateVisionRequest {
                author,
                category: None,
                text: "  ".into(),
                inspiration: None,
            },
        )
        .await
        .expect_err("blank text");
        assert!(matches!(blank.code, ErrorCode::Validation));

        let long_category = create_vision(
            &ctx,
            &CreateVisionRequest {
                author,
                category: Some("much-too-long-category-label".into()),
                text: "fine".into(),
                inspiration: None,
            },
        )
        .await
        .expect_err("long category");
        assert!(matches!(long_category.code, ErrorCode::Validation));
    }

    #[tokio::test]
    async fn create_vision_hydrates_inspiration() {
        let (ctx, author) = setup().await;
        let moment = import_moment(
            &ctx,
            &json!({
                "id": 88001,
                "text": "the fog on market street",
                "user": {"screen_name": "civicfeed"}
            }),
        )
        .await
        .expect("moment");

        let vision = create_vision(
            &ctx,
            &CreateVisionRequest {
                author,
                category: Some("living".into()),
                text: "a market street promenade".into(),
                inspiration: Some(moment.id),
            },
        )
        .await
        .expect("vision");

        let inspiration = vision.inspiration.expect("inspiration");
        assert_eq!(inspiration.text, "the fog on market street");
        assert_eq!(vision.author_details.username, "louise");
    }

    #[tokio::test]
    async fn create_vision_rejects_unknown_inspiration() {
        let (ctx, author) = setup().await;
        let err = create_vision(
            &ctx,
            &CreateVisionRequest {
                author,
                category: None,
                text: "orphan inspiration".into(),
                inspiration: Some(MomentId(777)),
            },
        )
        .await
        .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn support_twice_counts_once_and_hydrates() {
        let (ctx, author) = setup().await;
        let fan = ctx
            .storage
            .create_user("fan", "Fan", None)
            .await
            .expect("user");
        let vision = create_vision(
            &ctx,
            &CreateVisionRequest {
                author,
                category: None,
                text: "river ferries".into(),
                inspiration: None,
            },
        )
        .await
        .expect("vision");

        support_vision(&ctx, vision.id, fan).await.expect("support");
        let supported = support_vision(&ctx, vision.id, fan)
            .await
            .expect("support twice");
        assert_eq!(supported.supporters.len(), 1);
        assert!(supported.is_supported_by(fan));

        let unsupported = unsupport_vision(&ctx, vision.id, fan)
            .await
            .expect("unsupport");
        assert!(unsupported.supporters.is_empty());
    }

    #[tokio::test]
    async fn unshare_without_share_is_not_found() {
        let (ctx, author) = setup().await;
        let vision = create_vision(
            &ctx,
            &CreateVisionRequest {
                author,
                category: None,
                text: "rooftop gardens".into(),
                inspiration: None,
            },
        )
        .await
        .expect("vision");

        let shared_payload = share_vision(&ctx, vision.id, author, Some("555001"))
            .await
            .expect("share");
        assert!(shared_payload.is_shared_by(author));

        unshare_vision(&ctx, vision.id, author)
            .await
            .expect("unshare");
        let err = unshare_vision(&ctx, vision.id, author)
            .await
            .expect_err("second unshare");
        assert!(matches!(err.code, ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn reply_is_capped_at_tweet_length() {
        let (ctx, author) = setup().await;
        let vision = create_vision(
            &ctx,
            &CreateVisionRequest {
                author,
                category: None,
                text: "front porch concerts".into(),
                inspiration: None,
            },
        )
        .await
        .expect("vision");

        let err = create_reply(
            &ctx,
            vision.id,
            &CreateReplyRequest {
                author,
                text: "x".repeat(MAX_REPLY_CHARS + 1),
            },
        )
        .await
        .expect_err("too long");
        assert!(matches!(err.code, ErrorCode::Validation));

        let reply = create_reply(
            &ctx,
            vision.id,
            &CreateReplyRequest {
                author,
                text: "count me in".into(),
            },
        )
        .await
        .expect("reply");
        assert_eq!(reply.author_details.username, "louise");

        let hydrated = get_vision(&ctx, vision.id).await.expect("vision");
        assert_eq!(hydrated.replies.len(), 1);
        assert_eq!(hydrated.replies[0].text, "count me in");
    }

    #[tokio::test]
    async fn list_users_honors_visibility_filter() {
        let (ctx, author) = setup().await;
        let hidden = ctx
            .storage
            .create_user("quiet", "Quiet Org", None)
            .await
            .expect("user");
        ctx.storage
            .set_visible_on_home(hidden, false)
            .await
            .expect("hide");

        let visible = list_users(&ctx, true).await.expect("visible");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, author);

        let everyone = list_users(&ctx, false).await.expect("everyone");
        assert_eq!(everyone.len(), 2);
    }

    #[tokio::test]
    async fn join_group_marks_user_as_ally() {
        let (ctx, author) = setup().await;
        let joined = join_group(&ctx, author, "allies").await.expect("join");
        assert!(joined.is_ally());

        let left = leave_group(&ctx, author, "allies").await.expect("leave");
        assert!(!left.is_ally());
    }

    #[tokio::test]
    async fn join_group_unknown_user_is_not_found() {
        let (ctx, _) = setup().await;
        let err = join_group(&ctx, UserId(31337), "allies")
            .await
            .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn import_moment_accepts_bare_ids() {
        let (ctx, _) = setup().await;
        let from_number = import_moment(&ctx, &json!(4567)).await.expect("number id");
        assert_eq!(from_number.tweet_id.as_deref(), Some("4567"));
        assert_eq!(from_number.text, "");

        let from_string = import_moment(&ctx, &json!("4567")).await.expect("string id");
        assert_eq!(from_string.id, from_number.id);
    }

    #[tokio::test]
    async fn import_moment_reads_first_photo() {
        let (ctx, _) = setup().await;
        let moment = import_moment(
            &ctx,
            &json!({
                "id": "3131",
                "text": "sunrise over the bridge",
                "user": {"screen_name": "civicfeed"},
                "entities": {"media": [
                    {"type": "video", "media_url": "http://img/skip.mp4"},
                    {"type": "photo", "media_url": "http://img/bridge.jpg"}
                ]}
            }),
        )
        .await
        .expect("moment");
        assert_eq!(moment.username, "civicfeed");
        assert_eq!(moment.media_url.as_deref(), Some("http://img/bridge.jpg"));
    }

    #[tokio::test]
    async fn import_moment_rejects_unusable_shapes() {
        let (ctx, _) = setup().await;
        for bad in [json!(true), json!(12.5), json!({"no_id": 1}), json!("")] {
            let err = import_moment(&ctx, &bad).await.expect_err("should fail");
            assert!(matches!(err.code, ErrorCode::Validation));
        }
    }

    #[tokio::test]
    async fn get_vision_unknown_id_is_not_found() {
        let (ctx, _) = setup().await;
        let err = get_vision(&ctx, VisionId(9000))
            .await
            .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::NotFound));
    }
}
