use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MomentId, ReplyId, UserId, VisionId, ALLIES_GROUP};

/// Longest category label a vision may carry.
pub const MAX_CATEGORY_CHARS: usize = 20;
/// Replies are tweet-sized.
pub const MAX_REPLY_CHARS: usize = 140;
/// Tweet ids are stored as opaque decimal strings.
pub const MAX_TWEET_ID_CHARS: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub visible_on_home: bool,
    pub date_joined: DateTime<Utc>,
}

impl UserPayload {
    pub fn in_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g == name)
    }

    pub fn is_ally(&self) -> bool {
        self.in_group(ALLIES_GROUP)
    }
}

/// Compact user reference embedded in visions, replies and supporter
/// lists, so hydrated payloads stay small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentPayload {
    pub id: MomentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
    pub username: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub id: ReplyId,
    pub vision_id: VisionId,
    pub author: UserId,
    pub author_details: UserRef,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionPayload {
    pub id: VisionId,
    pub author: UserId,
    pub author_details: UserRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub text: String,
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspiration: Option<MomentPayload>,
    #[serde(default)]
    pub supporters: Vec<UserRef>,
    #[serde(default)]
    pub sharers: Vec<UserId>,
    #[serde(default)]
    pub replies: Vec<ReplyPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VisionPayload {
    /// Category filtering is case-insensitive. Visions with no
    /// category never match any label.
    pub fn matches_category(&self, label: &str) -> bool {
        match &self.category {
            Some(category) => category.eq_ignore_ascii_case(label),
            None => false,
        }
    }

    pub fn is_supported_by(&self, user_id: UserId) -> bool {
        self.supporters.iter().any(|s| s.id == user_id)
    }

    pub fn is_shared_by(&self, user_id: UserId) -> bool {
        self.sharers.contains(&user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVisionRequest {
    pub author: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspiration: Option<MomentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReplyRequest {
    pub author: UserId,
    pub text: String,
}

/// Body for endpoints that only need to know who is acting, e.g.
/// support and unsupport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRequest {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGroupRequest {
    pub group: String,
}

/// A moment import accepts either a bare tweet id (number or string)
/// or a whole tweet object, mirroring what the upstream firehose
/// hands us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportMomentRequest {
    pub tweet: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_on_home: Option<bool>,
}
