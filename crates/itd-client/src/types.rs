//! Records returned by the API
//!
//! Every record is a flat struct with camelCase field names on the wire.
//! The server omits fields freely depending on the endpoint, so most fields
//! are optional or defaulted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// An uploaded file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct File {
    pub id: Uuid,
    pub filename: String,
    pub url: String,
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hashtag {
    pub id: Option<Uuid>,
    pub name: String,
    pub posts_count: u64,
}

/// Profile badge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pin {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub granted_at: Option<DateTime<Utc>>,
}

/// Short user card embedded in posts, comments and notifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Author {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub verified: bool,
    pub pin: Option<Pin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    pub id: Uuid,
    /// `image`, `video` or `audio`
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Seconds, for audio and video
    pub duration: Option<u32>,
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    pub id: Uuid,
    pub content: String,
    pub author: Option<Author>,
    pub author_id: Option<Uuid>,
    pub likes_count: u64,
    pub comments_count: u64,
    pub reposts_count: u64,
    pub views_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
    pub is_liked: bool,
    pub is_reposted: bool,
    pub is_owner: bool,
    pub is_viewed: bool,
    pub is_deleted: bool,
    pub is_pinned: bool,
    /// The reposted post, when this is a repost
    pub original_post: Option<Box<Post>>,
    #[serde(alias = "walRecipientId")]
    pub wall_recipient_id: Option<Uuid>,
    #[serde(alias = "walRecipient")]
    pub wall_recipient: Option<Author>,
    /// Only filled in by the single-post endpoint
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub author: Option<Author>,
    pub created_at: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
    pub likes_count: u64,
    pub replies_count: u64,
    pub is_liked: bool,
    pub replies: Vec<Comment>,
    /// Set on replies
    pub reply_to: Option<Author>,
}

/// A user profile; which fields are present depends on the endpoint and on
/// blocking between the two users
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    pub bio: Option<String>,
    pub verified: bool,
    pub pin: Option<Pin>,
    pub followers_count: Option<u64>,
    pub following_count: Option<u64>,
    pub posts_count: Option<u64>,
    pub is_following: Option<bool>,
    pub is_followed_by: Option<bool>,
    pub is_blocked_by_me: Option<bool>,
    pub is_blocked_by_them: Option<bool>,
    pub is_private: Option<bool>,
    pub wall_closed: Option<bool>,
    pub pinned_post_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// True if either side has blocked the other
    pub fn is_blocked(&self) -> bool {
        self.is_blocked_by_me == Some(true) || self.is_blocked_by_them == Some(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Notification {
    pub id: Uuid,
    /// `reply`, `like`, `wall_post`, `follow`, `comment`, ...
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
    pub preview: Option<String>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub actor: Option<Author>,
}

/// Cursor of the next page: a number, a timestamp or an id depending on the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Number(i64),
    Text(String),
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub has_more: bool,
    pub limit: Option<u32>,
    pub next_cursor: Option<Cursor>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostsPage {
    pub posts: Vec<Post>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashtagPosts {
    pub hashtag: Option<Hashtag>,
    pub posts: Vec<Post>,
    pub pagination: Pagination,
}

/// Comments carry their pagination fields inline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentsPage {
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationsPage {
    pub has_more: bool,
    pub notifications: Vec<Notification>,
}

/// Sort order of a user's wall
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserPostsSort {
    #[default]
    New,
    Popular,
}

impl UserPostsSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Popular => "popular",
        }
    }
}

/// Posts tied to a user without being authored by them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFeed {
    /// Posts the user liked
    Liked,
    /// Posts others left on the user's wall
    Wall,
}

impl UserFeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Liked => "liked",
            Self::Wall => "wall",
        }
    }
}

/// Sort order of a comment thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommentSort {
    #[default]
    Popular,
    Newest,
    Oldest,
}

impl CommentSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::Newest => "newest",
            Self::Oldest => "oldest",
        }
    }
}

/// Page-numbered pagination used by follower, following and block lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FollowPagination {
    pub page: u32,
    pub limit: u32,
    pub total: Option<u64>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersPage {
    pub users: Vec<User>,
    pub pagination: FollowPagination,
}

/// Users and hashtags matching one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResults {
    pub users: Vec<User>,
    pub hashtags: Vec<Hashtag>,
}

/// A clan is the set of users sharing an avatar emoji
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Clan {
    pub avatar: String,
    pub member_count: u64,
}

/// Pins the caller owns and the one on display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PinsPage {
    pub active_pin: Option<String>,
    pub pins: Vec<Pin>,
}

/// Who may see or do something on the caller's profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Everyone,
    Followers,
    Mutual,
    Nobody,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Privacy {
    pub is_private: bool,
    pub wall_closed: bool,
    pub likes_visibility: Option<Audience>,
    pub wall_access: Option<Audience>,
}

/// Privacy settings to change; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes_visibility: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_access: Option<Audience>,
}

/// Profile fields to change; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Id of an uploaded file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportTarget {
    Post,
    Comment,
    User,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportReason {
    Spam,
    Violence,
    Hate,
    Adult,
    Fraud,
    #[default]
    Other,
}

/// A filed report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Report {
    pub id: Uuid,
    pub created_at: Option<DateTime<Utc>>,
}

/// First event on the notification stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedEvent {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a `notification` stream event
pub type NotificationEvent = Notification;

/// `{"data": ...}` envelope
#[derive(Debug, Deserialize)]
pub(crate) struct Data<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LikesCount {
    pub likes_count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Success {
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Count {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FollowersCount {
    pub followers_count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Hashtags {
    #[serde(default)]
    pub hashtags: Vec<Hashtag>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Users {
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Clans {
    #[serde(default)]
    pub clans: Vec<Clan>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PinSlug {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerificationStatus {
    pub status: String,
}
