//! ITD API client
//!
//! Endpoint methods are thin: check arguments locally, build an
//! [`ApiRequest`], send it through the [`RequestExecutor`], decode the JSON.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::Session;
use crate::config::SessionOptions;
use crate::error::{ApiError, Error, Result};
use crate::executor::RequestExecutor;
use crate::http::{FilePart, HttpClient, HttpResponse, ReqwestClient};
use crate::request::ApiRequest;
use crate::stream::NotificationStream;
use crate::time::Clock;
use crate::types::{
    Clan, Clans, Comment, CommentSort, CommentsPage, Count, Cursor, Data, File, FollowersCount,
    Hashtag, HashtagPosts, Hashtags, LikesCount, NotificationsPage, PinSlug, PinsPage, Post,
    PostsPage, Privacy, PrivacyUpdate, ProfileUpdate, Report, ReportReason, ReportTarget,
    SearchResults, Success, User, UserFeed, UserPostsSort, Users, UsersPage, VerificationStatus,
};

const MAX_LIMIT: u32 = 50;
const MAX_SEARCH_LIMIT: u32 = 20;
const MAX_CONTENT_CHARS: usize = 5_000;
const MAX_POST_ATTACHMENTS: usize = 10;
const MAX_COMMENT_ATTACHMENTS: usize = 4;
const MAX_SEARCH_CHARS: usize = 100;

/// A post to be created
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub content: String,
    pub attachment_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_recipient_id: Option<Uuid>,
}

impl NewPost {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn attachment(mut self, file_id: Uuid) -> Self {
        self.attachment_ids.push(file_id);
        self
    }

    /// Posts on another user's wall
    pub fn on_wall_of(mut self, user_id: Uuid) -> Self {
        self.wall_recipient_id = Some(user_id);
        self
    }
}

/// Client for the ITD API
pub struct ItdClient<H: HttpClient = ReqwestClient> {
    executor: RequestExecutor<H>,
    upload_timeout: Duration,
}

impl ItdClient {
    /// Creates a client for the public host with default options
    pub fn new(refresh_token: impl Into<String>) -> Result<Self> {
        Self::with_options(refresh_token, SessionOptions::default())
    }

    pub fn with_options(refresh_token: impl Into<String>, options: SessionOptions) -> Result<Self> {
        Self::with_http_client(refresh_token, ReqwestClient::new(), options)
    }
}

impl<H: HttpClient> ItdClient<H> {
    /// Creates a client on a custom transport
    pub fn with_http_client(
        refresh_token: impl Into<String>,
        http: H,
        options: SessionOptions,
    ) -> Result<Self> {
        let session = Session::new(refresh_token, http, &options)?;
        Ok(Self::from_session(session, &options))
    }

    /// Wraps an existing session, e.g. one seeded with a stored access token
    pub fn from_session(session: Session<H>, options: &SessionOptions) -> Self {
        Self {
            executor: RequestExecutor::new(session, options),
            upload_timeout: options.upload_timeout,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.executor = self.executor.with_clock(clock);
        self
    }

    pub fn session(&self) -> &Session<H> {
        self.executor.session()
    }

    /// Sends an arbitrary request with the usual authentication handling
    pub async fn send(&self, request: &ApiRequest) -> Result<HttpResponse> {
        self.executor.send(request).await
    }

    /// Closes the session and its transport
    pub async fn close(&self) {
        self.executor.close().await;
    }

    async fn json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        Ok(self.executor.send(&request).await?.json()?)
    }

    async fn data<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let Data { data } = self.json(request).await?;
        Ok(data)
    }

    async fn call(&self, request: ApiRequest) -> Result<()> {
        self.executor.send(&request).await?;
        Ok(())
    }

    // Auth

    /// Obtains a fresh access token
    pub async fn refresh(&self) -> Result<String> {
        self.session().refresh().await
    }

    /// Revokes the refresh token
    pub async fn logout(&self) -> Result<()> {
        self.session().logout().await
    }

    /// Changes the password; the server revokes the refresh token on success
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        if !valid_password(new_password) {
            return Err(ApiError::InvalidPassword.into());
        }

        self.call(ApiRequest::post("api/v1/auth/change-password").json(&json!({
            "oldPassword": old_password,
            "newPassword": new_password,
        })))
        .await
    }

    // Files

    /// Uploads an image, video or audio file
    pub async fn upload_file(
        &self,
        filename: impl Into<String>,
        mime_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<File> {
        if let Some(mime) = mime_type {
            if !valid_media_type(mime) {
                return Err(ApiError::validation(format!("unsupported file type {mime}")).into());
            }
        }

        let file = FilePart {
            field: "file".into(),
            filename: filename.into(),
            mime_type: mime_type.map(str::to_owned),
            bytes,
        };
        self.json(
            ApiRequest::post("api/files/upload")
                .file(file)
                .timeout(self.upload_timeout),
        )
        .await
    }

    pub async fn get_file(&self, file_id: Uuid) -> Result<File> {
        self.json(ApiRequest::get(format!("api/files/{file_id}"))).await
    }

    pub async fn delete_file(&self, file_id: Uuid) -> Result<()> {
        self.call(ApiRequest::delete(format!("api/files/{file_id}"))).await
    }

    // Hashtags

    pub async fn trending_hashtags(&self, limit: u32) -> Result<Vec<Hashtag>> {
        check_limit(limit)?;
        let Hashtags { hashtags } = self
            .data(ApiRequest::get("api/hashtags/trending").query("limit", limit))
            .await?;
        Ok(hashtags)
    }

    pub async fn search_hashtags(&self, query: &str, limit: u32) -> Result<Vec<Hashtag>> {
        check_limit(limit)?;
        check_search(query)?;
        let Hashtags { hashtags } = self
            .data(
                ApiRequest::get("api/hashtags")
                    .query("q", query)
                    .query("limit", limit),
            )
            .await?;
        Ok(hashtags)
    }

    /// Posts tagged with `name`; `cursor` is the id of the last post seen
    pub async fn posts_by_hashtag(
        &self,
        name: &str,
        cursor: Option<Uuid>,
        limit: u32,
    ) -> Result<HashtagPosts> {
        check_limit(limit)?;
        let not_found = || ApiError::NotFound {
            message: format!("hashtag '{name}' not found"),
        };
        if name.is_empty() {
            return Err(not_found().into());
        }
        if !valid_hashtag_name(name) {
            return Err(ApiError::validation(format!("invalid hashtag name '{name}'")).into());
        }

        let request = ApiRequest::get(format!("api/hashtags/{}/posts", urlencoding::encode(name)))
            .query("limit", limit)
            .query_opt("cursor", cursor);
        let page: HashtagPosts = match self.data(request).await {
            Err(Error::Api(ApiError::NotFound { .. })) => return Err(not_found().into()),
            other => other?,
        };
        if page.hashtag.is_none() {
            return Err(not_found().into());
        }
        Ok(page)
    }

    // Posts

    pub async fn get_post(&self, post_id: Uuid) -> Result<Post> {
        self.data(ApiRequest::get(format!("api/posts/{post_id}"))).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        check_content(&post.content)?;
        if post.attachment_ids.len() > MAX_POST_ATTACHMENTS {
            return Err(ApiError::validation(format!(
                "at most {MAX_POST_ATTACHMENTS} attachments allowed per post"
            ))
            .into());
        }
        if post.content.is_empty() && post.attachment_ids.is_empty() {
            return Err(ApiError::validation("content or attachments required").into());
        }

        self.json(ApiRequest::post("api/posts").json(post)).await
    }

    pub async fn update_post(&self, post_id: Uuid, content: &str) -> Result<Post> {
        check_content(content)?;
        if content.is_empty() {
            return Err(ApiError::validation("content must not be empty").into());
        }

        self.json(ApiRequest::put(format!("api/posts/{post_id}")).json(&json!({"content": content})))
            .await
    }

    pub async fn delete_post(&self, post_id: Uuid) -> Result<()> {
        self.call(ApiRequest::delete(format!("api/posts/{post_id}"))).await
    }

    pub async fn restore_post(&self, post_id: Uuid) -> Result<()> {
        self.call(ApiRequest::post(format!("api/posts/{post_id}/restore")))
            .await
    }

    /// Likes a post; returns the new like count
    pub async fn like_post(&self, post_id: Uuid) -> Result<u64> {
        let LikesCount { likes_count } = self
            .json(ApiRequest::post(format!("api/posts/{post_id}/like")))
            .await?;
        Ok(likes_count)
    }

    pub async fn unlike_post(&self, post_id: Uuid) -> Result<u64> {
        let LikesCount { likes_count } = self
            .json(ApiRequest::delete(format!("api/posts/{post_id}/like")))
            .await?;
        Ok(likes_count)
    }

    pub async fn view_post(&self, post_id: Uuid) -> Result<()> {
        self.call(ApiRequest::post(format!("api/posts/{post_id}/view")))
            .await
    }

    /// Pins a post to the caller's own wall
    pub async fn pin_post(&self, post_id: Uuid) -> Result<bool> {
        let Success { success } = self
            .json(ApiRequest::post(format!("api/posts/{post_id}/pin")))
            .await?;
        Ok(success)
    }

    pub async fn unpin_post(&self, post_id: Uuid) -> Result<bool> {
        let Success { success } = self
            .json(ApiRequest::delete(format!("api/posts/{post_id}/pin")))
            .await?;
        Ok(success)
    }

    pub async fn repost(&self, post_id: Uuid, content: &str) -> Result<Post> {
        check_content(content)?;
        self.json(
            ApiRequest::post(format!("api/posts/{post_id}/repost"))
                .json(&json!({"content": content})),
        )
        .await
    }

    /// Feed of followed users; `cursor` is the creation time of the last post seen
    pub async fn following_posts(
        &self,
        cursor: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<PostsPage> {
        check_limit(limit)?;
        self.data(
            ApiRequest::get("api/posts")
                .query("tab", "following")
                .query("limit", limit)
                .query_opt("cursor", cursor.map(format_cursor_time)),
        )
        .await
    }

    /// Popular feed; `cursor` is the page offset returned by the previous call
    pub async fn popular_posts(&self, cursor: Option<i64>, limit: u32) -> Result<PostsPage> {
        check_limit(limit)?;
        self.data(
            ApiRequest::get("api/posts")
                .query("tab", "popular")
                .query("limit", limit)
                .query_opt("cursor", cursor),
        )
        .await
    }

    pub async fn user_posts(
        &self,
        username: &str,
        sort: UserPostsSort,
        cursor: Option<&Cursor>,
        limit: u32,
    ) -> Result<PostsPage> {
        check_limit(limit)?;
        check_username(username)?;
        self.data(
            ApiRequest::get(format!("api/posts/user/{}", urlencoding::encode(username)))
                .query("sort", sort.as_str())
                .query("limit", limit)
                .query_opt("cursor", cursor),
        )
        .await
    }

    /// Posts `username` liked, or posts others left on their wall, newest first
    pub async fn user_feed(
        &self,
        username: &str,
        feed: UserFeed,
        cursor: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<PostsPage> {
        check_limit(limit)?;
        check_username(username)?;
        self.data(
            ApiRequest::get(format!(
                "api/posts/user/{}/{}",
                urlencoding::encode(username),
                feed.as_str()
            ))
            .query("sort", UserPostsSort::New.as_str())
            .query("limit", limit)
            .query_opt("cursor", cursor.map(format_cursor_time)),
        )
        .await
    }

    // Comments

    pub async fn post_comments(
        &self,
        post_id: Uuid,
        sort: CommentSort,
        cursor: Option<&Cursor>,
        limit: u32,
    ) -> Result<CommentsPage> {
        check_limit(limit)?;
        self.data(
            ApiRequest::get(format!("api/posts/{post_id}/comments"))
                .query("sort", sort.as_str())
                .query("limit", limit)
                .query_opt("cursor", cursor),
        )
        .await
    }

    pub async fn comment(
        &self,
        post_id: Uuid,
        content: &str,
        attachment_ids: &[Uuid],
    ) -> Result<Comment> {
        check_comment(content, attachment_ids)?;
        self.json(
            ApiRequest::post(format!("api/posts/{post_id}/comments")).json(&json!({
                "content": content,
                "attachmentIds": attachment_ids,
            })),
        )
        .await
    }

    /// Replies to a comment, optionally addressing a specific user
    pub async fn reply(
        &self,
        comment_id: Uuid,
        content: &str,
        reply_to_user_id: Option<Uuid>,
        attachment_ids: &[Uuid],
    ) -> Result<Comment> {
        check_comment(content, attachment_ids)?;
        let mut body = json!({
            "content": content,
            "attachmentIds": attachment_ids,
        });
        if let Some(user_id) = reply_to_user_id {
            body["replyToUserId"] = json!(user_id);
        }

        self.json(ApiRequest::post(format!("api/comments/{comment_id}/replies")).json(&body))
            .await
    }

    pub async fn delete_comment(&self, comment_id: Uuid) -> Result<()> {
        self.call(ApiRequest::delete(format!("api/comments/{comment_id}")))
            .await
    }

    pub async fn restore_comment(&self, comment_id: Uuid) -> Result<()> {
        self.call(ApiRequest::post(format!("api/comments/{comment_id}/restore")))
            .await
    }

    pub async fn like_comment(&self, comment_id: Uuid) -> Result<u64> {
        let LikesCount { likes_count } = self
            .json(ApiRequest::post(format!("api/comments/{comment_id}/like")))
            .await?;
        Ok(likes_count)
    }

    pub async fn unlike_comment(&self, comment_id: Uuid) -> Result<u64> {
        let LikesCount { likes_count } = self
            .json(ApiRequest::delete(format!("api/comments/{comment_id}/like")))
            .await?;
        Ok(likes_count)
    }

    // Users

    pub async fn get_me(&self) -> Result<User> {
        self.json(ApiRequest::get("api/users/me")).await
    }

    /// Profile of `username`; check [`User::is_blocked`] before relying on
    /// the counters
    pub async fn get_user(&self, username: &str) -> Result<User> {
        check_username(username)?;
        self.json(ApiRequest::get(format!(
            "api/users/{}",
            urlencoding::encode(username)
        )))
        .await
    }

    /// Follows a user; returns their follower count
    pub async fn follow(&self, username: &str) -> Result<u64> {
        check_username(username)?;
        let FollowersCount { followers_count } = self
            .json(ApiRequest::post(format!(
                "api/users/{}/follow",
                urlencoding::encode(username)
            )))
            .await?;
        Ok(followers_count)
    }

    pub async fn unfollow(&self, username: &str) -> Result<u64> {
        check_username(username)?;
        let FollowersCount { followers_count } = self
            .json(ApiRequest::delete(format!(
                "api/users/{}/follow",
                urlencoding::encode(username)
            )))
            .await?;
        Ok(followers_count)
    }

    pub async fn block(&self, username: &str) -> Result<()> {
        check_username(username)?;
        self.call(ApiRequest::post(format!(
            "api/users/{}/block",
            urlencoding::encode(username)
        )))
        .await
    }

    pub async fn unblock(&self, username: &str) -> Result<()> {
        check_username(username)?;
        self.call(ApiRequest::delete(format!(
            "api/users/{}/block",
            urlencoding::encode(username)
        )))
        .await
    }

    pub async fn search_users(&self, query: &str, limit: u32) -> Result<Vec<User>> {
        check_limit(limit)?;
        check_search(query)?;
        let Users { users } = self
            .data(
                ApiRequest::get("api/users/search")
                    .query("q", query)
                    .query("limit", limit),
            )
            .await?;
        Ok(users)
    }

    /// Users and hashtags matching `query` in one call
    pub async fn search(
        &self,
        query: &str,
        user_limit: u32,
        hashtag_limit: u32,
    ) -> Result<SearchResults> {
        check_limit_up_to(user_limit, MAX_SEARCH_LIMIT)?;
        check_limit_up_to(hashtag_limit, MAX_SEARCH_LIMIT)?;
        check_search(query)?;
        self.data(
            ApiRequest::get("api/search/")
                .query("userLimit", user_limit)
                .query("hashtagsLimit", hashtag_limit)
                .query("q", query),
        )
        .await
    }

    pub async fn followers(&self, username: &str, page: u32, limit: u32) -> Result<UsersPage> {
        self.follow_list(username, "followers", page, limit).await
    }

    pub async fn following(&self, username: &str, page: u32, limit: u32) -> Result<UsersPage> {
        self.follow_list(username, "following", page, limit).await
    }

    async fn follow_list(
        &self,
        username: &str,
        list: &str,
        page: u32,
        limit: u32,
    ) -> Result<UsersPage> {
        check_limit(limit)?;
        check_page(page)?;
        check_username(username)?;
        self.data(
            ApiRequest::get(format!("api/users/{}/{list}", urlencoding::encode(username)))
                .query("limit", limit)
                .query("page", page),
        )
        .await
    }

    pub async fn blocked_users(&self, page: u32, limit: u32) -> Result<UsersPage> {
        check_limit(limit)?;
        check_page(page)?;
        self.data(
            ApiRequest::get("api/users/me/blocked")
                .query("page", page)
                .query("limit", limit),
        )
        .await
    }

    /// Largest clans by member count
    pub async fn top_clans(&self) -> Result<Vec<Clan>> {
        let Clans { clans } = self.json(ApiRequest::get("api/users/stats/top-clans")).await?;
        Ok(clans)
    }

    pub async fn who_to_follow(&self) -> Result<Vec<User>> {
        let Users { users } = self
            .json(ApiRequest::get("api/users/suggestions/who-to-follow"))
            .await?;
        Ok(users)
    }

    // Profile

    pub async fn profile(&self) -> Result<User> {
        self.json(ApiRequest::get("api/profile")).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        self.json(ApiRequest::put("api/users/me").json(update)).await
    }

    pub async fn privacy(&self) -> Result<Privacy> {
        self.json(ApiRequest::get("api/users/me/privacy")).await
    }

    pub async fn update_privacy(&self, update: &PrivacyUpdate) -> Result<Privacy> {
        self.json(ApiRequest::put("api/users/me/privacy").json(update))
            .await
    }

    pub async fn pins(&self) -> Result<PinsPage> {
        self.data(ApiRequest::get("api/users/me/pins")).await
    }

    /// Displays an owned pin; returns its slug
    pub async fn set_pin(&self, slug: &str) -> Result<String> {
        let PinSlug { pin } = self
            .json(ApiRequest::put("api/users/me/pin").json(&json!({ "slug": slug })))
            .await?;
        Ok(pin)
    }

    pub async fn delete_pin(&self) -> Result<()> {
        self.call(ApiRequest::delete("api/users/me/pin")).await
    }

    // Moderation

    pub async fn report(
        &self,
        target_id: Uuid,
        target: ReportTarget,
        reason: ReportReason,
        description: &str,
    ) -> Result<Report> {
        self.data(ApiRequest::post("api/reports").json(&json!({
            "targetId": target_id,
            "targetType": target,
            "reason": reason,
            "description": description,
        })))
        .await
    }

    pub async fn verification_status(&self) -> Result<String> {
        let VerificationStatus { status } = self
            .json(ApiRequest::get("api/verification/status"))
            .await?;
        Ok(status)
    }

    /// Requests verification with a video uploaded beforehand
    pub async fn submit_verification(&self, video_url: &str) -> Result<serde_json::Value> {
        self.json(ApiRequest::post("api/verification/submit").json(&json!({ "videoUrl": video_url })))
            .await
    }

    // Notifications

    pub async fn notifications(&self, offset: u32, limit: u32) -> Result<NotificationsPage> {
        check_limit(limit)?;
        self.json(
            ApiRequest::get("api/notifications/")
                .query("limit", limit)
                .query("offset", offset),
        )
        .await
    }

    /// Number of unread notifications
    pub async fn notifications_count(&self) -> Result<u64> {
        let Count { count } = self.json(ApiRequest::get("api/notifications/count")).await?;
        Ok(count)
    }

    pub async fn read_notification(&self, notification_id: Uuid) -> Result<bool> {
        let Success { success } = self
            .json(ApiRequest::post(format!(
                "api/notifications/{notification_id}/read"
            )))
            .await?;
        Ok(success)
    }

    pub async fn read_all_notifications(&self) -> Result<bool> {
        let Success { success } = self
            .json(ApiRequest::post("api/notifications/read-all"))
            .await?;
        Ok(success)
    }

    /// Marks several notifications read; returns how many changed
    pub async fn read_notifications(&self, ids: &[Uuid]) -> Result<u64> {
        let Count { count } = self
            .json(ApiRequest::post("api/notifications/read-batch").json(&json!({ "ids": ids })))
            .await?;
        Ok(count)
    }

    /// Opens the live notification feed
    pub async fn notification_stream(&self) -> Result<NotificationStream> {
        let response = self
            .executor
            .open_stream(&ApiRequest::get("api/notifications/stream"))
            .await?;
        Ok(NotificationStream::new(response))
    }
}

fn check_limit(limit: u32) -> Result<(), ApiError> {
    check_limit_up_to(limit, MAX_LIMIT)
}

fn check_limit_up_to(limit: u32, max: u32) -> Result<(), ApiError> {
    if (1..=max).contains(&limit) {
        Ok(())
    } else {
        Err(ApiError::validation(format!(
            "limit must be between 1 and {max}, got {limit}"
        )))
    }
}

fn check_page(page: u32) -> Result<(), ApiError> {
    if page == 0 {
        return Err(ApiError::validation("pages are numbered from 1"));
    }
    Ok(())
}

fn check_content(content: &str) -> Result<(), ApiError> {
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::validation(format!(
            "content is limited to {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_comment(content: &str, attachment_ids: &[Uuid]) -> Result<(), ApiError> {
    check_content(content)?;
    if attachment_ids.len() > MAX_COMMENT_ATTACHMENTS {
        return Err(ApiError::validation(format!(
            "at most {MAX_COMMENT_ATTACHMENTS} attachments allowed per comment"
        )));
    }
    if content.is_empty() && attachment_ids.is_empty() {
        return Err(ApiError::validation("content or attachments required"));
    }
    Ok(())
}

fn check_search(query: &str) -> Result<(), ApiError> {
    if query.chars().count() > MAX_SEARCH_CHARS {
        return Err(ApiError::validation(format!(
            "query is limited to {MAX_SEARCH_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::NotFound {
            message: "user not found".into(),
        });
    }
    Ok(())
}

/// 8 to 100 characters with at least one letter and one digit
fn valid_password(password: &str) -> bool {
    (8..=100).contains(&password.chars().count())
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Latin or Russian letters, digits and underscores
fn valid_hashtag_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || ('А'..='я').contains(&c))
}

fn valid_media_type(mime: &str) -> bool {
    matches!(
        mime.split('/').next(),
        Some("image" | "video" | "audio")
    )
}

fn format_cursor_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
