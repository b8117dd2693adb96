//! Headless client core for the civic visions site.
//!
//! Owns everything the browser shell used to do apart from the DOM: the two
//! fetch-then-render collections, the route table and scroll memory, the
//! signed-in session, link interception and the API calls behind every user
//! action. Shells (the console app, tests) drive it and render the returned
//! view-models however they like.

pub mod analytics;
pub mod collection;
pub mod error;
pub mod router;
pub mod session;
pub mod views;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::domain::{MomentId, UserId, VisionId, ALLIES_GROUP};
use shared::error::{ApiError, ErrorCode};
use shared::protocol::{
    ActorRequest, CreateReplyRequest, CreateVisionRequest, JoinGroupRequest, LoginRequest,
    LoginResponse, ReplyPayload, ShareRequest, UserPayload, VisionPayload,
};
use tracing::info;

pub use collection::Collection;
pub use error::ClientError;
pub use router::{
    Link, LinkAction, Modifiers, NavigateOptions, Navigation, ProfileTab, Route, RouteError,
    Router,
};
pub use session::Session;
pub use views::View;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API server, no trailing slash.
    pub server_url: String,
    /// Where the sign-in page lives; `login_url()` appends the redirect.
    pub login_url: String,
    pub site_title: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8780".to_string(),
            login_url: "/login".to_string(),
            site_title: "Civic Visions".to_string(),
        }
    }
}

/// What dispatching a route asks the shell to do.
#[derive(Debug)]
pub enum Dispatch {
    Show(View),
    /// Route somewhere else instead (the new-vision auth gate).
    Redirect { path: String },
}

pub struct CivicClient {
    http: Client,
    config: ClientConfig,
    pub session: Session,
    pub visions: Collection<VisionPayload>,
    pub users: Collection<UserPayload>,
    pub router: Router,
}

impl CivicClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            session: Session::anonymous(),
            visions: Collection::new(|vision: &VisionPayload| vision.id.0),
            users: Collection::new(|user: &UserPayload| user.id.0),
            router: Router::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Boots the app: both collection fetches run concurrently, then the
    /// user-status analytics dimension is set.
    pub async fn start(&self) -> Result<(), ClientError> {
        self.refresh().await?;
        analytics::dimension("user_status", self.session.user_status());
        Ok(())
    }

    /// Re-fetches both collections, replacing their contents wholesale.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let (visions, users) = tokio::try_join!(self.fetch_visions(), self.fetch_users())?;
        info!(visions = visions.len(), users = users.len(), "collections fetched");
        self.visions.reset(visions).await;
        self.users.reset(users).await;
        Ok(())
    }

    async fn fetch_visions(&self) -> Result<Vec<VisionPayload>, ClientError> {
        let server_url = &self.config.server_url;
        let response = self
            .http
            .get(format!("{server_url}/api/visions"))
            .send()
            .await?;
        json_body(response).await
    }

    async fn fetch_users(&self) -> Result<Vec<UserPayload>, ClientError> {
        let server_url = &self.config.server_url;
        let response = self
            .http
            .get(format!("{server_url}/api/users"))
            .query(&[("visible_on_home", "true")])
            .send()
            .await?;
        json_body(response).await
    }

    async fn fetch_vision(&self, vision_id: VisionId) -> Result<VisionPayload, ClientError> {
        let server_url = &self.config.server_url;
        let response = self
            .http
            .get(format!("{server_url}/api/visions/{}", vision_id.0))
            .send()
            .await?;
        json_body(response).await
    }

    pub fn navigate(
        &mut self,
        path: &str,
        options: NavigateOptions,
    ) -> Result<Navigation, RouteError> {
        self.router.navigate(path, options)
    }

    pub fn record_scroll(&mut self, offset: u32) {
        self.router.record_scroll(offset);
    }

    pub fn current_path(&self) -> &str {
        self.router.current_path()
    }

    /// The sign-in URL with the redirect target, defaulting to the current path.
    pub fn login_url(&self, next: Option<&str>) -> String {
        let next = next.unwrap_or_else(|| self.router.current_path());
        session::login_url(&self.config.login_url, next)
    }

    /// Applies the click policy for the current session, counting login and
    /// logout pass-throughs.
    pub fn link_action(&self, link: &Link<'_>, modifiers: &Modifiers) -> LinkAction {
        let action = router::link_action(link, modifiers, self.session.is_authenticated());
        if let LinkAction::PassThrough {
            auth_event: Some(event),
        } = &action
        {
            analytics::event("authentication", event, None);
        }
        action
    }

    /// Builds the view for a route, waiting on whichever collections the view
    /// reads so nothing renders from an unfetched collection.
    pub async fn dispatch(&self, route: &Route) -> Result<Dispatch, ClientError> {
        let site_title = self.config.site_title.as_str();
        let view = match route {
            Route::Home => {
                self.visions.ready().await;
                self.users.ready().await;
                let visions = self.visions.snapshot().await;
                let users = self.users.snapshot().await;
                View::Home(views::home(site_title, &visions, &users))
            }
            Route::ListVisions { category } => {
                self.visions.ready().await;
                let visions = self.visions.snapshot().await;
                View::VisionList(views::vision_list(site_title, category.as_deref(), &visions))
            }
            Route::ShowVision { id } => {
                self.visions.ready().await;
                let vision = self
                    .visions
                    .get(id.0)
                    .await
                    .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "vision not found"))?;
                analytics::event("vision", "show", Some(&id.0.to_string()));
                View::VisionDetail(views::vision_detail(site_title, vision))
            }
            Route::NewVision { category } => {
                let Some(user) = self.session.current_user() else {
                    info!("sign-in required for a new vision, routing home");
                    return Ok(Dispatch::Redirect {
                        path: String::new(),
                    });
                };
                View::VisionForm(views::vision_form(
                    site_title,
                    category.clone(),
                    None,
                    user.id,
                ))
            }
            Route::ListUsers { allies } => {
                self.users.ready().await;
                let users = self.users.snapshot().await;
                View::UserList(views::user_list(site_title, *allies, &users))
            }
            Route::ShowUser { id, tab } => {
                self.users.ready().await;
                let user = self
                    .users
                    .get(id.0)
                    .await
                    .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "user not found"))?;
                self.visions.ready().await;
                let visions = self.visions.snapshot().await;

                let prefix = if self.session.user_id() == Some(*id) {
                    "my-"
                } else {
                    ""
                };
                analytics::event(
                    &format!("{prefix}profile-{}", tab.as_str()),
                    "show",
                    Some(&format!("{} ({}/{})", id.0, user.username, user.full_name)),
                );
                View::UserDetail(views::user_detail(site_title, user, *tab, &visions))
            }
            Route::AllySignup => View::AllySignup(views::ally_signup(
                site_title,
                self.session.current_user().cloned(),
            )),
        };
        Ok(Dispatch::Show(view))
    }

    pub async fn login(
        &mut self,
        username: &str,
        full_name: Option<&str>,
    ) -> Result<UserPayload, ClientError> {
        let server_url = &self.config.server_url;
        let request = LoginRequest {
            username: username.to_string(),
            full_name: full_name.map(str::to_string),
        };
        let response = self
            .http
            .post(format!("{server_url}/login"))
            .json(&request)
            .send()
            .await?;
        let LoginResponse { user } = json_body(response).await?;
        info!(user_id = user.id.0, username = user.username.as_str(), "signed in");
        self.session.sign_in(user.clone());
        analytics::dimension("user_status", self.session.user_status());
        Ok(user)
    }

    pub async fn create_vision(
        &self,
        category: Option<&str>,
        text: &str,
        inspiration: Option<MomentId>,
    ) -> Result<VisionPayload, ClientError> {
        let author = self.require_login()?;
        let server_url = &self.config.server_url;
        let request = CreateVisionRequest {
            author,
            category: category.map(str::to_string),
            text: text.to_string(),
            inspiration,
        };
        let response = self
            .http
            .post(format!("{server_url}/api/visions"))
            .json(&request)
            .send()
            .await?;
        let vision: VisionPayload = json_body(response).await?;
        info!(vision_id = vision.id.0, "vision created");
        self.visions.prepend(vision.clone()).await;
        analytics::event("vision", "new", None);
        Ok(vision)
    }

    pub async fn support(&self, vision_id: VisionId) -> Result<VisionPayload, ClientError> {
        let user_id = self.require_login()?;
        let server_url = &self.config.server_url;
        let response = self
            .http
            .post(format!("{server_url}/api/visions/{}/support", vision_id.0))
            .json(&ActorRequest { user_id })
            .send()
            .await?;
        self.store_vision(json_body(response).await?).await
    }

    pub async fn unsupport(&self, vision_id: VisionId) -> Result<VisionPayload, ClientError> {
        let user_id = self.require_login()?;
        let server_url = &self.config.server_url;
        let response = self
            .http
            .post(format!(
                "{server_url}/api/visions/{}/unsupport",
                vision_id.0
            ))
            .json(&ActorRequest { user_id })
            .send()
            .await?;
        self.store_vision(json_body(response).await?).await
    }

    pub async fn share(
        &self,
        vision_id: VisionId,
        tweet_id: Option<&str>,
    ) -> Result<VisionPayload, ClientError> {
        let user_id = self.require_login()?;
        let server_url = &self.config.server_url;
        let request = ShareRequest {
            user_id,
            tweet_id: tweet_id.map(str::to_string),
        };
        let response = self
            .http
            .post(format!("{server_url}/api/visions/{}/share", vision_id.0))
            .json(&request)
            .send()
            .await?;
        self.store_vision(json_body(response).await?).await
    }

    pub async fn unshare(&self, vision_id: VisionId) -> Result<VisionPayload, ClientError> {
        let user_id = self.require_login()?;
        let server_url = &self.config.server_url;
        let response = self
            .http
            .post(format!("{server_url}/api/visions/{}/unshare", vision_id.0))
            .json(&ActorRequest { user_id })
            .send()
            .await?;
        self.store_vision(json_body(response).await?).await
    }

    pub async fn reply(
        &self,
        vision_id: VisionId,
        text: &str,
    ) -> Result<ReplyPayload, ClientError> {
        let author = self.require_login()?;
        let server_url = &self.config.server_url;
        let request = CreateReplyRequest {
            author,
            text: text.to_string(),
        };
        let response = self
            .http
            .post(format!("{server_url}/api/visions/{}/replies", vision_id.0))
            .json(&request)
            .send()
            .await?;
        let reply: ReplyPayload = json_body(response).await?;
        // The reply endpoint returns only the reply; pull the vision so the
        // cached copy carries it too.
        let vision = self.fetch_vision(vision_id).await?;
        self.store_vision(vision).await?;
        Ok(reply)
    }

    /// Joins the allies group and updates both the session and the user rail.
    pub async fn become_ally(&mut self) -> Result<UserPayload, ClientError> {
        let user_id = self.require_login()?;
        let server_url = &self.config.server_url;
        let response = self
            .http
            .post(format!("{server_url}/api/users/{}/groups", user_id.0))
            .json(&JoinGroupRequest {
                group: ALLIES_GROUP.to_string(),
            })
            .send()
            .await?;
        let user: UserPayload = json_body(response).await?;
        info!(user_id = user.id.0, "joined the allies");
        self.users.replace(user.clone()).await;
        self.session.sign_in(user.clone());
        analytics::dimension("user_status", self.session.user_status());
        Ok(user)
    }

    fn require_login(&self) -> Result<UserId, ClientError> {
        if !self.session.is_authenticated() {
            return Err(ClientError::SignInRequired);
        }
        self.session.user_id().ok_or(ClientError::SignInRequired)
    }

    async fn store_vision(&self, vision: VisionPayload) -> Result<VisionPayload, ClientError> {
        if !self.visions.replace(vision.clone()).await {
            self.visions.prepend(vision.clone()).await;
        }
        Ok(vision)
    }
}

/// Decodes a success body, or the server's `ApiError` body on failure.
async fn json_body<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if response.status().is_success() {
        return Ok(response.json().await?);
    }
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(err) => Err(ClientError::Api(err)),
        Err(_) => Err(ClientError::Api(ApiError::new(
            ErrorCode::Internal,
            format!("unexpected {status} response"),
        ))),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
