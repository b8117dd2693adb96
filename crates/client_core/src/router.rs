//! Route table, navigation state and the link interception policy.
//!
//! Paths are the site's hash-era fragments: `visions/7`, `users/3/supported`,
//! `visions/economy/list`. Parsing normalizes the prefixes old bookmarks carry
//! (`/`, `#!/`, `#`) so both push-state paths and legacy fragment URLs land on
//! the same routes.

use std::collections::HashMap;

use shared::domain::{UserId, VisionId};
use thiserror::Error;

use crate::analytics;

/// Alert text for the new-vision gate on intercepted links.
pub const SIGN_IN_TO_CREATE: &str = "Sign in to create a new vision!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileTab {
    Visions,
    Supported,
    Replies,
}

impl ProfileTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileTab::Visions => "visions",
            ProfileTab::Supported => "supported",
            ProfileTab::Replies => "replies",
        }
    }

    fn parse(tab: &str) -> Option<ProfileTab> {
        match tab {
            "visions" => Some(ProfileTab::Visions),
            "supported" => Some(ProfileTab::Supported),
            "replies" => Some(ProfileTab::Replies),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    NewVision { category: Option<String> },
    ListVisions { category: Option<String> },
    ShowVision { id: VisionId },
    ListUsers { allies: bool },
    ShowUser { id: UserId, tab: ProfileTab },
    AllySignup,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no route matches {path:?}")]
    UnknownRoute { path: String },
}

impl Route {
    /// Parses a normalized path into a route.
    ///
    /// Category captures are lowercased here; list filtering is
    /// case-insensitive and compares against the lowercased capture.
    /// Non-numeric vision/user ids and unknown profile tabs are
    /// [`RouteError::UnknownRoute`], not a panic.
    pub fn parse(path: &str) -> Result<Route, RouteError> {
        let normalized = normalize(path);
        if normalized.is_empty() {
            return Ok(Route::Home);
        }

        let segments: Vec<&str> = normalized.split('/').collect();
        let route = match segments.as_slice() {
            ["visions", "new"] => Some(Route::NewVision { category: None }),
            ["visions", "list"] => Some(Route::ListVisions { category: None }),
            ["visions", category, "new"] => Some(Route::NewVision {
                category: Some(category.to_lowercase()),
            }),
            ["visions", category, "list"] => Some(Route::ListVisions {
                category: Some(category.to_lowercase()),
            }),
            ["visions", id] => id
                .parse::<i64>()
                .ok()
                .map(|id| Route::ShowVision { id: VisionId(id) }),
            ["users", "list"] => Some(Route::ListUsers { allies: false }),
            // The third segment is a list-kind discriminator, not a user id.
            ["users", "list", kind] => Some(Route::ListUsers {
                allies: *kind == "allies",
            }),
            ["users", id] => id.parse::<i64>().ok().map(|id| Route::ShowUser {
                id: UserId(id),
                tab: ProfileTab::Visions,
            }),
            ["users", id, tab] => match (id.parse::<i64>().ok(), ProfileTab::parse(tab)) {
                (Some(id), Some(tab)) => Some(Route::ShowUser {
                    id: UserId(id),
                    tab,
                }),
                _ => None,
            },
            ["ally"] => Some(Route::AllySignup),
            _ => None,
        };

        route.ok_or_else(|| RouteError::UnknownRoute {
            path: normalized.to_string(),
        })
    }
}

/// Strips a leading `/`, a legacy `#!/` prefix, a bare `#` and a trailing `/`.
fn normalize(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_prefix("#!/").unwrap_or(path);
    let path = path.strip_prefix('#').unwrap_or(path);
    path.strip_suffix('/').unwrap_or(path)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NavigateOptions {
    /// Leave the viewport where it is instead of restoring the saved offset.
    pub noscroll: bool,
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
}

/// What a completed navigation asks the shell to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub route: Route,
    /// The normalized path, the key under which its scroll offset is kept.
    pub path: String,
    /// Offset to scroll to, `None` when the navigation was `noscroll`.
    pub restore_scroll: Option<u32>,
    pub replace: bool,
}

/// Navigation state: the current path and per-path scroll offsets.
///
/// The shell reports viewport offsets through [`Router::record_scroll`];
/// `navigate` files the offset under the path being left, so coming back
/// restores the reader's place.
#[derive(Debug, Default)]
pub struct Router {
    current_path: String,
    current_scroll: u32,
    scroll_tops: HashMap<String, u32>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn record_scroll(&mut self, offset: u32) {
        self.current_scroll = offset;
    }

    /// Parses the target path and switches to it.
    ///
    /// A path that parses to no route leaves the router untouched. Every
    /// completed navigation emits an analytics pageview.
    pub fn navigate(
        &mut self,
        path: &str,
        options: NavigateOptions,
    ) -> Result<Navigation, RouteError> {
        let route = Route::parse(path)?;
        let normalized = normalize(path).to_string();

        self.scroll_tops
            .insert(std::mem::take(&mut self.current_path), self.current_scroll);
        let saved = self.scroll_tops.get(&normalized).copied().unwrap_or(0);
        self.current_path = normalized.clone();
        if !options.noscroll {
            self.current_scroll = saved;
        }

        analytics::pageview(&normalized);
        Ok(Navigation {
            route,
            path: normalized,
            restore_scroll: (!options.noscroll).then_some(saved),
            replace: options.replace,
        })
    }
}

/// Modifier state of a click, for the new-tab escape hatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.alt || self.ctrl || self.meta || self.shift
    }
}

/// A link as the shell saw it, `data-noscroll` / `data-replace` included.
#[derive(Debug, Clone, Copy)]
pub struct Link<'a> {
    pub href: &'a str,
    pub noscroll: bool,
    pub replace: bool,
}

impl<'a> Link<'a> {
    pub fn new(href: &'a str) -> Self {
        Self {
            href,
            noscroll: false,
            replace: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Route the click internally.
    Navigate {
        path: String,
        noscroll: bool,
        replace: bool,
    },
    /// Refuse: creating a vision needs a signed-in user.
    RequireSignIn { message: &'static str },
    /// Let the click happen as a normal page load. `auth_event` carries the
    /// analytics event name for login/logout links.
    PassThrough { auth_event: Option<&'static str> },
}

/// The document-level click policy.
///
/// `/`, `/visions...` and `/users...` hrefs are routed internally unless a
/// modifier key is held (new tabs keep working). Inside that set, hrefs
/// containing `new` are gated on authentication. `/login` and `/logout` pass
/// through but are counted.
pub fn link_action(link: &Link<'_>, modifiers: &Modifiers, authenticated: bool) -> LinkAction {
    let href = link.href;
    let internal = href == "/" || href.starts_with("/visions") || href.starts_with("/users");

    if internal && !modifiers.any() {
        if href.contains("new") && !authenticated {
            return LinkAction::RequireSignIn {
                message: SIGN_IN_TO_CREATE,
            };
        }
        return LinkAction::Navigate {
            path: normalize(href).to_string(),
            noscroll: link.noscroll,
            replace: link.replace,
        };
    }

    if href.starts_with("/login") {
        return LinkAction::PassThrough {
            auth_event: Some("login"),
        };
    }
    if href.starts_with("/logout") {
        return LinkAction::PassThrough {
            auth_event: Some("logout"),
        };
    }
    LinkAction::PassThrough { auth_event: None }
}
