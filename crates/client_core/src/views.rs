//! View-models and their builders.
//!
//! A view is plain data derived from collection snapshots, plus the document
//! title for the page. Rendering is the shell's problem; the `Display` impls
//! are a bare text form for shells that want one.

use std::fmt;

use shared::domain::{MomentId, UserId};
use shared::protocol::{ReplyPayload, UserPayload, VisionPayload};

use crate::router::ProfileTab;

/// The avatar rails on the home page cut off at this many users.
pub const HOME_RAIL_LIMIT: usize = 20;

/// Vision text is cut to this many characters in document titles.
const TITLE_TRUNCATE_CHARS: usize = 70;

#[derive(Debug, Clone)]
pub enum View {
    Home(HomeView),
    VisionList(VisionListView),
    VisionDetail(VisionDetailView),
    VisionForm(VisionFormView),
    UserList(UserListView),
    UserDetail(UserDetailView),
    AllySignup(AllySignupView),
}

impl View {
    pub fn title(&self) -> &str {
        match self {
            View::Home(view) => &view.title,
            View::VisionList(view) => &view.title,
            View::VisionDetail(view) => &view.title,
            View::VisionForm(view) => &view.title,
            View::UserList(view) => &view.title,
            View::UserDetail(view) => &view.title,
            View::AllySignup(view) => &view.title,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HomeView {
    pub title: String,
    /// Featured visions, in list order.
    pub carousel: Vec<VisionPayload>,
    pub visionaries: Vec<UserPayload>,
    pub allies: Vec<UserPayload>,
}

#[derive(Debug, Clone)]
pub struct VisionListView {
    pub title: String,
    pub category: Option<String>,
    pub visions: Vec<VisionPayload>,
}

#[derive(Debug, Clone)]
pub struct VisionDetailView {
    pub title: String,
    pub vision: VisionPayload,
}

/// The new-vision form. `inspiration` may be attached by the shell when the
/// form was reached from a moment.
#[derive(Debug, Clone)]
pub struct VisionFormView {
    pub title: String,
    pub category: Option<String>,
    pub inspiration: Option<MomentId>,
    pub author: UserId,
}

#[derive(Debug, Clone)]
pub struct UserListView {
    pub title: String,
    pub show_allies: bool,
    pub users: Vec<UserPayload>,
}

#[derive(Debug, Clone)]
pub struct UserDetailView {
    pub title: String,
    pub user: UserPayload,
    pub tab: ProfileTab,
    /// Visions the user authored.
    pub visions: Vec<VisionPayload>,
    /// Visions the user supports.
    pub supported: Vec<VisionPayload>,
    /// The user's replies across all visions.
    pub replies: Vec<ReplyPayload>,
}

#[derive(Debug, Clone)]
pub struct AllySignupView {
    pub title: String,
    pub current_user: Option<UserPayload>,
}

pub fn home(site_title: &str, visions: &[VisionPayload], users: &[UserPayload]) -> HomeView {
    HomeView {
        title: page_title(
            site_title,
            "What's your vision for the future of our city?",
        ),
        carousel: visions.iter().filter(|v| v.featured).cloned().collect(),
        visionaries: users
            .iter()
            .filter(|u| !u.is_ally())
            .take(HOME_RAIL_LIMIT)
            .cloned()
            .collect(),
        allies: users
            .iter()
            .filter(|u| u.is_ally())
            .take(HOME_RAIL_LIMIT)
            .cloned()
            .collect(),
    }
}

pub fn vision_list(
    site_title: &str,
    category: Option<&str>,
    visions: &[VisionPayload],
) -> VisionListView {
    let filtered = match category {
        Some(category) => visions
            .iter()
            .filter(|v| v.matches_category(category))
            .cloned()
            .collect(),
        None => visions.to_vec(),
    };
    let title = match category {
        Some(category) => page_title(
            site_title,
            &format!("Explore visions \u{2014} {category}"),
        ),
        None => page_title(site_title, "Explore visions"),
    };
    VisionListView {
        title,
        category: category.map(str::to_string),
        visions: filtered,
    }
}

pub fn vision_detail(site_title: &str, vision: VisionPayload) -> VisionDetailView {
    let title = page_title(
        site_title,
        &format!(
            "\"{}\" by @{}",
            truncate_chars(&vision.text, TITLE_TRUNCATE_CHARS),
            vision.author_details.username
        ),
    );
    VisionDetailView { title, vision }
}

pub fn vision_form(
    site_title: &str,
    category: Option<String>,
    inspiration: Option<MomentId>,
    author: UserId,
) -> VisionFormView {
    VisionFormView {
        title: page_title(site_title, "Add your vision"),
        category,
        inspiration,
        author,
    }
}

pub fn user_list(site_title: &str, allies: bool, users: &[UserPayload]) -> UserListView {
    let kind = if allies { "allies" } else { "visionaries" };
    UserListView {
        title: page_title(site_title, &format!("See the {}", capitalize(kind))),
        show_allies: allies,
        users: users
            .iter()
            .filter(|u| u.is_ally() == allies)
            .cloned()
            .collect(),
    }
}

pub fn user_detail(
    site_title: &str,
    user: UserPayload,
    tab: ProfileTab,
    visions: &[VisionPayload],
) -> UserDetailView {
    let authored = visions
        .iter()
        .filter(|v| v.author == user.id)
        .cloned()
        .collect();
    let supported = visions
        .iter()
        .filter(|v| v.is_supported_by(user.id))
        .cloned()
        .collect();
    let replies = visions
        .iter()
        .flat_map(|v| v.replies.iter())
        .filter(|r| r.author == user.id)
        .cloned()
        .collect();
    UserDetailView {
        title: page_title(site_title, &format!("{}'s profile", user.full_name)),
        user,
        tab,
        visions: authored,
        supported,
        replies,
    }
}

pub fn ally_signup(site_title: &str, current_user: Option<UserPayload>) -> AllySignupView {
    AllySignupView {
        title: page_title(site_title, "Become an ally!"),
        current_user,
    }
}

fn page_title(site_title: &str, page: &str) -> String {
    format!("{site_title} | {page}")
}

/// Cuts at a character boundary, never mid code point.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn vision_line(vision: &VisionPayload) -> String {
    format!(
        "#{} @{}: {} [{} supporters, {} replies]",
        vision.id.0,
        vision.author_details.username,
        truncate_chars(&vision.text, 60),
        vision.supporters.len(),
        vision.replies.len(),
    )
}

fn usernames(users: &[UserPayload]) -> String {
    users
        .iter()
        .map(|u| format!("@{}", u.username))
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Home(view) => fmt::Display::fmt(view, f),
            View::VisionList(view) => fmt::Display::fmt(view, f),
            View::VisionDetail(view) => fmt::Display::fmt(view, f),
            View::VisionForm(view) => fmt::Display::fmt(view, f),
            View::UserList(view) => fmt::Display::fmt(view, f),
            View::UserDetail(view) => fmt::Display::fmt(view, f),
            View::AllySignup(view) => fmt::Display::fmt(view, f),
        }
    }
}

impl fmt::Display for HomeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "featured:")?;
        for vision in &self.carousel {
            writeln!(f, "  {}", vision_line(vision))?;
        }
        writeln!(f, "visionaries: {}", usernames(&self.visionaries))?;
        write!(f, "allies: {}", usernames(&self.allies))
    }
}

impl fmt::Display for VisionListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        for vision in &self.visions {
            writeln!(f, "  {}", vision_line(vision))?;
        }
        write!(f, "{} visions", self.visions.len())
    }
}

impl fmt::Display for VisionDetailView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vision = &self.vision;
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", vision.text)?;
        if let Some(category) = &vision.category {
            writeln!(f, "category: {category}")?;
        }
        if let Some(moment) = &vision.inspiration {
            writeln!(f, "inspired by @{}: {}", moment.username, moment.text)?;
        }
        writeln!(
            f,
            "supporters: {}",
            vision
                .supporters
                .iter()
                .map(|s| format!("@{}", s.username))
                .collect::<Vec<_>>()
                .join(" ")
        )?;
        for reply in &vision.replies {
            writeln!(f, "  @{}: {}", reply.author_details.username, reply.text)?;
        }
        write!(f, "{} replies", vision.replies.len())
    }
}

impl fmt::Display for VisionFormView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        match &self.category {
            Some(category) => write!(f, "new vision in {category} (author {})", self.author.0),
            None => write!(f, "new vision (author {})", self.author.0),
        }
    }
}

impl fmt::Display for UserListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        for user in &self.users {
            writeln!(f, "  @{} ({})", user.username, user.full_name)?;
        }
        write!(f, "{} users", self.users.len())
    }
}

impl fmt::Display for UserDetailView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "@{} [{}]", self.user.username, self.tab.as_str())?;
        match self.tab {
            ProfileTab::Visions => {
                for vision in &self.visions {
                    writeln!(f, "  {}", vision_line(vision))?;
                }
                write!(f, "{} visions", self.visions.len())
            }
            ProfileTab::Supported => {
                for vision in &self.supported {
                    writeln!(f, "  {}", vision_line(vision))?;
                }
                write!(f, "{} supported", self.supported.len())
            }
            ProfileTab::Replies => {
                for reply in &self.replies {
                    writeln!(f, "  on #{}: {}", reply.vision_id.0, reply.text)?;
                }
                write!(f, "{} replies", self.replies.len())
            }
        }
    }
}

impl fmt::Display for AllySignupView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        match &self.current_user {
            Some(user) if user.is_ally() => write!(f, "@{} is already an ally", user.username),
            Some(user) => write!(f, "@{}, use `ally` to join", user.username),
            None => write!(f, "sign in to become an ally"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::domain::{ReplyId, VisionId};
    use shared::protocol::UserRef;

    fn user(id: i64, username: &str, groups: &[&str]) -> UserPayload {
        UserPayload {
            id: UserId(id),
            username: username.to_string(),
            full_name: format!("{username} example"),
            avatar_url: None,
            groups: groups.iter().map(|g| g.to_string()).collect(),
            visible_on_home: true,
            date_joined: Utc::now(),
        }
    }

    fn vision(id: i64, author: &UserPayload, category: Option<&str>, featured: bool) -> VisionPayload {
        VisionPayload {
            id: VisionId(id),
            author: author.id,
            author_details: UserRef {
                id: author.id,
                username: author.username.clone(),
                full_name: author.full_name.clone(),
                avatar_url: None,
            },
            category: category.map(str::to_string),
            text: format!("vision {id}"),
            featured,
            inspiration: None,
            supporters: Vec::new(),
            sharers: Vec::new(),
            replies: Vec::new(),
            tweet_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn home_splits_the_rails_and_keeps_featured_order() {
        let mut users = Vec::new();
        for id in 1..=25 {
            users.push(user(id, &format!("v{id}"), &[]));
        }
        users.push(user(30, "ally_one", &["allies"]));

        let author = user(1, "v1", &[]);
        let visions = vec![
            vision(1, &author, None, true),
            vision(2, &author, None, false),
            vision(3, &author, None, true),
        ];

        let view = home("Civic Visions", &visions, &users);
        assert_eq!(view.visionaries.len(), HOME_RAIL_LIMIT);
        assert_eq!(view.allies.len(), 1);
        let featured: Vec<i64> = view.carousel.iter().map(|v| v.id.0).collect();
        assert_eq!(featured, vec![1, 3]);
        assert_eq!(
            view.title,
            "Civic Visions | What's your vision for the future of our city?"
        );
    }

    #[test]
    fn vision_list_filters_categories_case_insensitively() {
        let author = user(1, "maya", &[]);
        let visions = vec![
            vision(1, &author, Some("Economy"), false),
            vision(2, &author, Some("health"), false),
            vision(3, &author, None, false),
        ];

        let all = vision_list("T", None, &visions);
        assert_eq!(all.visions.len(), 3);

        let economy = vision_list("T", Some("economy"), &visions);
        let ids: Vec<i64> = economy.visions.iter().map(|v| v.id.0).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(economy.title, "T | Explore visions \u{2014} economy");
    }

    #[test]
    fn uncategorized_visions_never_match_a_named_category() {
        let author = user(1, "maya", &[]);
        let visions = vec![vision(1, &author, None, false)];
        let view = vision_list("T", Some("economy"), &visions);
        assert!(view.visions.is_empty());
    }

    #[test]
    fn detail_title_quotes_and_truncates_the_text() {
        let author = user(1, "maya", &[]);
        let mut long = vision(1, &author, None, false);
        long.text = "x".repeat(80);
        let view = vision_detail("T", long);
        assert_eq!(
            view.title,
            format!("T | \"{}...\" by @maya", "x".repeat(70))
        );
    }

    #[test]
    fn user_list_titles_name_the_kind() {
        let users = vec![user(1, "v", &[]), user(2, "a", &["allies"])];
        let visionaries = user_list("T", false, &users);
        assert_eq!(visionaries.title, "T | See the Visionaries");
        assert_eq!(visionaries.users.len(), 1);
        let allies = user_list("T", true, &users);
        assert_eq!(allies.title, "T | See the Allies");
        assert_eq!(allies.users[0].username, "a");
    }

    #[test]
    fn user_detail_derives_all_three_tabs_from_visions() {
        let maya = user(1, "maya", &[]);
        let theo = user(2, "theo", &[]);
        let mut authored = vision(1, &maya, None, false);
        let mut other = vision(2, &theo, None, false);
        other.supporters.push(UserRef {
            id: maya.id,
            username: maya.username.clone(),
            full_name: maya.full_name.clone(),
            avatar_url: None,
        });
        authored.replies.push(ReplyPayload {
            id: ReplyId(1),
            vision_id: authored.id,
            author: theo.id,
            author_details: UserRef {
                id: theo.id,
                username: theo.username.clone(),
                full_name: theo.full_name.clone(),
                avatar_url: None,
            },
            text: "nice".to_string(),
            tweet_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        let visions = vec![authored, other];
        let view = user_detail("T", maya.clone(), ProfileTab::Supported, &visions);
        assert_eq!(view.visions.len(), 1);
        assert_eq!(view.supported.len(), 1);
        assert_eq!(view.supported[0].id.0, 2);
        assert!(view.replies.is_empty());

        let theo_view = user_detail("T", theo, ProfileTab::Replies, &visions);
        assert_eq!(theo_view.replies.len(), 1);
        assert_eq!(theo_view.replies[0].text, "nice");
    }

    #[test]
    fn truncate_chars_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("short", 70), "short");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(capitalize("allies"), "Allies");
        assert_eq!(capitalize(""), "");
    }
}
