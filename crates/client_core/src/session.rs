//! The signed-in user, if any.

use shared::domain::{UserId, ALLIES_GROUP};
use shared::protocol::UserPayload;
use url::form_urlencoded;

#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<UserPayload>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&mut self, user: UserPayload) {
        self.user = Some(user);
    }

    pub fn sign_out(&mut self) {
        self.user = None;
    }

    pub fn current_user(&self) -> Option<&UserPayload> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|user| user.id)
    }

    /// A user with a positive id counts as signed in.
    pub fn is_authenticated(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.id.0 > 0)
    }

    pub fn is_in_group(&self, group: &str) -> bool {
        self.user.as_ref().is_some_and(|user| user.in_group(group))
    }

    /// The analytics user-status dimension: `ally`, `visionary` or `anonymous`.
    pub fn user_status(&self) -> &'static str {
        if !self.is_authenticated() {
            "anonymous"
        } else if self.is_in_group(ALLIES_GROUP) {
            "ally"
        } else {
            "visionary"
        }
    }
}

/// Builds `<base>?next=<path>` with the redirect target form-encoded.
pub fn login_url(base: &str, next: &str) -> String {
    let next: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{base}?next={next}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::domain::UserId;

    fn user(id: i64, groups: &[&str]) -> UserPayload {
        UserPayload {
            id: UserId(id),
            username: "maya".to_string(),
            full_name: "Maya Q".to_string(),
            avatar_url: None,
            groups: groups.iter().map(|group| group.to_string()).collect(),
            visible_on_home: true,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn status_tracks_authentication_and_group() {
        let mut session = Session::anonymous();
        assert_eq!(session.user_status(), "anonymous");
        assert!(!session.is_authenticated());

        session.sign_in(user(3, &[]));
        assert_eq!(session.user_status(), "visionary");

        session.sign_in(user(3, &["allies"]));
        assert_eq!(session.user_status(), "ally");
        assert!(session.is_in_group("allies"));

        session.sign_out();
        assert_eq!(session.user_status(), "anonymous");
    }

    #[test]
    fn zero_id_users_are_not_authenticated() {
        let mut session = Session::anonymous();
        session.sign_in(user(0, &[]));
        assert!(!session.is_authenticated());
        assert_eq!(session.user_status(), "anonymous");
    }

    #[test]
    fn login_url_encodes_the_redirect() {
        assert_eq!(
            login_url("/login", "visions/7"),
            "/login?next=visions%2F7"
        );
        assert_eq!(login_url("/login", ""), "/login?next=");
    }
}
