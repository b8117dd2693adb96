use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(VisionId);
id_newtype!(ReplyId);
id_newtype!(MomentId);

/// Membership in this group marks a user as a partner organisation
/// ("ally"); every other user is an individual visionary.
pub const ALLIES_GROUP: &str = "allies";
