use super::*;
use shared::domain::ALLIES_GROUP;

async fn memory_storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = memory_storage().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("visions.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn creates_and_fetches_user() {
    let storage = memory_storage().await;
    let id = storage
        .create_user("louise", "Louise V", Some("http://img/louise.png"))
        .await
        .expect("user");

    let user = storage.get_user(id).await.expect("get").expect("present");
    assert_eq!(user.username, "louise");
    assert_eq!(user.full_name, "Louise V");
    assert_eq!(user.avatar_url.as_deref(), Some("http://img/louise.png"));
    assert!(user.visible_on_home);
    assert!(user.groups.is_empty());
}

#[tokio::test]
async fn create_user_upserts_on_username_and_keeps_avatar() {
    let storage = memory_storage().await;
    let first = storage
        .create_user("sam", "Sam", Some("http://img/sam.png"))
        .await
        .expect("user");
    let second = storage
        .create_user("sam", "Sam Renamed", None)
        .await
        .expect("user again");

    assert_eq!(first, second);
    let user = storage
        .get_user(first)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(user.full_name, "Sam Renamed");
    assert_eq!(user.avatar_url.as_deref(), Some("http://img/sam.png"));
}

#[tokio::test]
async fn list_users_can_filter_to_visible() {
    let storage = memory_storage().await;
    let shown = storage.create_user("shown", "Shown", None).await.expect("user");
    let hidden = storage
        .create_user("hidden", "Hidden", None)
        .await
        .expect("user");
    assert!(storage
        .set_visible_on_home(hidden, false)
        .await
        .expect("hide"));

    let visible = storage.list_users(true).await.expect("visible");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, shown);

    let everyone = storage.list_users(false).await.expect("everyone");
    assert_eq!(everyone.len(), 2);
}

#[tokio::test]
async fn group_membership_roundtrip() {
    let storage = memory_storage().await;
    let user = storage.create_user("org", "The Org", None).await.expect("user");

    storage
        .add_user_to_group(user, ALLIES_GROUP)
        .await
        .expect("join");
    storage
        .add_user_to_group(user, ALLIES_GROUP)
        .await
        .expect("join twice");
    let groups = storage.groups_for_user(user).await.expect("groups");
    assert_eq!(groups, vec![ALLIES_GROUP.to_string()]);

    storage
        .remove_user_from_group(user, ALLIES_GROUP)
        .await
        .expect("leave");
    storage
        .remove_user_from_group(user, ALLIES_GROUP)
        .await
        .expect("leave twice");
    assert!(storage
        .groups_for_user(user)
        .await
        .expect("groups")
        .is_empty());
}

#[tokio::test]
async fn lists_visions_newest_first() {
    let storage = memory_storage().await;
    let author = storage.create_user("ana", "Ana", None).await.expect("user");
    let older = storage
        .create_vision(author, Some("energy"), "solar roofs", None)
        .await
        .expect("vision");
    let newer = storage
        .create_vision(author, None, "bike lanes", None)
        .await
        .expect("vision");

    let visions = storage.list_visions().await.expect("list");
    assert_eq!(visions.len(), 2);
    assert_eq!(visions[0].id, newer);
    assert_eq!(visions[1].id, older);
    assert_eq!(visions[0].author.username, "ana");
}

#[tokio::test]
async fn get_vision_returns_none_for_unknown_id() {
    let storage = memory_storage().await;
    let missing = storage.get_vision(VisionId(41)).await.expect("query");
    assert!(missing.is_none());
}

#[tokio::test]
async fn vision_records_inspiration_moment() {
    let storage = memory_storage().await;
    let author = storage.create_user("ana", "Ana", None).await.expect("user");
    let moment = storage
        .upsert_moment_by_tweet_id("99001", "civicfeed", "the river at dawn", None)
        .await
        .expect("moment");
    let vision = storage
        .create_vision(author, Some("living"), "riverfront park", Some(moment))
        .await
        .expect("vision");

    let stored = storage
        .get_vision(vision)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.inspiration_id, Some(moment));
}

#[tokio::test]
async fn set_featured_flags_existing_vision_only() {
    let storage = memory_storage().await;
    let author = storage.create_user("ana", "Ana", None).await.expect("user");
    let vision = storage
        .create_vision(author, None, "night buses", None)
        .await
        .expect("vision");

    assert!(storage.set_featured(vision, true).await.expect("feature"));
    assert!(!storage
        .set_featured(VisionId(9999), true)
        .await
        .expect("feature missing"));

    let stored = storage
        .get_vision(vision)
        .await
        .expect("get")
        .expect("present");
    assert!(stored.featured);
}

#[tokio::test]
async fn supporting_twice_counts_once() {
    let storage = memory_storage().await;
    let author = storage.create_user("ana", "Ana", None).await.expect("user");
    let fan = storage.create_user("bea", "Bea", None).await.expect("user");
    let vision = storage
        .create_vision(author, None, "tool library", None)
        .await
        .expect("vision");

    storage.add_supporter(vision, fan).await.expect("support");
    storage
        .add_supporter(vision, fan)
        .await
        .expect("support twice");
    let supporters = storage
        .supporters_for_vision(vision)
        .await
        .expect("supporters");
    assert_eq!(supporters.len(), 1);
    assert_eq!(supporters[0].id, fan);

    storage
        .remove_supporter(vision, fan)
        .await
        .expect("unsupport");
    storage
        .remove_supporter(vision, fan)
        .await
        .expect("unsupport twice");
    assert!(storage
        .supporters_for_vision(vision)
        .await
        .expect("supporters")
        .is_empty());
}

#[tokio::test]
async fn share_upserts_and_delete_reports_rows() {
    let storage = memory_storage().await;
    let author = storage.create_user("ana", "Ana", None).await.expect("user");
    let sharer = storage.create_user("bea", "Bea", None).await.expect("user");
    let vision = storage
        .create_vision(author, None, "orchard commons", None)
        .await
        .expect("vision");

    storage
        .upsert_share(vision, sharer, None)
        .await
        .expect("share");
    storage
        .upsert_share(vision, sharer, Some("777001"))
        .await
        .expect("share again");
    let sharers = storage.sharers_for_vision(vision).await.expect("sharers");
    assert_eq!(sharers, vec![sharer]);

    assert_eq!(storage.delete_share(vision, sharer).await.expect("unshare"), 1);
    assert_eq!(
        storage
            .delete_share(vision, sharer)
            .await
            .expect("unshare twice"),
        0
    );
}

#[tokio::test]
async fn replies_come_back_oldest_first() {
    let storage = memory_storage().await;
    let author = storage.create_user("ana", "Ana", None).await.expect("user");
    let vision = storage
        .create_vision(author, None, "street pianos", None)
        .await
        .expect("vision");

    let first = storage
        .create_reply(vision, author, "love this")
        .await
        .expect("reply");
    let second = storage
        .create_reply(vision, author, "me too")
        .await
        .expect("reply");

    let replies = storage.replies_for_vision(vision).await.expect("replies");
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].id, first);
    assert_eq!(replies[1].id, second);
    assert_eq!(replies[0].author.username, "ana");
}

#[tokio::test]
async fn moment_upsert_is_keyed_by_tweet_id() {
    let storage = memory_storage().await;
    let first = storage
        .upsert_moment_by_tweet_id("424242", "civicfeed", "draft text", None)
        .await
        .expect("moment");
    let second = storage
        .upsert_moment_by_tweet_id("424242", "civicfeed", "final text", Some("http://img/1.jpg"))
        .await
        .expect("moment again");

    assert_eq!(first, second);
    let moment = storage
        .get_moment(first)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(moment.text, "final text");
    assert_eq!(moment.media_url.as_deref(), Some("http://img/1.jpg"));
}
