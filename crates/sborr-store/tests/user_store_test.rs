use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use sborr_client::MemoryBackend;
use sborr_core::defaults::EVENT_BUS_CAPACITY;
use sborr_core::{ChangeEvent, Error, LocalFile, UserRole, UserUpdate};
use sborr_store::{AuthStore, UserStore};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
const EMAIL: &str = "clerk@city.gov";
const PASSWORD: &str = "password123";

fn user_row(id: Uuid, firstname: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "firstname": firstname,
        "lastname": "Dela Cruz",
        "email": format!("{}@city.gov", firstname.to_lowercase()),
        "role": "councilor",
        "bio": null,
        "avatar_url": null,
        "avatar_path": null,
        "created_at": created_at
    })
}

/// A backend with two users, the first of whom can sign in.
fn setup() -> (MemoryBackend, Uuid, Uuid) {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let memory = MemoryBackend::new().with_account(EMAIL, PASSWORD, me);
    memory.seed(
        "users",
        vec![
            user_row(me, "Ana", "2024-01-01T00:00:00+00:00"),
            user_row(other, "Ben", "2024-02-01T00:00:00+00:00"),
        ],
    );
    (memory, me, other)
}

async fn signed_in(memory: &MemoryBackend) -> (AuthStore, UserStore) {
    let auth = AuthStore::new(memory.backend());
    auth.initialize().await.unwrap();
    auth.sign_in(EMAIL, PASSWORD).await.unwrap();
    let users = UserStore::new(memory.backend(), auth.clone());
    (auth, users)
}

#[tokio::test]
async fn test_fetch_all_and_by_id() {
    let (memory, me, _) = setup();
    let (_auth, users) = signed_in(&memory).await;

    let roster = users.fetch_all().await.unwrap();
    assert_eq!(roster[0].firstname, "Ben");
    assert_eq!(roster[1].role, Some(UserRole::Councilor));

    let found = users.fetch_by_id(me).await.unwrap();
    assert_eq!(found.full_name(), "Ana Dela Cruz");

    assert!(users.fetch_by_id(Uuid::new_v4()).await.is_none());
    assert!(users.error().is_some());
}

#[tokio::test]
async fn test_logon_user_follows_auth_session() {
    let (memory, me, _) = setup();
    let auth = AuthStore::new(memory.backend());
    auth.initialize().await.unwrap();
    let users = UserStore::new(memory.backend(), auth.clone());

    assert_eq!(users.fetch_logon_user().await.unwrap(), None);
    assert!(users.logon_user().is_none());

    auth.sign_in(EMAIL, PASSWORD).await.unwrap();
    let logon = users.fetch_logon_user().await.unwrap().unwrap();
    assert_eq!(logon.id, me);
    assert_eq!(users.logon_user().unwrap().id, me);
}

#[tokio::test]
async fn test_upload_avatar_requires_logon_user() {
    let (memory, _, _) = setup();
    let (_auth, users) = signed_in(&memory).await;
    let result = users
        .upload_avatar(&LocalFile::new("me.jpg", JPEG.to_vec()))
        .await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn test_upload_avatar_replaces_previous_blob() {
    let (memory, me, _) = setup();
    let (_auth, users) = signed_in(&memory).await;
    users.fetch_logon_user().await.unwrap();

    let first = users
        .update_user(UserUpdate::default(), Some(&LocalFile::new("me.jpg", JPEG.to_vec())))
        .await
        .unwrap();
    let first_path = first.avatar_path.clone().unwrap();
    assert!(first_path.starts_with(&format!("avatars/{}-", me)));
    assert!(first_path.ends_with(".jpg"));
    assert_eq!(memory.object("avatars", &first_path).unwrap().content_type, "image/jpeg");

    // Make sure the second upload gets a different millisecond stamp.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let uploaded = users
        .upload_avatar(&LocalFile::new("content://picker/photo", JPEG.to_vec()))
        .await
        .unwrap();
    assert!(uploaded.avatar_path.ends_with(".jpg"));
    assert!(memory.object("avatars", &first_path).is_none());
    assert!(memory.object("avatars", &uploaded.avatar_path).is_some());
    assert!(uploaded.avatar_url.ends_with(&uploaded.avatar_path));
}

#[tokio::test]
async fn test_update_user_keeps_avatar_and_replaces_roster_entry() {
    let (memory, me, _) = setup();
    let (_auth, users) = signed_in(&memory).await;
    users.fetch_all().await.unwrap();
    users.fetch_logon_user().await.unwrap();

    let updates = UserUpdate {
        bio: Some("Chair, committee on appropriations".to_string()),
        ..Default::default()
    };
    let saved = users.update_user(updates, None).await.unwrap();

    assert_eq!(saved.bio.as_deref(), Some("Chair, committee on appropriations"));
    assert_eq!(users.logon_user().unwrap().bio, saved.bio);
    let entry = users.users().into_iter().find(|u| u.id == me).unwrap();
    assert_eq!(entry.bio, saved.bio);
    assert!(!users.loading());
}

#[tokio::test]
async fn test_update_user_failure_records_error() {
    let (memory, _, _) = setup();
    let (_auth, users) = signed_in(&memory).await;
    users.fetch_logon_user().await.unwrap();

    memory.fail_next("update:users");
    let result = users.update_user(UserUpdate::default(), None).await;
    assert!(result.is_err());
    assert_eq!(users.error().as_deref(), Some("injected failure: update:users"));
    assert!(!users.loading());
}

#[tokio::test]
async fn test_failed_profile_save_keeps_previous_avatar() {
    let (memory, me, _) = setup();
    let (_auth, users) = signed_in(&memory).await;
    users.fetch_logon_user().await.unwrap();

    let first = users
        .update_user(UserUpdate::default(), Some(&LocalFile::new("me.jpg", JPEG.to_vec())))
        .await
        .unwrap();
    let first_path = first.avatar_path.clone().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    memory.fail_next("update:users");
    let result = users
        .update_user(UserUpdate::default(), Some(&LocalFile::new("new.jpg", JPEG.to_vec())))
        .await;
    assert!(result.is_err());

    // The row still points at the first blob, which is still there, and the
    // second upload did not linger.
    let row = memory
        .rows("users")
        .into_iter()
        .find(|row| row["id"] == json!(me))
        .unwrap();
    assert_eq!(row["avatar_path"], json!(first_path));
    assert!(memory.object("avatars", &first_path).is_some());
    assert_eq!(memory.object_count("avatars"), 1);
    assert_eq!(
        users.logon_user().unwrap().avatar_path.as_deref(),
        Some(first_path.as_str())
    );

    // A successful save swaps the blobs.
    let second = users
        .update_user(UserUpdate::default(), Some(&LocalFile::new("new.jpg", JPEG.to_vec())))
        .await
        .unwrap();
    let second_path = second.avatar_path.unwrap();
    assert_ne!(second_path, first_path);
    assert!(memory.object("avatars", &first_path).is_none());
    assert!(memory.object("avatars", &second_path).is_some());
    assert_eq!(memory.object_count("avatars"), 1);
}

#[tokio::test]
async fn test_update_user_without_logon_user() {
    let (memory, _, _) = setup();
    let auth = AuthStore::new(memory.backend());
    let users = UserStore::new(memory.backend(), auth);
    let result = users.update_user(UserUpdate::default(), None).await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn test_push_events_update_roster_and_logon_user() {
    let (memory, me, other) = setup();
    let (_auth, users) = signed_in(&memory).await;
    users.fetch_all().await.unwrap();
    users.fetch_logon_user().await.unwrap();
    let _subscription = users.subscribe();

    let newcomer = Uuid::new_v4();
    let row = user_row(newcomer, "Cara", "2024-03-01T00:00:00+00:00");
    memory.publish(ChangeEvent::insert("users", row.clone()));
    memory.publish(ChangeEvent::insert("users", row));

    let mut renamed = user_row(me, "Anabel", "2024-01-01T00:00:00+00:00");
    renamed["bio"] = json!("updated elsewhere");
    memory.publish(ChangeEvent::update("users", renamed, json!({"id": me})));
    memory.publish(ChangeEvent::delete("users", json!({"id": other})));

    for _ in 0..200 {
        let logon_renamed = users
            .logon_user()
            .map(|u| u.firstname == "Anabel")
            .unwrap_or(false);
        if logon_renamed && users.users().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let roster = users.users();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0].id, newcomer);
    assert_eq!(roster[1].firstname, "Anabel");
    assert_eq!(users.logon_user().unwrap().bio.as_deref(), Some("updated elsewhere"));
}

#[tokio::test]
async fn test_lagged_listener_refetches_roster() {
    let (memory, _, _) = setup();
    let (_auth, users) = signed_in(&memory).await;
    let _subscription = users.subscribe();
    assert!(users.users().is_empty());

    for _ in 0..EVENT_BUS_CAPACITY + 20 {
        memory.publish(ChangeEvent::delete("users", json!({"id": Uuid::new_v4()})));
    }

    for _ in 0..200 {
        if users.users().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(users.users().len(), 2);
    assert!(memory.call_count("select:users") >= 1);
}
