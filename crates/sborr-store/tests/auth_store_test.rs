use std::time::Duration;

use uuid::Uuid;

use sborr_client::MemoryBackend;
use sborr_core::{AuthProvider, Error};
use sborr_store::{AuthStore, Gate, Stores};

const EMAIL: &str = "secretary@city.gov";
const PASSWORD: &str = "password123";

fn backend() -> (MemoryBackend, Uuid) {
    let id = Uuid::new_v4();
    (MemoryBackend::new().with_account(EMAIL, PASSWORD, id), id)
}

#[tokio::test]
async fn test_gate_follows_initialize_and_sign_in() {
    let (memory, id) = backend();
    let auth = AuthStore::new(memory.backend());
    assert_eq!(auth.gate(), Gate::Loading);
    assert!(auth.loading());

    auth.initialize().await.unwrap();
    assert_eq!(auth.gate(), Gate::Public);
    assert!(!auth.loading());

    let session = auth.sign_in(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(session.user_id(), id);
    assert_eq!(auth.gate(), Gate::Protected);
    assert_eq!(auth.user_id(), Some(id));

    auth.sign_out().await.unwrap();
    assert_eq!(auth.gate(), Gate::Public);
    assert!(auth.session().is_none());
}

#[tokio::test]
async fn test_initialize_restores_stored_session() {
    let (memory, id) = backend();
    memory.restore_session(EMAIL).unwrap();
    let auth = AuthStore::new(memory.backend());
    auth.initialize().await.unwrap();
    assert_eq!(auth.gate(), Gate::Protected);
    assert_eq!(auth.user_id(), Some(id));
}

#[tokio::test]
async fn test_initialize_failure_records_error() {
    let (memory, _) = backend();
    memory.fail_next("current_session");
    let auth = AuthStore::new(memory.backend());
    assert!(auth.initialize().await.is_err());
    assert!(auth.error().is_some());
    assert!(!auth.loading());
    assert_eq!(auth.gate(), Gate::Public);
}

#[tokio::test]
async fn test_session_follows_provider_events() {
    let (memory, _) = backend();
    let auth = AuthStore::new(memory.backend());
    auth.initialize().await.unwrap();

    // Sign in through the provider directly, as another part of the app would.
    memory.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();
    for _ in 0..200 {
        if auth.session().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(auth.gate(), Gate::Protected);

    memory.sign_out().await.unwrap();
    for _ in 0..200 {
        if auth.session().is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(auth.gate(), Gate::Public);
}

#[tokio::test]
async fn test_sign_in_validation() {
    let (memory, _) = backend();
    let auth = AuthStore::new(memory.backend());

    let bad_email = auth.sign_in("not-an-email", PASSWORD).await;
    assert!(matches!(bad_email, Err(Error::InvalidInput(_))));
    assert_eq!(auth.error().as_deref(), Some("Invalid email address"));

    let short = auth.sign_in(EMAIL, "short").await;
    assert!(matches!(short, Err(Error::InvalidInput(_))));
    assert_eq!(
        auth.error().as_deref(),
        Some("Password must be at least 8 characters")
    );
    assert_eq!(memory.call_count("sign_in"), 0);
}

#[tokio::test]
async fn test_sign_in_wrong_password() {
    let (memory, _) = backend();
    let auth = AuthStore::new(memory.backend());
    let result = auth.sign_in(EMAIL, "wrong-password").await;
    assert!(matches!(result, Err(Error::Auth(_))));
    assert_eq!(auth.error().as_deref(), Some("Invalid login credentials"));
    assert!(!auth.loading());
    assert!(auth.session().is_none());
}

#[tokio::test]
async fn test_change_password() {
    let (memory, _) = backend();
    let auth = AuthStore::new(memory.backend());
    auth.initialize().await.unwrap();
    auth.sign_in(EMAIL, PASSWORD).await.unwrap();

    auth.change_password(PASSWORD, "newpass", "newpass")
        .await
        .unwrap();
    assert!(auth.error().is_none());

    // The old password no longer works, the new one does.
    assert!(memory.sign_in_with_password(EMAIL, PASSWORD).await.is_err());
    assert!(memory.sign_in_with_password(EMAIL, "newpass").await.is_ok());
}

#[tokio::test]
async fn test_change_password_errors() {
    let (memory, _) = backend();
    let auth = AuthStore::new(memory.backend());
    auth.initialize().await.unwrap();

    let missing = auth.change_password("", "newpass", "newpass").await;
    assert!(matches!(missing, Err(Error::InvalidInput(_))));
    assert_eq!(auth.error().as_deref(), Some("Please fill out all fields."));

    let mismatch = auth.change_password(PASSWORD, "newpass", "newpasz").await;
    assert!(mismatch.is_err());
    assert_eq!(auth.error().as_deref(), Some("New passwords do not match."));

    let signed_out = auth.change_password(PASSWORD, "newpass", "newpass").await;
    assert!(matches!(signed_out, Err(Error::Unauthorized(_))));
    assert_eq!(auth.error().as_deref(), Some("You must be logged in."));

    auth.sign_in(EMAIL, PASSWORD).await.unwrap();
    let wrong = auth
        .change_password("not-my-password", "newpass", "newpass")
        .await;
    assert!(matches!(wrong, Err(Error::Auth(_))));
    assert_eq!(
        auth.error().as_deref(),
        Some("Your current password is incorrect.")
    );
    assert!(!auth.loading());
}

#[tokio::test]
async fn test_stores_load_and_dashboard() {
    let (memory, id) = backend();
    memory.seed(
        "users",
        vec![serde_json::json!({"id": id, "firstname": "Lia", "lastname": "Ramos", "role": "secretary"})],
    );
    let stores = Stores::new(memory.backend());
    stores.auth.initialize().await.unwrap();
    stores.auth.sign_in(EMAIL, PASSWORD).await.unwrap();

    let subscriptions = stores.start().await;
    assert_eq!(subscriptions.len(), 3);
    assert_eq!(stores.users.logon_user().unwrap().role_title(), "Secretary");

    let today = chrono::Utc::now().date_naive();
    let stats = stores.dashboard(today);
    assert_eq!(stats.total_documents, 0);
    assert_eq!(stats.total_sessions, 0);
    assert!(stats.next_meeting.is_none());
}
