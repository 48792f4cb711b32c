//! User store: the roster and the logged-on user.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sborr_core::defaults::{AVATARS_BUCKET, AVATAR_CONTENT_TYPE, MAX_UPLOAD_BYTES, USERS_TABLE};
use sborr_core::file_safety::avatar_storage_path;
use sborr_core::{
    decode_rows, detect_content_type, validate_file, Backend, ChangeEvent, ChangeKind, Error,
    LocalFile, Query, Result, User, UserUpdate,
};

use crate::auth::AuthStore;
use crate::merge;
use crate::state::Shared;
use crate::subscription::Subscription;

const NO_LOGON_USER: &str = "No logged in user found";

#[derive(Debug, Clone, Default)]
pub struct UserState {
    pub users: Vec<User>,
    pub logon_user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Public URL and storage path of an uploaded avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarUpload {
    pub avatar_url: String,
    pub avatar_path: String,
}

#[derive(Clone)]
pub struct UserStore {
    backend: Backend,
    auth: AuthStore,
    shared: Arc<Shared<UserState>>,
}

impl UserStore {
    /// The auth store supplies the session the logged-on user is resolved from.
    pub fn new(backend: Backend, auth: AuthStore) -> Self {
        Self {
            backend,
            auth,
            shared: Arc::new(Shared::new(UserState::default())),
        }
    }

    pub fn snapshot(&self) -> UserState {
        self.shared.read(|s| s.clone())
    }

    pub fn users(&self) -> Vec<User> {
        self.shared.read(|s| s.users.clone())
    }

    pub fn logon_user(&self) -> Option<User> {
        self.shared.read(|s| s.logon_user.clone())
    }

    pub fn loading(&self) -> bool {
        self.shared.read(|s| s.loading)
    }

    pub fn error(&self) -> Option<String> {
        self.shared.read(|s| s.error.clone())
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.shared.watch()
    }

    fn record_error(&self, op: &str, error: &Error) {
        warn!(op, table = USERS_TABLE, error = %error, "user store operation failed");
        let message = error.message();
        self.shared.update(|s| s.error = Some(message));
    }

    /// Load the roster, newest first.
    pub async fn fetch_all(&self) -> Result<Vec<User>> {
        self.shared.update(|s| {
            s.loading = true;
            s.error = None;
        });
        let result = async {
            let rows = self
                .backend
                .data
                .select(USERS_TABLE, &Query::all().newest_first())
                .await?;
            decode_rows::<User>(rows)
        }
        .await;
        self.shared.update(|s| {
            s.loading = false;
            match &result {
                Ok(users) => s.users = users.clone(),
                Err(e) => s.error = Some(e.message()),
            }
        });
        match &result {
            Ok(users) => debug!(result_count = users.len(), "fetched users"),
            Err(e) => warn!(op = "fetch_all", table = USERS_TABLE, error = %e, "user store operation failed"),
        }
        result
    }

    async fn select_user(&self, id: Uuid) -> Result<User> {
        let row = self
            .backend
            .data
            .select_one(USERS_TABLE, &Query::all().eq("id", id))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// One user by id. Failures are recorded in `error` and yield `None`.
    pub async fn fetch_by_id(&self, id: Uuid) -> Option<User> {
        match self.select_user(id).await {
            Ok(user) => Some(user),
            Err(e) => {
                self.record_error("fetch_by_id", &e);
                None
            }
        }
    }

    /// Resolve the logged-on user from the auth session.
    ///
    /// Without a session the logged-on user is cleared and `Ok(None)` returned.
    pub async fn fetch_logon_user(&self) -> Result<Option<User>> {
        let Some(user_id) = self.auth.user_id() else {
            self.shared.update(|s| s.logon_user = None);
            return Ok(None);
        };
        match self.select_user(user_id).await {
            Ok(user) => {
                debug!(record_id = %user.id, "resolved logged-on user");
                let logon = user.clone();
                self.shared.update(|s| s.logon_user = Some(logon));
                Ok(Some(user))
            }
            Err(e) => {
                self.record_error("fetch_logon_user", &e);
                Err(e)
            }
        }
    }

    /// Upload a new avatar for the logged-on user.
    ///
    /// The previous avatar blob is removed first; a failed removal is logged.
    pub async fn upload_avatar(&self, file: &LocalFile) -> Result<AvatarUpload> {
        let logon = self
            .logon_user()
            .ok_or_else(|| Error::Unauthorized(NO_LOGON_USER.to_string()))?;
        if let Some(previous) = logon.avatar_path.as_deref() {
            self.remove_avatar(previous, "failed to remove previous avatar")
                .await;
        }
        let result = self.store_avatar(&logon, file).await;
        if let Err(e) = &result {
            self.record_error("upload_avatar", e);
        }
        result
    }

    /// Validate and upload an avatar blob, returning its URL and path.
    async fn store_avatar(&self, logon: &User, file: &LocalFile) -> Result<AvatarUpload> {
        let check = validate_file(&file.uri, &file.bytes, MAX_UPLOAD_BYTES);
        if !check.allowed {
            return Err(Error::InvalidInput(
                check.block_reason.unwrap_or_else(|| "File rejected".to_string()),
            ));
        }
        let avatar_path = avatar_storage_path(&file.uri, logon.id, Utc::now().timestamp_millis());
        let content_type = detect_content_type(&file.uri, &file.bytes, AVATAR_CONTENT_TYPE);

        self.backend
            .storage
            .upload(AVATARS_BUCKET, &avatar_path, &file.bytes, &content_type, false)
            .await?;
        let avatar_url = self.backend.storage.public_url(AVATARS_BUCKET, &avatar_path);
        if avatar_url.is_empty() {
            self.remove_avatar(&avatar_path, "failed to remove unusable avatar")
                .await;
            return Err(Error::Storage("Failed to get avatar URL".to_string()));
        }
        info!(bucket = AVATARS_BUCKET, storage_path = %avatar_path, "uploaded avatar");
        Ok(AvatarUpload {
            avatar_url,
            avatar_path,
        })
    }

    /// Best-effort blob removal; failures are logged.
    async fn remove_avatar(&self, path: &str, context: &'static str) {
        if path.is_empty() {
            return;
        }
        if let Err(e) = self
            .backend
            .storage
            .remove(AVATARS_BUCKET, &[path.to_string()])
            .await
        {
            warn!(bucket = AVATARS_BUCKET, storage_path = path, error = %e, "{}", context);
        }
    }

    /// Save profile changes for the logged-on user, uploading a new avatar first when given.
    pub async fn update_user(&self, updates: UserUpdate, avatar: Option<&LocalFile>) -> Result<User> {
        let logon = self
            .logon_user()
            .ok_or_else(|| Error::Unauthorized(NO_LOGON_USER.to_string()))?;
        self.shared.update(|s| {
            s.loading = true;
            s.error = None;
        });
        let result = self.update_user_inner(&logon, updates, avatar).await;
        self.shared.update(|s| {
            s.loading = false;
            match &result {
                Ok(user) => {
                    s.logon_user = Some(user.clone());
                    merge::apply_replace(&mut s.users, user.clone());
                }
                Err(e) => s.error = Some(e.message()),
            }
        });
        match &result {
            Ok(user) => info!(record_id = %user.id, "updated profile"),
            Err(e) => warn!(op = "update_user", table = USERS_TABLE, error = %e, "user store operation failed"),
        }
        result
    }

    /// Upload the new avatar (if any), then save the row.
    ///
    /// The previous avatar blob is removed only once the row points at the
    /// new one; a failed save removes the new blob instead.
    async fn update_user_inner(
        &self,
        logon: &User,
        updates: UserUpdate,
        avatar: Option<&LocalFile>,
    ) -> Result<User> {
        let uploaded = match avatar {
            Some(file) => Some(self.store_avatar(logon, file).await?),
            None => None,
        };
        let (avatar_url, avatar_path) = match &uploaded {
            Some(new) => (Some(new.avatar_url.clone()), Some(new.avatar_path.clone())),
            None => (logon.avatar_url.clone(), logon.avatar_path.clone()),
        };
        let changes = UserUpdate {
            avatar_url,
            avatar_path,
            ..updates
        };

        let saved = self.save_user(logon.id, &changes).await;
        match (&saved, &uploaded) {
            (Ok(_), Some(new)) => {
                if let Some(previous) = logon
                    .avatar_path
                    .as_deref()
                    .filter(|p| *p != new.avatar_path)
                {
                    self.remove_avatar(previous, "failed to remove previous avatar")
                        .await;
                }
            }
            (Err(_), Some(new)) => {
                self.remove_avatar(&new.avatar_path, "failed to remove orphaned avatar")
                    .await;
            }
            _ => {}
        }
        saved
    }

    async fn save_user(&self, id: Uuid, changes: &UserUpdate) -> Result<User> {
        let row = self
            .backend
            .data
            .update(USERS_TABLE, id, serde_json::to_value(changes)?)
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Merge one push event into the roster and the logged-on user.
    pub fn apply_change(&self, event: &ChangeEvent) {
        let decoded = match event.kind {
            ChangeKind::Delete => Ok(None),
            _ => event.new_record::<User>(),
        };
        let user = match decoded {
            Ok(user) => user,
            Err(e) => {
                warn!(event_kind = %event.kind, error = %e, "skipping undecodable user change");
                return;
            }
        };
        match (event.kind, user) {
            (ChangeKind::Insert, Some(user)) => {
                self.shared
                    .update(|s| merge::apply_insert(&mut s.users, user));
            }
            (ChangeKind::Update, Some(user)) => self.shared.update(|s| {
                if s.logon_user.as_ref().map(|u| u.id) == Some(user.id) {
                    s.logon_user = Some(user.clone());
                }
                merge::apply_replace(&mut s.users, user);
            }),
            (ChangeKind::Delete, _) => {
                if let Some(id) = event.old_id() {
                    self.shared.update(|s| merge::apply_delete(&mut s.users, id));
                }
            }
            _ => {}
        }
    }

    /// Follow live changes to the `users` table.
    pub fn subscribe(&self) -> Subscription {
        let mut rx = self.backend.changes.subscribe(USERS_TABLE);
        let store = self.clone();
        Subscription::spawn(&[USERS_TABLE], async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        debug!(event_kind = %event.kind, "user change");
                        store.apply_change(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "user changes lagged, refetching");
                        let _ = store.fetch_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
