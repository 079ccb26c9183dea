//! File-per-message encrypted conversation store.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use pc_crypto::aead;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::StoreError,
    keys::{KeyCache, StorageKey},
    layout::{self, MESSAGES_DIR, STAGING_DIR, STAGING_SUFFIX},
    models::StoredMessage,
};

#[derive(Debug)]
struct MessageFile {
    timestamp: i64,
    name: String,
    path: PathBuf,
}

/// Central store handle.  Share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct MessageStore {
    base_dir: PathBuf,
    keys: KeyCache,
}

impl MessageStore {
    /// Open (or create) the store rooted at `base_dir` for the local user
    /// `own_handle`.  Leftover staging files from an interrupted write are
    /// removed.
    pub fn open(base_dir: impl AsRef<Path>, own_handle: &str) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        restrict_dir_permissions(&base_dir);
        cleanup_staging(&base_dir);
        info!(base = %base_dir.display(), "opened message store");
        Ok(Self {
            base_dir,
            keys: KeyCache::new(own_handle),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn own_handle(&self) -> &str {
        self.keys.own_handle()
    }

    /// Seal `message` and write it under the peer's conversation directory.
    pub fn store_message(&self, peer: &str, message: &StoredMessage) -> Result<PathBuf, StoreError> {
        let peer_dir = layout::sanitize_handle(peer);
        let key = self.keys.get(&peer_dir);

        let plaintext = serde_json::to_vec(message)?;
        let sealed = aead::seal(key.as_bytes(), &plaintext)?;

        let messages = layout::messages_dir(&self.base_dir, &peer_dir);
        let staging = layout::staging_dir(&self.base_dir, &peer_dir);
        if !messages.exists() {
            fs::create_dir_all(&messages)?;
            restrict_dir_permissions(&layout::conversation_dir(&self.base_dir, &peer_dir));
        }
        fs::create_dir_all(&staging)?;

        let dest = messages.join(layout::message_file_name(message.timestamp, &message.id));
        write_atomic(&staging, &dest, &sealed)?;
        debug!(peer = %peer_dir, message_id = %message.id, "stored message");
        Ok(dest)
    }

    /// Page `page` (zero-based) of `page_size` messages, newest first.
    ///
    /// Files that fail to read or decrypt are logged and skipped, so a page
    /// may hold fewer than `page_size` messages.
    pub fn load_messages(
        &self,
        peer: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let peer_dir = layout::sanitize_handle(peer);
        let files = self.list_files(&peer_dir)?;

        let start = match page.checked_mul(page_size) {
            Some(s) if s < files.len() && page_size > 0 => s,
            _ => return Ok(Vec::new()),
        };
        let end = start.saturating_add(page_size).min(files.len());

        let key = self.keys.get(&peer_dir);
        let mut out = Vec::with_capacity(end - start);
        for file in &files[start..end] {
            match read_message(&file.path, &key) {
                Ok(msg) => out.push(msg),
                Err(e) => {
                    warn!(peer = %peer_dir, file = %file.name, error = %e, "skipping unreadable message")
                }
            }
        }
        Ok(out)
    }

    pub fn get_message_count(&self, peer: &str) -> Result<usize, StoreError> {
        Ok(self.list_files(&layout::sanitize_handle(peer))?.len())
    }

    /// Remove every file carrying message `id`.  Returns whether any existed.
    pub fn delete_message(&self, peer: &str, id: &str) -> Result<bool, StoreError> {
        let peer_dir = layout::sanitize_handle(peer);
        let wanted = layout::sanitize_handle(id);
        let mut removed = false;
        for file in self.list_files(&peer_dir)? {
            if layout::parse_file_name(&file.name).is_some_and(|(_, fid)| fid == wanted) {
                fs::remove_file(&file.path)?;
                removed = true;
            }
        }
        if removed {
            debug!(peer = %peer_dir, message_id = %wanted, "deleted message");
        }
        Ok(removed)
    }

    /// Delete the whole history with `peer`.  Returns how many messages went.
    pub fn clear_messages(&self, peer: &str) -> Result<usize, StoreError> {
        let peer_dir = layout::sanitize_handle(peer);
        let count = self.list_files(&peer_dir)?.len();
        let messages = layout::messages_dir(&self.base_dir, &peer_dir);
        if messages.exists() {
            fs::remove_dir_all(&messages)?;
        }
        info!(peer = %peer_dir, count, "cleared conversation");
        Ok(count)
    }

    /// Sanitized handles of every peer with a conversation directory.
    pub fn list_conversations(&self) -> Result<Vec<String>, StoreError> {
        let mut peers = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.path().join(MESSAGES_DIR).is_dir() {
                peers.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        peers.sort();
        Ok(peers)
    }

    /// Message files sorted newest first, ties broken by name.
    fn list_files(&self, peer_dir: &str) -> Result<Vec<MessageFile>, StoreError> {
        let dir = layout::messages_dir(&self.base_dir, peer_dir);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((timestamp, _)) = layout::parse_file_name(&name) {
                files.push(MessageFile {
                    timestamp,
                    name,
                    path: entry.path(),
                });
            }
        }
        files.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.name.cmp(&a.name)));
        Ok(files)
    }
}

fn read_message(path: &Path, key: &StorageKey) -> Result<StoredMessage, StoreError> {
    let sealed = fs::read(path)?;
    let plaintext = aead::open(key.as_bytes(), &sealed).map_err(|e| StoreError::Integrity {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&plaintext).map_err(|e| StoreError::Integrity {
        path: path.to_path_buf(),
        reason: format!("decrypted record is not a message: {e}"),
    })
}

fn write_atomic(staging_root: &Path, dest: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let staging_path = staging_root.join(format!("{}{STAGING_SUFFIX}", Uuid::new_v4()));
    {
        let mut file = File::create(&staging_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&staging_path, dest) {
        let _ = fs::remove_file(&staging_path);
        return Err(e.into());
    }
    if let Some(parent) = dest.parent() {
        fsync_dir(parent)?;
    }
    Ok(())
}

fn restrict_dir_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Remove any leftover `.staging` files from a previous crash.
fn cleanup_staging(base_dir: &Path) {
    let Ok(peers) = fs::read_dir(base_dir) else {
        return;
    };
    for peer in peers.flatten() {
        let Ok(entries) = fs::read_dir(peer.path().join(STAGING_DIR)) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().ends_with(STAGING_SUFFIX) {
                warn!(path = %entry.path().display(), "removing orphaned staging file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

fn fsync_dir(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        let dir = File::open(path)?;
        dir.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
