//! JSON file persistence for account records.
//!
//! The whole map is rewritten on every mutation. Writers are serialized by a
//! dedicated mutex and publish a new snapshot only after the file has been
//! replaced, so readers never see a record that is not on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::{validate_nickname, AccountError, AccountRecord, AccountResult};

/// Account file name inside the data directory
pub const ACCOUNTS_FILE: &str = "accounts.json";

type AccountMap = BTreeMap<String, AccountRecord>;

/// File-backed map of nickname to credential record.
pub struct AccountStore {
    path: PathBuf,
    snapshot: RwLock<Arc<AccountMap>>,
    write_lock: Mutex<()>,
}

impl AccountStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> AccountResult<Self> {
        let path = path.into();
        let accounts = load_accounts(&path)?;
        info!(
            "Loaded {} account(s) from {}",
            accounts.len(),
            path.display()
        );

        Ok(Self {
            path,
            snapshot: RwLock::new(Arc::new(accounts)),
            write_lock: Mutex::new(()),
        })
    }

    /// Open the store inside the given data directory.
    pub fn open_in(data_dir: &Path) -> AccountResult<Self> {
        Self::open(data_dir.join(ACCOUNTS_FILE))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot of every account.
    pub fn list(&self) -> AccountMap {
        self.current().as_ref().clone()
    }

    /// Look up a single account.
    pub fn get(&self, nickname: &str) -> Option<AccountRecord> {
        self.current().get(nickname).cloned()
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.current().len()
    }

    /// Whether the store holds no accounts.
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Add a new account under `nickname`.
    pub fn add(&self, nickname: &str, record: AccountRecord) -> AccountResult<()> {
        validate_nickname(nickname)?;
        record.validate()?;

        self.commit(|accounts| {
            if accounts.contains_key(nickname) {
                return Err(AccountError::DuplicateKey(nickname.to_string()));
            }
            accounts.insert(nickname.to_string(), record);
            Ok(())
        })?;

        info!("Added account '{}'", nickname);
        Ok(())
    }

    /// Replace the account stored under `original_nickname`.
    ///
    /// When `nickname` differs from `original_nickname` the entry is moved to
    /// the new key; the old and new keys are swapped in a single snapshot.
    pub fn update(
        &self,
        original_nickname: &str,
        nickname: &str,
        record: AccountRecord,
    ) -> AccountResult<()> {
        self.commit(|accounts| {
            if !accounts.contains_key(original_nickname) {
                return Err(AccountError::NotFound(original_nickname.to_string()));
            }
            validate_nickname(nickname)?;
            record.validate()?;
            if original_nickname != nickname && accounts.contains_key(nickname) {
                return Err(AccountError::DuplicateKey(nickname.to_string()));
            }
            accounts.remove(original_nickname);
            accounts.insert(nickname.to_string(), record);
            Ok(())
        })?;

        if original_nickname == nickname {
            info!("Updated account '{}'", nickname);
        } else {
            info!("Updated account '{}' as '{}'", original_nickname, nickname);
        }
        Ok(())
    }

    /// Remove the account stored under `nickname`.
    pub fn delete(&self, nickname: &str) -> AccountResult<()> {
        self.commit(|accounts| match accounts.remove(nickname) {
            Some(_) => Ok(()),
            None => Err(AccountError::NotFound(nickname.to_string())),
        })?;

        info!("Deleted account '{}'", nickname);
        Ok(())
    }

    fn current(&self) -> Arc<AccountMap> {
        // Snapshots are swapped whole, so a poisoned lock still guards a
        // complete map.
        let guard = self
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Apply `mutate` to a copy of the current map, persist it, then publish.
    fn commit<F>(&self, mutate: F) -> AccountResult<()>
    where
        F: FnOnce(&mut AccountMap) -> AccountResult<()>,
    {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = self.current().as_ref().clone();
        mutate(&mut next)?;
        save_accounts(&self.path, &next)?;

        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(next);
        Ok(())
    }
}

fn load_accounts(path: &Path) -> AccountResult<AccountMap> {
    if !path.exists() {
        debug!("No account file at {}, starting empty", path.display());
        return Ok(AccountMap::new());
    }

    let contents = fs::read_to_string(path).map_err(|e| AccountError::persistence(path, e))?;
    if contents.trim().is_empty() {
        return Ok(AccountMap::new());
    }

    serde_json::from_str(&contents).map_err(|e| AccountError::persistence(path, e))
}

/// Write the map to a sibling temp file and rename it over the real one.
fn save_accounts(path: &Path, accounts: &AccountMap) -> AccountResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AccountError::persistence(path, e))?;
        }
    }

    let contents =
        serde_json::to_string_pretty(accounts).map_err(|e| AccountError::persistence(path, e))?;

    let tmp_path = path.with_extension("json.tmp");
    let result = fs::write(&tmp_path, contents).and_then(|_| fs::rename(&tmp_path, path));
    if let Err(e) = result {
        warn!("Failed to save accounts to {}: {}", path.display(), e);
        let _ = fs::remove_file(&tmp_path);
        return Err(AccountError::persistence(path, e));
    }

    debug!("Saved {} account(s) to {}", accounts.len(), path.display());
    Ok(())
}
