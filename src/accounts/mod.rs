//! Jagex account credential records and their file-backed store.
//!
//! An account is keyed by a user-chosen nickname and carries the character
//! and session identifiers RuneLite reads from its environment to log in
//! without prompting.

mod store;

pub use store::{AccountStore, ACCOUNTS_FILE};

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::error::ErrorKind;

/// Environment variable names RuneLite reads its session from.
pub const ENV_CHARACTER_ID: &str = "JX_CHARACTER_ID";
pub const ENV_SESSION_ID: &str = "JX_SESSION_ID";
pub const ENV_DISPLAY_NAME: &str = "JX_DISPLAY_NAME";
pub const ENV_REFRESH_TOKEN: &str = "JX_REFRESH_TOKEN";
pub const ENV_ACCESS_TOKEN: &str = "JX_ACCESS_TOKEN";

/// Errors produced by the account store.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{field} is required")]
    Validation { field: &'static str },

    #[error("Account with nickname '{0}' already exists")]
    DuplicateKey(String),

    #[error("Account '{0}' not found")]
    NotFound(String),

    #[error("Account storage error at {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },
}

impl AccountError {
    /// Create a persistence error for the given file.
    pub fn persistence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Category reported to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountError::Validation { .. } => ErrorKind::ValidationError,
            AccountError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            AccountError::NotFound(_) => ErrorKind::NotFound,
            AccountError::Persistence { .. } => ErrorKind::PersistenceError,
        }
    }
}

/// Result type for account operations
pub type AccountResult<T> = Result<T, AccountError>;

/// Credential fields for one Jagex character.
///
/// Field names on disk and on the wire are the RuneLite environment variable
/// names, so a record can be handed to a daemon unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "JX_CHARACTER_ID", default, deserialize_with = "null_as_empty")]
    pub character_id: String,

    #[serde(rename = "JX_SESSION_ID", default, deserialize_with = "null_as_empty")]
    pub session_id: String,

    #[serde(rename = "JX_DISPLAY_NAME", default, deserialize_with = "null_as_empty")]
    pub display_name: String,

    #[serde(rename = "JX_REFRESH_TOKEN", default, deserialize_with = "null_as_empty")]
    pub refresh_token: String,

    #[serde(rename = "JX_ACCESS_TOKEN", default, deserialize_with = "null_as_empty")]
    pub access_token: String,
}

impl AccountRecord {
    /// Create a record with the three required fields and empty tokens.
    pub fn new(
        character_id: impl Into<String>,
        session_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            character_id: character_id.into(),
            session_id: session_id.into(),
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    /// Set both optional tokens.
    pub fn with_tokens(
        mut self,
        refresh_token: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        self.refresh_token = refresh_token.into();
        self.access_token = access_token.into();
        self
    }

    /// Check that every required field is non-blank.
    pub fn validate(&self) -> AccountResult<()> {
        let required = [
            (ENV_CHARACTER_ID, &self.character_id),
            (ENV_SESSION_ID, &self.session_id),
            (ENV_DISPLAY_NAME, &self.display_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AccountError::Validation { field });
            }
        }
        Ok(())
    }

    /// The environment RuneLite needs to start as this account.
    pub fn env_vars(&self) -> [(&'static str, &str); 5] {
        [
            (ENV_CHARACTER_ID, self.character_id.as_str()),
            (ENV_SESSION_ID, self.session_id.as_str()),
            (ENV_DISPLAY_NAME, self.display_name.as_str()),
            (ENV_REFRESH_TOKEN, self.refresh_token.as_str()),
            (ENV_ACCESS_TOKEN, self.access_token.as_str()),
        ]
    }
}

/// Validate a nickname used as a store key.
pub fn validate_nickname(nickname: &str) -> AccountResult<()> {
    if nickname.trim().is_empty() {
        return Err(AccountError::Validation { field: "nickname" });
    }
    Ok(())
}

// Older account files wrote `null` for tokens that were never filled in.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_complete_record() {
        let record = AccountRecord::new("c1", "s1", "Bob");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        let record = AccountRecord::new("c1", "", "Bob");
        match record.validate() {
            Err(AccountError::Validation { field }) => assert_eq!(field, ENV_SESSION_ID),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_whitespace_only() {
        let record = AccountRecord::new("c1", "s1", "   ");
        assert!(matches!(
            record.validate(),
            Err(AccountError::Validation {
                field: ENV_DISPLAY_NAME
            })
        ));
    }

    #[test]
    fn test_tokens_are_optional() {
        let record = AccountRecord::new("c1", "s1", "Bob").with_tokens("", "");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_wire_field_names() {
        let record = AccountRecord::new("c1", "s1", "Bob").with_tokens("r", "a");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["JX_CHARACTER_ID"], "c1");
        assert_eq!(json["JX_SESSION_ID"], "s1");
        assert_eq!(json["JX_DISPLAY_NAME"], "Bob");
        assert_eq!(json["JX_REFRESH_TOKEN"], "r");
        assert_eq!(json["JX_ACCESS_TOKEN"], "a");
    }

    #[test]
    fn test_null_and_missing_tokens_become_empty() {
        let json = r#"{
            "JX_CHARACTER_ID": "c1",
            "JX_SESSION_ID": "s1",
            "JX_DISPLAY_NAME": "Bob",
            "JX_REFRESH_TOKEN": null
        }"#;
        let record: AccountRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.refresh_token, "");
        assert_eq!(record.access_token, "");
    }

    #[test]
    fn test_env_vars_cover_all_fields() {
        let record = AccountRecord::new("c1", "s1", "Bob").with_tokens("r", "a");
        let env: std::collections::HashMap<_, _> = record.env_vars().into_iter().collect();
        assert_eq!(env[ENV_CHARACTER_ID], "c1");
        assert_eq!(env[ENV_ACCESS_TOKEN], "a");
        assert_eq!(env.len(), 5);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AccountError::DuplicateKey("a".into()).kind(),
            ErrorKind::DuplicateKey
        );
        assert_eq!(AccountError::NotFound("a".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            AccountError::persistence("/tmp/x", "disk full").kind(),
            ErrorKind::PersistenceError
        );
    }

    #[test]
    fn test_validate_nickname() {
        assert!(validate_nickname("main").is_ok());
        assert!(matches!(
            validate_nickname(" "),
            Err(AccountError::Validation { field: "nickname" })
        ));
    }
}
