//! Publish/subscribe credentials and the sources they can be read from.
//!
//! A [`CredentialSet`] is the seven values a transport needs to connect. They
//! can be read through any [`CredentialSource`]: the configured defaults, the
//! persisted copy, the currently applied set, or a UI edit buffer. The
//! [`CredentialStore`] owns the applied set and handles persistence.

pub mod sources;
pub mod store;

pub use sources::{CurrentCreds, DefaultCreds, SavedCreds, UiCreds};
pub use store::{CredentialStore, FileStore, KeyValueStore, MemoryStore, StoreValue};

use crate::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Persistence keys of the credential fields.
pub mod keys {
    pub const ACCOUNT_ID: &str = "ACCOUNT_ID";
    pub const PUB_STREAM_NAME: &str = "PUB_STREAM_NAME";
    pub const SUB_STREAM_NAME: &str = "SUB_STREAM_NAME";
    pub const PUBLISH_TOKEN: &str = "PUBLISH_TOKEN";
    pub const SUBSCRIBE_TOKEN: &str = "SUBSCRIBE_TOKEN";
    pub const PUBLISH_URL: &str = "PUBLISH_URL";
    pub const SUBSCRIBE_URL: &str = "SUBSCRIBE_URL";
}

/// The seven values needed to publish and subscribe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSet {
    pub account_id: String,
    pub pub_stream_name: String,
    pub sub_stream_name: String,
    pub pub_token: String,
    pub sub_token: String,
    pub pub_api_url: String,
    pub sub_api_url: String,
}

impl Default for CredentialSet {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            pub_stream_name: "castlane".to_string(),
            sub_stream_name: "castlane".to_string(),
            pub_token: String::new(),
            sub_token: String::new(),
            pub_api_url: "https://director.example.com/api/director/publish".to_string(),
            sub_api_url: "https://director.example.com/api/director/subscribe".to_string(),
        }
    }
}

impl CredentialSet {
    /// Read every field out of a source.
    pub fn from_source(source: &dyn CredentialSource) -> Self {
        Self {
            account_id: source.account_id(),
            pub_stream_name: source.pub_stream_name(),
            sub_stream_name: source.sub_stream_name(),
            pub_token: source.pub_token(),
            sub_token: source.sub_token(),
            pub_api_url: source.pub_api_url(),
            sub_api_url: source.sub_api_url(),
        }
    }

    pub fn get(&self, field: CredentialField) -> &str {
        match field {
            CredentialField::AccountId => &self.account_id,
            CredentialField::PubStreamName => &self.pub_stream_name,
            CredentialField::SubStreamName => &self.sub_stream_name,
            CredentialField::PubToken => &self.pub_token,
            CredentialField::SubToken => &self.sub_token,
            CredentialField::PubApiUrl => &self.pub_api_url,
            CredentialField::SubApiUrl => &self.sub_api_url,
        }
    }

    pub fn set(&mut self, field: CredentialField, value: impl Into<String>) {
        let value = value.into();
        match field {
            CredentialField::AccountId => self.account_id = value,
            CredentialField::PubStreamName => self.pub_stream_name = value,
            CredentialField::SubStreamName => self.sub_stream_name = value,
            CredentialField::PubToken => self.pub_token = value,
            CredentialField::SubToken => self.sub_token = value,
            CredentialField::PubApiUrl => self.pub_api_url = value,
            CredentialField::SubApiUrl => self.sub_api_url = value,
        }
    }

    /// Check the fields a publisher connection needs.
    pub fn validate_for_publish(&self) -> Result<(), SessionError> {
        require(&self.pub_stream_name, "publishing stream name")?;
        require(&self.pub_token, "publishing token")?;
        require(&self.pub_api_url, "publishing API url")
    }

    /// Check the fields a subscriber connection needs.
    pub fn validate_for_subscribe(&self) -> Result<(), SessionError> {
        require(&self.account_id, "account ID")?;
        require(&self.sub_stream_name, "subscribing stream name")?;
        require(&self.sub_api_url, "subscribing API url")
    }

    /// One-line description safe for logs: tokens are masked.
    pub fn summary(&self) -> String {
        format!(
            "Account ID: {} Pub stream: {} Sub stream: {} Pub token: {} Sub token: {} Pub url: {} Sub url: {}",
            self.account_id,
            self.pub_stream_name,
            self.sub_stream_name,
            mask(&self.pub_token),
            mask(&self.sub_token),
            self.pub_api_url,
            self.sub_api_url
        )
    }
}

fn require(value: &str, what: &str) -> Result<(), SessionError> {
    if value.trim().is_empty() {
        Err(SessionError::InvalidCredentials(format!("{} is missing", what)))
    } else {
        Ok(())
    }
}

fn mask(token: &str) -> String {
    match token.chars().count() {
        0 => "<none>".to_string(),
        n if n <= 4 => "****".to_string(),
        _ => format!("{}****", token.chars().take(4).collect::<String>()),
    }
}

/// Names one of the seven credential fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialField {
    AccountId,
    PubStreamName,
    SubStreamName,
    PubToken,
    SubToken,
    PubApiUrl,
    SubApiUrl,
}

impl CredentialField {
    pub const ALL: [CredentialField; 7] = [
        CredentialField::AccountId,
        CredentialField::PubStreamName,
        CredentialField::SubStreamName,
        CredentialField::PubToken,
        CredentialField::SubToken,
        CredentialField::PubApiUrl,
        CredentialField::SubApiUrl,
    ];

    /// Persistence key of this field.
    pub fn key(&self) -> &'static str {
        match self {
            CredentialField::AccountId => keys::ACCOUNT_ID,
            CredentialField::PubStreamName => keys::PUB_STREAM_NAME,
            CredentialField::SubStreamName => keys::SUB_STREAM_NAME,
            CredentialField::PubToken => keys::PUBLISH_TOKEN,
            CredentialField::SubToken => keys::SUBSCRIBE_TOKEN,
            CredentialField::PubApiUrl => keys::PUBLISH_URL,
            CredentialField::SubApiUrl => keys::SUBSCRIBE_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialField::AccountId => "account_id",
            CredentialField::PubStreamName => "pub_stream_name",
            CredentialField::SubStreamName => "sub_stream_name",
            CredentialField::PubToken => "pub_token",
            CredentialField::SubToken => "sub_token",
            CredentialField::PubApiUrl => "pub_api_url",
            CredentialField::SubApiUrl => "sub_api_url",
        }
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialField {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s || field.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| SessionError::InvalidArgument(format!("unknown credential field '{}'", s)))
    }
}

/// Tag identifying which flavour of source a [`CredentialSource`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Default,
    Saved,
    Current,
    Ui,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Default => "default",
            SourceType::Saved => "saved",
            SourceType::Current => "current",
            SourceType::Ui => "ui",
        }
    }
}

impl FromStr for SourceType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(SourceType::Default),
            "saved" => Ok(SourceType::Saved),
            "current" => Ok(SourceType::Current),
            "ui" => Ok(SourceType::Ui),
            other => Err(SessionError::InvalidArgument(format!(
                "unknown credential source '{}'",
                other
            ))),
        }
    }
}

/// Uniform read contract over every credential source.
pub trait CredentialSource: Send + Sync {
    fn source_type(&self) -> SourceType;
    fn account_id(&self) -> String;
    fn pub_stream_name(&self) -> String;
    fn sub_stream_name(&self) -> String;
    fn pub_token(&self) -> String;
    fn sub_token(&self) -> String;
    fn pub_api_url(&self) -> String;
    fn sub_api_url(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> CredentialSet {
        CredentialSet {
            account_id: "acct".to_string(),
            pub_stream_name: "pub".to_string(),
            sub_stream_name: "sub".to_string(),
            pub_token: "abcdef123456".to_string(),
            sub_token: String::new(),
            pub_api_url: "https://pub.example.com".to_string(),
            sub_api_url: "https://sub.example.com".to_string(),
        }
    }

    #[test]
    fn test_summary_masks_tokens() {
        let summary = filled().summary();
        assert!(summary.contains("abcd****"));
        assert!(!summary.contains("abcdef123456"));
        assert!(summary.contains("Sub token: <none>"));
    }

    #[test]
    fn test_publish_validation() {
        let mut creds = filled();
        assert!(creds.validate_for_publish().is_ok());
        creds.pub_token.clear();
        assert!(matches!(
            creds.validate_for_publish(),
            Err(SessionError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_subscribe_validation_needs_account() {
        let mut creds = filled();
        assert!(creds.validate_for_subscribe().is_ok());
        creds.account_id = "  ".to_string();
        assert!(creds.validate_for_subscribe().is_err());
    }

    #[test]
    fn test_field_parsing() {
        assert_eq!(
            "pub_token".parse::<CredentialField>().unwrap(),
            CredentialField::PubToken
        );
        assert_eq!(
            "SUBSCRIBE_URL".parse::<CredentialField>().unwrap(),
            CredentialField::SubApiUrl
        );
        assert!("colour".parse::<CredentialField>().is_err());
    }

    #[test]
    fn test_get_set_by_field() {
        let mut creds = CredentialSet::default();
        for field in CredentialField::ALL {
            creds.set(field, field.key());
        }
        for field in CredentialField::ALL {
            assert_eq!(creds.get(field), field.key());
        }
    }
}
