//! The four credential source flavours.

use super::{CredentialField, CredentialSet, CredentialSource, KeyValueStore, SourceType};
use std::sync::{Arc, RwLock};

/// Configured fallback values.
#[derive(Debug, Clone)]
pub struct DefaultCreds {
    set: CredentialSet,
}

impl DefaultCreds {
    pub fn new(set: CredentialSet) -> Self {
        Self { set }
    }
}

impl CredentialSource for DefaultCreds {
    fn source_type(&self) -> SourceType {
        SourceType::Default
    }
    fn account_id(&self) -> String {
        self.set.account_id.clone()
    }
    fn pub_stream_name(&self) -> String {
        self.set.pub_stream_name.clone()
    }
    fn sub_stream_name(&self) -> String {
        self.set.sub_stream_name.clone()
    }
    fn pub_token(&self) -> String {
        self.set.pub_token.clone()
    }
    fn sub_token(&self) -> String {
        self.set.sub_token.clone()
    }
    fn pub_api_url(&self) -> String {
        self.set.pub_api_url.clone()
    }
    fn sub_api_url(&self) -> String {
        self.set.sub_api_url.clone()
    }
}

/// Values from the durable store, falling back to the defaults field by field.
pub struct SavedCreds {
    store: Arc<dyn KeyValueStore>,
    defaults: DefaultCreds,
}

impl SavedCreds {
    pub fn new(store: Arc<dyn KeyValueStore>, defaults: DefaultCreds) -> Self {
        Self { store, defaults }
    }

    fn read(&self, field: CredentialField) -> String {
        match self.store.get_string(field.key()) {
            Some(value) => value,
            None => self.defaults.set.get(field).to_string(),
        }
    }
}

impl CredentialSource for SavedCreds {
    fn source_type(&self) -> SourceType {
        SourceType::Saved
    }
    fn account_id(&self) -> String {
        self.read(CredentialField::AccountId)
    }
    fn pub_stream_name(&self) -> String {
        self.read(CredentialField::PubStreamName)
    }
    fn sub_stream_name(&self) -> String {
        self.read(CredentialField::SubStreamName)
    }
    fn pub_token(&self) -> String {
        self.read(CredentialField::PubToken)
    }
    fn sub_token(&self) -> String {
        self.read(CredentialField::SubToken)
    }
    fn pub_api_url(&self) -> String {
        self.read(CredentialField::PubApiUrl)
    }
    fn sub_api_url(&self) -> String {
        self.read(CredentialField::SubApiUrl)
    }
}

/// Read-only projection of the credentials currently applied to the session.
#[derive(Clone)]
pub struct CurrentCreds {
    applied: Arc<RwLock<CredentialSet>>,
}

impl CurrentCreds {
    pub(crate) fn new(applied: Arc<RwLock<CredentialSet>>) -> Self {
        Self { applied }
    }

    fn read(&self, field: CredentialField) -> String {
        match self.applied.read() {
            Ok(set) => set.get(field).to_string(),
            Err(poisoned) => poisoned.into_inner().get(field).to_string(),
        }
    }
}

impl CredentialSource for CurrentCreds {
    fn source_type(&self) -> SourceType {
        SourceType::Current
    }
    fn account_id(&self) -> String {
        self.read(CredentialField::AccountId)
    }
    fn pub_stream_name(&self) -> String {
        self.read(CredentialField::PubStreamName)
    }
    fn sub_stream_name(&self) -> String {
        self.read(CredentialField::SubStreamName)
    }
    fn pub_token(&self) -> String {
        self.read(CredentialField::PubToken)
    }
    fn sub_token(&self) -> String {
        self.read(CredentialField::SubToken)
    }
    fn pub_api_url(&self) -> String {
        self.read(CredentialField::PubApiUrl)
    }
    fn sub_api_url(&self) -> String {
        self.read(CredentialField::SubApiUrl)
    }
}

/// User-entered values that have not been applied yet.
#[derive(Debug, Default)]
pub struct UiCreds {
    buffer: RwLock<CredentialSet>,
}

impl UiCreds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the buffer from another source, e.g. the current or saved credentials.
    pub fn from_source(source: &dyn CredentialSource) -> Self {
        Self {
            buffer: RwLock::new(CredentialSet::from_source(source)),
        }
    }

    /// Overwrite every field with the values of another source.
    pub fn load(&self, source: &dyn CredentialSource) {
        let set = CredentialSet::from_source(source);
        match self.buffer.write() {
            Ok(mut buffer) => *buffer = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
        log::debug!("UI credentials loaded from {} source", source.source_type().as_str());
    }

    pub fn set(&self, field: CredentialField, value: impl Into<String>) {
        match self.buffer.write() {
            Ok(mut buffer) => buffer.set(field, value),
            Err(poisoned) => poisoned.into_inner().set(field, value),
        }
    }

    fn read(&self, field: CredentialField) -> String {
        match self.buffer.read() {
            Ok(set) => set.get(field).to_string(),
            Err(poisoned) => poisoned.into_inner().get(field).to_string(),
        }
    }
}

impl CredentialSource for UiCreds {
    fn source_type(&self) -> SourceType {
        SourceType::Ui
    }
    fn account_id(&self) -> String {
        self.read(CredentialField::AccountId)
    }
    fn pub_stream_name(&self) -> String {
        self.read(CredentialField::PubStreamName)
    }
    fn sub_stream_name(&self) -> String {
        self.read(CredentialField::SubStreamName)
    }
    fn pub_token(&self) -> String {
        self.read(CredentialField::PubToken)
    }
    fn sub_token(&self) -> String {
        self.read(CredentialField::SubToken)
    }
    fn pub_api_url(&self) -> String {
        self.read(CredentialField::PubApiUrl)
    }
    fn sub_api_url(&self) -> String {
        self.read(CredentialField::SubApiUrl)
    }
}
