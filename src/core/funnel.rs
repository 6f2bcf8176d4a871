use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{IncomeBracket, Money, PaymentMethod};

pub const AMOUNT_KEY: &str = "investmentAmount";
pub const INCOME_RANGE_KEY: &str = "investmentIncomeRange";
pub const PAYMENT_METHOD_KEY: &str = "investmentPaymentMethod";
pub const PAYMENT_COMPLETE_KEY: &str = "investmentPaymentComplete";
pub const LEFT_INCOMPLETE_KEY: &str = "investmentLeftIncomplete";

const FUNNEL_KEYS: [&str; 5] = [
    AMOUNT_KEY,
    INCOME_RANGE_KEY,
    PAYMENT_METHOD_KEY,
    PAYMENT_COMPLETE_KEY,
    LEFT_INCOMPLETE_KEY,
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write funnel state to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode funnel state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Cross-step record threaded through every funnel step.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FunnelState {
    pub amount: Option<Money>,
    pub income_range: Option<IncomeBracket>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_complete: bool,
    /// Investor acknowledged leaving with payment still pending.
    pub left_incomplete: bool,
}

impl FunnelState {
    pub fn apply(&mut self, patch: &FunnelStatePatch) {
        if let Some(amount) = patch.amount {
            self.amount = Some(amount);
        }
        if let Some(range) = patch.income_range {
            self.income_range = Some(range);
        }
        if let Some(method) = patch.payment_method {
            self.payment_method = Some(method);
        }
        if let Some(complete) = patch.payment_complete {
            self.payment_complete = complete;
        }
        if let Some(left) = patch.left_incomplete {
            self.left_incomplete = left;
        }
    }

    /// Navigation parameters win over whatever was persisted for the fields they carry.
    pub fn overlay(mut self, params: &NavigationParams) -> Self {
        self.apply(&params.as_patch());
        self
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct FunnelStatePatch {
    pub amount: Option<Money>,
    pub income_range: Option<IncomeBracket>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_complete: Option<bool>,
    pub left_incomplete: Option<bool>,
}

impl FunnelStatePatch {
    pub fn amount(amount: Money) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn income_range(range: IncomeBracket) -> Self {
        Self {
            income_range: Some(range),
            ..Self::default()
        }
    }

    pub fn payment_method(method: PaymentMethod) -> Self {
        Self {
            payment_method: Some(method),
            ..Self::default()
        }
    }

    pub fn payment_complete() -> Self {
        Self {
            payment_complete: Some(true),
            ..Self::default()
        }
    }

    pub fn left_incomplete() -> Self {
        Self {
            left_incomplete: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Query parameters exactly as they arrive on a step URL.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawNavigationParams {
    pub amount: Option<String>,
    pub income_range: Option<String>,
}

/// Defensively parsed navigation parameters. Garbage is treated as absent.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavigationParams {
    pub amount: Option<Money>,
    pub income_range: Option<IncomeBracket>,
}

impl NavigationParams {
    pub fn parse(raw: &RawNavigationParams) -> Self {
        Self {
            amount: raw.amount.as_deref().and_then(Money::parse),
            income_range: raw.income_range.as_deref().and_then(IncomeBracket::parse),
        }
    }

    pub fn as_patch(&self) -> FunnelStatePatch {
        FunnelStatePatch {
            amount: self.amount,
            income_range: self.income_range,
            ..FunnelStatePatch::default()
        }
    }

    pub fn to_query(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(amount) = self.amount {
            pairs.push(format!("amount={}", amount.to_plain_string()));
        }
        if let Some(range) = self.income_range {
            pairs.push(format!("incomeRange={}", range.as_str()));
        }
        pairs.join("&")
    }
}

impl From<&RawNavigationParams> for NavigationParams {
    fn from(raw: &RawNavigationParams) -> Self {
        Self::parse(raw)
    }
}

/// String key-value storage with browser local-storage semantics.
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON-file backed storage. Every write is flushed before returning.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStorage {
    /// Opens `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding corrupt funnel storage");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "funnel storage unreadable, starting fresh");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let encoded = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&tmp_path, encoded).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(io_err)
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Read/write access to the funnel record shared by every step.
pub trait FunnelStateStore {
    fn get(&self) -> FunnelState;

    fn set(&mut self, patch: FunnelStatePatch) -> Result<(), StorageError>;

    fn clear(&mut self) -> Result<(), StorageError>;

    /// Persisted state with inbound parameters layered on top. Nothing is written.
    fn get_with_params(&self, params: &NavigationParams) -> FunnelState {
        self.get().overlay(params)
    }

    /// Like [`FunnelStateStore::get_with_params`], but commits the carried fields.
    fn reconcile(&mut self, params: &NavigationParams) -> Result<FunnelState, StorageError> {
        let patch = params.as_patch();
        if !patch.is_empty() {
            self.set(patch)?;
        }
        Ok(self.get())
    }
}

/// [`FunnelStateStore`] laid out over individual string keys.
#[derive(Debug, Default)]
pub struct KeyValueFunnelStore<S> {
    storage: S,
}

impl<S: KeyValueStorage> KeyValueFunnelStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn read_field<T>(&self, key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let raw = self.storage.get_item(key)?;
        let parsed = parse(&raw);
        if parsed.is_none() {
            warn!(key, value = %raw, "ignoring unparsable funnel field");
        }
        parsed
    }
}

pub type MemoryFunnelStore = KeyValueFunnelStore<MemoryStorage>;

impl MemoryFunnelStore {
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl<S: KeyValueStorage> FunnelStateStore for KeyValueFunnelStore<S> {
    fn get(&self) -> FunnelState {
        FunnelState {
            amount: self.read_field(AMOUNT_KEY, Money::parse),
            income_range: self.read_field(INCOME_RANGE_KEY, IncomeBracket::parse),
            payment_method: self.read_field(PAYMENT_METHOD_KEY, PaymentMethod::parse),
            payment_complete: self
                .read_field(PAYMENT_COMPLETE_KEY, parse_flag)
                .unwrap_or(false),
            left_incomplete: self
                .read_field(LEFT_INCOMPLETE_KEY, parse_flag)
                .unwrap_or(false),
        }
    }

    fn set(&mut self, patch: FunnelStatePatch) -> Result<(), StorageError> {
        debug!(?patch, "committing funnel state");
        if let Some(amount) = patch.amount {
            self.storage.set_item(AMOUNT_KEY, &amount.to_plain_string())?;
        }
        if let Some(range) = patch.income_range {
            self.storage.set_item(INCOME_RANGE_KEY, range.as_str())?;
        }
        if let Some(method) = patch.payment_method {
            self.storage.set_item(PAYMENT_METHOD_KEY, method.as_str())?;
        }
        if let Some(complete) = patch.payment_complete {
            self.storage
                .set_item(PAYMENT_COMPLETE_KEY, if complete { "true" } else { "false" })?;
        }
        if let Some(left) = patch.left_incomplete {
            self.storage
                .set_item(LEFT_INCOMPLETE_KEY, if left { "true" } else { "false" })?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        for key in FUNNEL_KEYS {
            self.storage.remove_item(key)?;
        }
        Ok(())
    }
}
