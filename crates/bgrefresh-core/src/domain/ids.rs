//! Domain identifiers (strongly-typed IDs).
//!
//! - `TaskIdentifier`: 外部スケジューラに許可された論理タスク名（文字列）
//! - `LaunchId`: launch cycle ごとに採番される ULID
//! - `AssertionToken`: Execution Assertion Holder が払い出す不透明なトークン
//!
//! ## Phantom Type パターン
//! `Id<T>` の `T` は実行時には使わないマーカー型です。
//! 今は `LaunchId` だけですが、ID の種類が増えても混同できません。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

use super::errors::ConfigError;

/// Name of the logical background task.
///
/// Must match what the host scheduler was told to permit. Fixed at
/// construction and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskIdentifier(String);

impl TaskIdentifier {
    /// Validate and wrap an identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyIdentifier);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskIdentifier {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskIdentifier> for String {
    fn from(id: TaskIdentifier) -> Self {
        id.0
    }
}

impl fmt::Display for TaskIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token handed out by an `AssertionHolder`.
///
/// The holder decides the numbering; the manager only compares tokens so a
/// stale expiration callback cannot tear down a newer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssertionToken(u64);

impl AssertionToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AssertionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "assertion-{}", self.0)
    }
}

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "launch-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Launch cycle のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Launch {}

impl IdMarker for Launch {
    fn prefix() -> &'static str {
        "launch-"
    }
}

/// Identifier of one launch cycle (launch handler call to completion).
pub type LaunchId = Id<Launch>;
