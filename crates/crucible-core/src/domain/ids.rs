//! Domain identifiers (strongly-typed IDs).
//!
//! - **TaskId**: タスクの識別子。ステージングディレクトリ名にもなるため、検証済みの文字列のみ許可
//! - **ContainerHandle**: エンジンが返したコンテナ ID。1 回の実行の間だけ LifecycleManager が所有する
//! - **ArtifactKey**: ArtifactStore 上の論理キー（`tasks/{task_id}/{file_name}`）

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

const MAX_TASK_ID_LEN: usize = 128;

/// InvalidId は ID の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidId {
    #[error("identifier must not be empty")]
    Empty,

    #[error("identifier is longer than 128 characters")]
    TooLong,

    #[error("identifier contains forbidden character {0:?}")]
    ForbiddenChar(char),

    #[error("identifier must not be a relative path component: {0}")]
    RelativeComponent(String),

    #[error("artifact key has an empty segment: {0}")]
    EmptySegment(String),
}

/// Identifier of a task invocation.
///
/// # 制約
/// - 空文字列は不可、最大 128 文字
/// - `[A-Za-z0-9._-]` のみ（パス区切りは不可）
/// - `.` / `..` は不可
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// 文字列を検証して TaskId を作成
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidId> {
        let value = value.into();
        if value.is_empty() {
            return Err(InvalidId::Empty);
        }
        if value.len() > MAX_TASK_ID_LEN {
            return Err(InvalidId::TooLong);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(InvalidId::ForbiddenChar(c));
        }
        if value == "." || value == ".." {
            return Err(InvalidId::RelativeComponent(value));
        }
        Ok(Self(value))
    }

    /// ULID ベースの新しい TaskId（`task-<ulid>`）
    pub fn generate() -> Self {
        Self(format!("task-{}", Ulid::new().to_string().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = InvalidId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Opaque container identifier returned by the engine on creation.
///
/// Not `Clone`: removal consumes the handle, so a removed container cannot be
/// addressed again through the same handle.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Docker 風の短縮 ID（ログ用）
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Logical object key inside the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// `/` 区切りのキーを検証して作成
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidId> {
        let value = value.into();
        if value.is_empty() {
            return Err(InvalidId::Empty);
        }
        for segment in value.split('/') {
            if segment.is_empty() {
                return Err(InvalidId::EmptySegment(value));
            }
            if segment == "." || segment == ".." {
                return Err(InvalidId::RelativeComponent(value));
            }
            if let Some(c) = segment.chars().find(|c| c.is_control() || *c == '\\') {
                return Err(InvalidId::ForbiddenChar(c));
            }
        }
        Ok(Self(value))
    }

    /// Key under which a task's artifact is stored: `tasks/{task_id}/{file_name}`.
    pub fn for_task(task_id: &TaskId, file_name: &str) -> Result<Self, InvalidId> {
        Self::parse(format!("tasks/{}/{}", task_id, file_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 最後のセグメント（ファイル名）
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for ArtifactKey {
    type Error = InvalidId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ArtifactKey> for String {
    fn from(key: ArtifactKey) -> Self {
        key.0
    }
}
