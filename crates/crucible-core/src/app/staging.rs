//! Staging - タスクごとのローカル作業領域
//!
//! `{root}/{task_id}/{data,input,result}` の 3 ディレクトリをコンテナにバインドする。
//! パイプラインの実行中だけ存在し、終了時（成功・失敗とも）に削除する。

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::domain::TaskId;

pub const DATA_DIR: &str = "data";
pub const INPUT_DIR: &str = "input";
pub const RESULT_DIR: &str = "result";

/// Deterministic directory layout of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    root: PathBuf,
    data: PathBuf,
    input: PathBuf,
    result: PathBuf,
}

impl StagingLayout {
    pub fn for_task(staging_root: &Path, task_id: &TaskId) -> Self {
        let root = staging_root.join(task_id.as_str());
        Self {
            data: root.join(DATA_DIR),
            input: root.join(INPUT_DIR),
            result: root.join(RESULT_DIR),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data(&self) -> &Path {
        &self.data
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn result(&self) -> &Path {
        &self.result
    }

    /// Create all three directories from scratch.
    ///
    /// A tree left over from an earlier run of the same task is removed first, so
    /// its result files can never be collected again. Returns `true` in that case.
    pub async fn create(&self) -> io::Result<bool> {
        let stale = fs::try_exists(&self.root).await?;
        if stale {
            fs::remove_dir_all(&self.root).await?;
        }
        for dir in [&self.data, &self.input, &self.result] {
            fs::create_dir_all(dir).await?;
        }
        Ok(stale)
    }

    /// Remove the whole task tree. A tree that is already gone is not an error.
    pub async fn remove(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// First non-directory entry of `result`, in file name order.
    pub async fn find_artifact(&self) -> io::Result<Option<PathBuf>> {
        let mut entries = fs::read_dir(&self.result).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                names.push(entry.file_name());
            }
        }
        names.sort();
        Ok(names.into_iter().next().map(|name| self.result.join(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(dir: &TempDir, id: &str) -> StagingLayout {
        StagingLayout::for_task(dir.path(), &TaskId::parse(id).unwrap())
    }

    #[test]
    fn layout_is_deterministic() {
        let root = Path::new("/var/crucible");
        let layout = StagingLayout::for_task(root, &TaskId::parse("t1").unwrap());
        assert_eq!(layout.root(), Path::new("/var/crucible/t1"));
        assert_eq!(layout.data(), Path::new("/var/crucible/t1/data"));
        assert_eq!(layout.input(), Path::new("/var/crucible/t1/input"));
        assert_eq!(layout.result(), Path::new("/var/crucible/t1/result"));
    }

    #[tokio::test]
    async fn create_and_remove() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir, "t1");

        assert!(!layout.create().await.unwrap());
        assert!(layout.data().is_dir());
        assert!(layout.input().is_dir());
        assert!(layout.result().is_dir());

        layout.remove().await.unwrap();
        assert!(!layout.root().exists());
        // second removal is a no-op
        layout.remove().await.unwrap();
    }

    #[tokio::test]
    async fn create_discards_a_leftover_tree() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir, "t1");
        layout.create().await.unwrap();
        fs::write(layout.result().join("old.json"), b"{}").await.unwrap();

        assert!(layout.create().await.unwrap());
        assert!(layout.result().is_dir());
        assert_eq!(layout.find_artifact().await.unwrap(), None);
    }

    #[tokio::test]
    async fn artifact_is_first_file_by_name() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir, "t2");
        layout.create().await.unwrap();

        fs::create_dir(layout.result().join("a-dir")).await.unwrap();
        fs::write(layout.result().join("z.json"), b"{}").await.unwrap();
        fs::write(layout.result().join("b.json"), b"{}").await.unwrap();

        let found = layout.find_artifact().await.unwrap();
        assert_eq!(found, Some(layout.result().join("b.json")));
    }

    #[tokio::test]
    async fn empty_result_has_no_artifact() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir, "t3");
        layout.create().await.unwrap();
        fs::create_dir(layout.result().join("nested")).await.unwrap();

        assert_eq!(layout.find_artifact().await.unwrap(), None);
    }
}
