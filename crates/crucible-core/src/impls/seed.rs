//! SeedDirectory - 固定のシードファイルを入力として配置する InputSource
//!
//! `<seed>/data/**` → `{staging}/data`、`<seed>/input/**` → `{staging}/input`。
//! ファイルのパーミッションは保持する。片方のディレクトリが無ければ何もしない。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

use crate::app::staging::{DATA_DIR, INPUT_DIR, StagingLayout};
use crate::domain::TaskId;
use crate::ports::InputSource;

#[derive(Debug, Clone)]
pub struct SeedDirectory {
    root: PathBuf,
}

impl SeedDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Copy the tree under `src` into `dst`. Returns the number of files copied.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    if !src.is_dir() {
        return Ok(0);
    }

    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            fs::set_permissions(&target, entry.metadata().map_err(io::Error::other)?.permissions())?;
            copied += 1;
        }
        // symlinks and special files are not part of a seed
    }
    Ok(copied)
}

#[async_trait]
impl InputSource for SeedDirectory {
    async fn populate(&self, task_id: &TaskId, layout: &StagingLayout) -> io::Result<()> {
        let pairs = [
            (self.root.join(DATA_DIR), layout.data().to_path_buf()),
            (self.root.join(INPUT_DIR), layout.input().to_path_buf()),
        ];

        let copied = tokio::task::spawn_blocking(move || {
            pairs
                .iter()
                .try_fold(0, |total, (src, dst)| Ok::<_, io::Error>(total + copy_tree(src, dst)?))
        })
        .await
        .map_err(io::Error::other)??;

        debug!(task_id = %task_id, seed = %self.root.display(), files = copied, "seed files staged");
        Ok(())
    }
}
