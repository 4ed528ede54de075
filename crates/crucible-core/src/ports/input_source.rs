//! InputSource port - ステージング領域への入力データ投入

use std::io;

use async_trait::async_trait;

use crate::app::staging::StagingLayout;
use crate::domain::TaskId;

/// InputSource はタスクの入力を `data` / `input` に配置する
///
/// ステージングディレクトリは呼び出し前に作成済み。
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn populate(&self, task_id: &TaskId, layout: &StagingLayout) -> io::Result<()>;
}
