//! GPU capability - GPU ランタイムの有無
//!
//! # ライフサイクル
//! - LifecycleManager の構築時に 1 回だけ probe する
//! - 実行中は true → false への降格のみ（昇格はプロセス再起動まで無し）
//! - 読み書きは AtomicBool（probe と fallback は別の経路から書き込む）

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::domain::container::GPU_DRIVER;
use crate::ports::ContainerEngine;

/// Process-wide GPU capability flag. Monotonic: it can only go from true to false.
#[derive(Debug)]
pub struct GpuCapability {
    available: AtomicBool,
}

impl GpuCapability {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    /// Ask the engine for its runtimes once.
    ///
    /// A failed query is not fatal: it yields `false` and a warning.
    pub async fn probe(engine: &dyn ContainerEngine) -> Self {
        let available = match engine.runtimes().await {
            Ok(runtimes) => {
                let found = runtimes.iter().any(|name| name == GPU_DRIVER);
                debug!(?runtimes, gpu = found, "probed engine runtimes");
                found
            }
            Err(err) => {
                warn!(error = %err, "checking GPU support failed, proceeding without GPU");
                false
            }
        };
        info!(gpu = available, "GPU capability detected");
        Self::new(available)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Downgrade to CPU-only. Returns true only for the call that made the transition.
    pub fn downgrade(&self) -> bool {
        self.available.swap(false, Ordering::AcqRel)
    }
}
