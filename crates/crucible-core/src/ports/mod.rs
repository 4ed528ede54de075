//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（コンテナエンジン、オブジェクトストレージ、入力データ）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - エンジンとストレージは外部のコラボレータ（このクレートはクライアント側のみ）
//! - 状態の正本は持たない（結果は戻り値のみ）

pub mod artifact_store;
pub mod container_engine;
pub mod input_source;
pub mod progress;

// 主要な trait を再エクスポート
pub use self::artifact_store::{ArtifactBody, ArtifactStore};
pub use self::container_engine::{ContainerEngine, LogStream, PullStream};
pub use self::input_source::InputSource;
pub use self::progress::PullProgressSink;
