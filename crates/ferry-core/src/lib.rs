//! ferry-core
//!
//! Task-group execution engine for reader/writer data transfer jobs.
//!
//! # モジュール構成
//! - **element**: Record / Column / 型変換
//! - **exchange**: RecordQueue, Channel, RecordExchanger（reader -> writer のパイプ）
//! - **plugin**: Plugin trait 群、PluginRegistry、バッチ書き込みループ
//! - **taskgroup**: runner / executer / manager / scheduler / container
//! - **job**: job 設定をタスク設定に分割
//! - **config**: JSON 設定のパスアクセス
//! - **observability**: 状態スナップショット
//! - **error**: エラー型

pub mod config;
pub mod element;
pub mod error;
pub mod exchange;
pub mod job;
pub mod observability;
pub mod plugin;
pub mod taskgroup;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::FerryError;
pub use job::JobSplitter;
pub use taskgroup::TaskGroupContainer;
