//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryScheduler**: 手動で launch できるスケジューラ
//! - **InMemoryAssertions**: 取得/解放を数える assertion holder
//! - **InMemoryHost**: background/foreground を切り替えられるホスト
//! - **RecordingEventSink** / **TracingEventSink**
//!
//! # 本番用実装
//! プラットフォームのスケジューラへのブリッジは別クレートに置く想定。

pub mod event_sinks;
pub mod inmem_assertion;
pub mod inmem_host;
pub mod inmem_scheduler;

pub use self::event_sinks::{RecordingEventSink, TracingEventSink};
pub use self::inmem_assertion::InMemoryAssertions;
pub use self::inmem_host::InMemoryHost;
pub use self::inmem_scheduler::{CompletionRecord, InMemoryScheduler};
