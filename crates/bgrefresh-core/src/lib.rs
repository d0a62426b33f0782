//! bgrefresh-core
//!
//! Lifecycle manager for a recurring, time-boxed background refresh task.
//!
//! An external scheduler periodically grants permission to run. The manager
//! requests future launches, runs the caller's action under an execution
//! assertion, completes each launch exactly once (either when the
//! auto-complete timer fires or when the caller clears its processing flag),
//! and re-arms the next request while the host stays in the background.
//!
//! # モジュール構成
//! - **domain**: 値とルール（identifier, request, cycle phase, events, errors）
//! - **ports**: 外部との境界（Scheduler, AssertionHolder, HostEnvironment, Clock, ...）
//! - **app**: RefreshBuilder / RefreshManager / driver / timer
//! - **impls**: 開発・テスト用の in-memory 実装
//! - **config**: RefreshConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{RefreshBuilder, RefreshHandle, RefreshManager, RefreshStatus};
pub use config::RefreshConfig;
pub use domain::{RefreshError, TaskIdentifier};
