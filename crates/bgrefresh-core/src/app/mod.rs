//! App - アプリケーション層
//!
//! ports を組み合わせて lifecycle manager を実装する。
//!
//! # 主要コンポーネント
//! - **RefreshBuilder**: 構築とワイヤリング（登録はここで行う）
//! - **RefreshManager** / **RefreshHandle**: 呼び出し側の窓口
//! - **Driver**: launch cycle の状態機械（単一の tokio task）
//! - **AutoCompleteTimer**: キャンセル可能な一発タイマー
//! - **AssertionSlot**: execution assertion の保持
//! - **RefreshStatus**: 状態のスナップショット

pub mod builder;
pub mod handle;
pub mod status;
pub mod timer;

mod assertion;
mod lifecycle;

#[cfg(test)]
mod lifecycle_tests;

pub use self::builder::RefreshBuilder;
pub use self::handle::{Action, RefreshHandle, RefreshManager};
pub use self::status::RefreshStatus;
pub use self::timer::AutoCompleteTimer;
