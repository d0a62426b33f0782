//! IdGenerator port - ID 生成の抽象化
//!
//! launch cycle ごとに `LaunchId` を払い出す。ログとイベントで
//! どの cycle の話かを追えるようにするためのもの。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock から timestamp を取る）

use crate::domain::ids::LaunchId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は launch ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（driver task に move するため）
pub trait IdGenerator: Send + Sync {
    fn generate_launch_id(&self) -> LaunchId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡すと timestamp 部分が決定的になる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_launch_id(&self) -> LaunchId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        LaunchId::from(ulid)
    }
}
