//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。外部のスケジューラ、
//! assertion 機構、ホストの実行モード通知を trait として切り出し、
//! lifecycle manager をそれらの実体から切り離す。

pub mod assertion;
pub mod clock;
pub mod event_sink;
pub mod host;
pub mod id_generator;
pub mod scheduler;

pub use self::assertion::{AssertionHolder, ExpirationHandler};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::host::{BackgroundEntered, HostEnvironment};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::scheduler::{LaunchHandler, Scheduler, TaskHandle};
