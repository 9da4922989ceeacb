//! 通知路由与投递管道
//!
//! # 组成
//! 1. `registry` / `rules`：渠道注册表与路由规则，决定一条通知发往哪些渠道
//! 2. `preference`：根据历史反馈对候选渠道重新排序
//! 3. `dnd` / `aggregator`：免打扰抑制与相似通知合并
//! 4. `rate_limit` / `queue`：全局与按渠道限流，被限流的渠道进入队列等待重试
//! 5. `dispatcher` / `channels`：并发发送到各渠道 adapter，单个渠道失败互不影响
//! 6. `router` / `scheduler`：对外入口与周期 tick
//!
//! # 使用示例
//! ```ignore
//! use notify_hub::config::RouterConfig;
//! use notify_hub::notification::{NotifyOptions, RouterBuilder};
//!
//! let router = RouterBuilder::new(RouterConfig::default()).build()?;
//! let outcome = router.notify("build failed on main", NotifyOptions::default()).await;
//! ```

pub mod aggregator;
pub mod builder;
pub mod channel;
pub mod channels;
pub mod dispatcher;
pub mod dnd;
pub mod history;
pub mod message;
pub mod preference;
pub mod priority;
pub mod queue;
pub mod rate_limit;
pub mod registry;
pub mod router;
pub mod rules;
pub mod scheduler;
pub mod similarity;
pub mod store;

pub use aggregator::{Aggregator, Offer};
pub use builder::RouterBuilder;
pub use channel::{ChannelTestReport, NotificationChannel, SendResult};
pub use dispatcher::{DeliveryOutcome, DeliveryResult, NotificationDispatcher};
pub use dnd::{should_suppress, DndSchedule};
pub use history::{Feedback, HistoryLog, HistoryRecord};
pub use message::{Notification, NotificationKind, NotifyOptions};
pub use preference::{ChannelPreference, PreferenceScorer};
pub use priority::{NotificationType, Priority};
pub use queue::DeliveryQueue;
pub use rate_limit::{Admission, AdmissionController};
pub use registry::ChannelRegistry;
pub use router::{NotificationRouter, NotifyOutcome, RouterStatus, TickReport};
pub use rules::{Rule, RuleMatcher};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use similarity::text_similarity;
