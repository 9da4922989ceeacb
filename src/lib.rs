//! Notify Hub - 开发工具通知的路由、限流、聚合与多渠道投递

pub mod cli;
pub mod config;
pub mod error;
pub mod notification;

pub use config::RouterConfig;
pub use error::{DeliveryError, RouterError};
pub use notification::{
    Feedback, NotificationRouter, NotifyOptions, NotifyOutcome, Priority, RouterBuilder, Scheduler,
};
