//! # LIS 检验引擎模块
//!
//! 提供完整的医嘱生命周期与危急值报警管理功能，包括：
//! - 医嘱状态机：管理检验医嘱的完整生命周期
//! - 项目目录：检验项目定义、参考范围与危急值判定
//! - 医嘱登记：医嘱创建、查询与乐观并发状态转换
//! - 结果录入：结果提交、危急值检测与自动状态推进
//! - 报警派发：危急值通知、重试、升级与确认
//! - 统计汇总：按需重算的运营指标快照

pub mod catalog;
pub mod dispatch;
pub mod engine;
pub mod ingest;
pub mod registry;
pub mod state_machine;
pub mod stats;

// 重新导出主要类型
pub use catalog::TestCatalog;
pub use dispatch::{AlertDispatcher, DispatchConfig, LogNotificationSender, NotificationSender};
pub use engine::LabEngine;
pub use ingest::{ResultIngestor, ResultStore};
pub use registry::{OrderFilter, OrderRegistry};
pub use state_machine::{OrderEvent, OrderStateMachine};
pub use stats::{StatsAggregator, StatsSnapshot};
