//! 运营统计
//!
//! 快照每次调用都从主存储全量重算，不维护增量计数器，
//! 保证与医嘱和报警状态严格一致。

use crate::dispatch::AlertDispatcher;
use crate::registry::OrderRegistry;
use chrono::{FixedOffset, Offset, Utc};
use lis_core::OrderStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 统计快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed_today: usize,
    pub outstanding_critical: usize,
}

/// 统计汇总器
pub struct StatsAggregator {
    registry: Arc<OrderRegistry>,
    dispatcher: Arc<AlertDispatcher>,
    // 部署时区，固定UTC偏移，决定"今日"边界
    offset: FixedOffset,
}

impl StatsAggregator {
    /// 创建统计汇总器
    pub fn new(
        registry: Arc<OrderRegistry>,
        dispatcher: Arc<AlertDispatcher>,
        utc_offset_minutes: i32,
    ) -> Self {
        let offset =
            FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Self {
            registry,
            dispatcher,
            offset,
        }
    }

    /// 生成统计快照
    ///
    /// completed_today 以完成转换发生时刻落在部署时区当日为准。
    pub async fn snapshot(&self) -> StatsSnapshot {
        let orders = self.registry.all_orders().await;
        let today = Utc::now().with_timezone(&self.offset).date_naive();

        let mut pending = 0;
        let mut in_progress = 0;
        let mut completed_today = 0;

        for order in &orders {
            match order.status {
                OrderStatus::Pending => pending += 1,
                OrderStatus::InProgress => in_progress += 1,
                OrderStatus::Completed => {
                    if order.status_changed_at.with_timezone(&self.offset).date_naive() == today {
                        completed_today += 1;
                    }
                }
                OrderStatus::Cancelled => {}
            }
        }

        let outstanding_critical = self.dispatcher.unacknowledged().await.len();

        StatsSnapshot {
            total: orders.len(),
            pending,
            in_progress,
            completed_today,
            outstanding_critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchConfig, LogNotificationSender};
    use crate::state_machine::OrderEvent;
    use lis_core::{LabResult, OrderPriority, ResultValue};
    use uuid::Uuid;

    fn dispatcher() -> Arc<AlertDispatcher> {
        Arc::new(AlertDispatcher::new(
            Arc::new(LogNotificationSender),
            DispatchConfig::default(),
        ))
    }

    async fn create(registry: &OrderRegistry) -> lis_core::Order {
        registry
            .create_order(
                "patient-001".to_string(),
                "provider-007".to_string(),
                vec!["BMP-GLU".to_string()],
                OrderPriority::Routine,
                None,
                vec![],
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_counts_by_status() {
        let registry = Arc::new(OrderRegistry::new());
        let dispatcher = dispatcher();
        let stats = StatsAggregator::new(registry.clone(), dispatcher.clone(), 0);

        let _pending = create(&registry).await;
        let started = create(&registry).await;
        registry
            .transition(started.id, 1, OrderEvent::Start)
            .await
            .unwrap();
        let done = create(&registry).await;
        registry.transition(done.id, 1, OrderEvent::Start).await.unwrap();
        registry
            .transition(done.id, 2, OrderEvent::Complete)
            .await
            .unwrap();
        let cancelled = create(&registry).await;
        registry
            .transition(cancelled.id, 1, OrderEvent::Cancel)
            .await
            .unwrap();

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.pending, 1);
        assert_eq!(snapshot.in_progress, 1);
        assert_eq!(snapshot.completed_today, 1);
        assert_eq!(snapshot.outstanding_critical, 0);
    }

    #[tokio::test]
    async fn test_outstanding_critical_tracks_acknowledgment() {
        let registry = Arc::new(OrderRegistry::new());
        let dispatcher = dispatcher();
        let stats = StatsAggregator::new(registry.clone(), dispatcher.clone(), 480);

        let result = LabResult {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            test_code: "BMP-K".to_string(),
            patient_id: "patient-001".to_string(),
            value: ResultValue::Numeric(7.0),
            unit: "mmol/L".to_string(),
            is_critical: true,
            catalog_version: 1,
            completed_at: Utc::now(),
            notes: None,
        };
        let alert = dispatcher.enqueue(&result, "provider-007").await;
        assert_eq!(stats.snapshot().await.outstanding_critical, 1);

        dispatcher.acknowledge(alert.id, "provider-007").await.unwrap();
        assert_eq!(stats.snapshot().await.outstanding_critical, 0);
    }

    #[test]
    fn test_invalid_offset_falls_back_to_utc() {
        // FixedOffset 允许的范围是 ±24 小时
        let offset = FixedOffset::east_opt(100_000 * 60);
        assert!(offset.is_none());
    }
}
