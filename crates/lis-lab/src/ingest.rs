//! 结果录入
//!
//! 结果提交的完整流程: 校验医嘱与项目、服务端计算危急值、
//! 写入结果存储、危急时登记报警、并自动推进医嘱状态。
//! 完成检查在释放结果锁之后重新读取结果集，结果只增不删，
//! 因此检查结论单调成立。

use crate::catalog::{self, TestCatalog};
use crate::dispatch::AlertDispatcher;
use crate::registry::OrderRegistry;
use crate::state_machine::OrderEvent;
use chrono::Utc;
use lis_core::{LabResult, LisError, OrderStatus, Result, ResultValue};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct ResultStoreInner {
    // order_id -> test_code -> 结果，每个组合至多一条
    by_order: HashMap<Uuid, HashMap<String, LabResult>>,
    // result_id -> (order_id, test_code)
    index: HashMap<Uuid, (Uuid, String)>,
}

/// 检验结果存储
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: RwLock<ResultStoreInner>,
}

impl ResultStore {
    /// 创建空的结果存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入结果
    ///
    /// (order_id, test_code) 槽位已占用时视为更新: 保留原结果ID，
    /// 其余字段以新提交为准。
    pub async fn upsert(&self, candidate: LabResult) -> LabResult {
        let mut inner = self.inner.write().await;
        let slot = inner
            .by_order
            .entry(candidate.order_id)
            .or_default()
            .entry(candidate.test_code.clone());

        let stored = match slot {
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let existing_id = occupied.get().id;
                let updated = LabResult {
                    id: existing_id,
                    ..candidate
                };
                occupied.insert(updated.clone());
                updated
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(candidate.clone());
                candidate
            }
        };

        inner
            .index
            .insert(stored.id, (stored.order_id, stored.test_code.clone()));
        stored
    }

    /// 按结果ID获取
    pub async fn get(&self, result_id: Uuid) -> Option<LabResult> {
        let inner = self.inner.read().await;
        let (order_id, test_code) = inner.index.get(&result_id)?;
        inner
            .by_order
            .get(order_id)
            .and_then(|m| m.get(test_code))
            .cloned()
    }

    /// 获取医嘱的全部结果，按完成时间排序
    pub async fn results_for_order(&self, order_id: Uuid) -> Vec<LabResult> {
        let inner = self.inner.read().await;
        let mut results: Vec<LabResult> = inner
            .by_order
            .get(&order_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        results.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        results
    }

    /// 医嘱是否已有任何结果
    pub async fn has_any(&self, order_id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .by_order
            .get(&order_id)
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }

    /// 检查指定项目集合是否全部有结果
    pub async fn has_results_for_all(&self, order_id: Uuid, codes: &[String]) -> bool {
        let inner = self.inner.read().await;
        match inner.by_order.get(&order_id) {
            Some(results) => codes.iter().all(|code| results.contains_key(code)),
            None => codes.is_empty(),
        }
    }
}

/// 结果录入器
pub struct ResultIngestor {
    registry: Arc<OrderRegistry>,
    catalog: Arc<TestCatalog>,
    store: Arc<ResultStore>,
    dispatcher: Arc<AlertDispatcher>,
}

impl ResultIngestor {
    /// 创建结果录入器
    pub fn new(
        registry: Arc<OrderRegistry>,
        catalog: Arc<TestCatalog>,
        store: Arc<ResultStore>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            registry,
            catalog,
            store,
            dispatcher,
        }
    }

    /// 提交检验结果
    ///
    /// 危急值只在服务端根据目录参考范围计算；报警投递异步进行，
    /// 投递故障不影响提交结果。
    pub async fn submit(
        &self,
        order_id: Uuid,
        test_code: &str,
        value: ResultValue,
        unit: String,
        notes: Option<String>,
    ) -> Result<LabResult> {
        let order = self.registry.get(order_id).await?;

        match order.status {
            OrderStatus::Pending | OrderStatus::InProgress => {}
            closed => {
                return Err(LisError::Validation(format!(
                    "医嘱 {} 处于 {} 状态，不再接受结果",
                    order_id, closed
                )));
            }
        }

        if !order.ordered_tests.iter().any(|t| t == test_code) {
            return Err(LisError::Validation(format!(
                "项目 {} 不在医嘱 {} 的检验项目中",
                test_code, order_id
            )));
        }

        let entry = self.catalog.get(test_code).await.ok_or_else(|| {
            LisError::Validation(format!("项目 {} 不在检验目录中", test_code))
        })?;

        let is_critical = catalog::evaluate(&entry, &value)?;

        let candidate = LabResult {
            id: Uuid::new_v4(),
            order_id,
            test_code: test_code.to_string(),
            patient_id: order.patient_id.clone(),
            value,
            unit,
            is_critical,
            catalog_version: entry.version,
            completed_at: Utc::now(),
            notes,
        };
        let stored = self.store.upsert(candidate).await;

        info!(
            order_id = %order_id,
            test_code = %test_code,
            result_id = %stored.id,
            critical = stored.is_critical,
            "检验结果已记录"
        );

        if stored.is_critical {
            warn!(
                order_id = %order_id,
                test_code = %test_code,
                value = %stored.value,
                "检出危急值"
            );
            self.dispatcher.enqueue(&stored, &order.provider_id).await;
        }

        self.auto_advance(order_id, order.status).await?;
        Ok(stored)
    }

    /// 自动状态推进
    ///
    /// 首个结果将 pending 医嘱推进到 in_progress，状态走线
    /// 始终为 pending -> in_progress -> completed，不跳步。
    async fn auto_advance(&self, order_id: Uuid, observed_status: OrderStatus) -> Result<()> {
        if observed_status == OrderStatus::Pending {
            self.registry.advance_auto(order_id, OrderEvent::Start).await?;
        }

        let current = self.registry.get(order_id).await?;
        if current.status == OrderStatus::InProgress
            && self
                .store
                .has_results_for_all(order_id, &current.ordered_tests)
                .await
        {
            if let Some(completed) = self
                .registry
                .advance_auto(order_id, OrderEvent::Complete)
                .await?
            {
                info!(
                    order_id = %order_id,
                    version = completed.version,
                    "全部结果到齐，医嘱自动完成"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_entries;
    use crate::dispatch::{DispatchConfig, LogNotificationSender};
    use lis_core::OrderPriority;
    use std::time::Duration;

    struct Fixture {
        registry: Arc<OrderRegistry>,
        store: Arc<ResultStore>,
        dispatcher: Arc<AlertDispatcher>,
        ingestor: ResultIngestor,
    }

    async fn fixture() -> Fixture {
        let registry = Arc::new(OrderRegistry::new());
        let catalog = Arc::new(TestCatalog::new());
        catalog.seed(default_entries()).await.unwrap();
        let store = Arc::new(ResultStore::new());
        let dispatcher = Arc::new(AlertDispatcher::new(
            Arc::new(LogNotificationSender),
            DispatchConfig {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                attempt_timeout: Duration::from_millis(100),
            },
        ));
        let ingestor = ResultIngestor::new(
            registry.clone(),
            catalog,
            store.clone(),
            dispatcher.clone(),
        );
        Fixture {
            registry,
            store,
            dispatcher,
            ingestor,
        }
    }

    async fn order_with(f: &Fixture, tests: &[&str]) -> Uuid {
        f.registry
            .create_order(
                "patient-001".to_string(),
                "provider-007".to_string(),
                tests.iter().map(|s| s.to_string()).collect(),
                OrderPriority::Routine,
                None,
                vec![],
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_submit_advances_pending_to_in_progress() {
        let f = fixture().await;
        let order_id = order_with(&f, &["BMP-GLU", "BMP-K"]).await;

        let result = f
            .ingestor
            .submit(
                order_id,
                "BMP-GLU",
                ResultValue::Numeric(5.0),
                "mmol/L".to_string(),
                None,
            )
            .await
            .unwrap();

        assert!(!result.is_critical);
        assert_eq!(
            f.registry.get(order_id).await.unwrap().status,
            OrderStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_all_results_complete_order_without_external_call() {
        let f = fixture().await;
        let order_id = order_with(&f, &["BMP-GLU", "BMP-K"]).await;

        f.ingestor
            .submit(order_id, "BMP-GLU", ResultValue::Numeric(5.0), "mmol/L".into(), None)
            .await
            .unwrap();
        f.ingestor
            .submit(order_id, "BMP-K", ResultValue::Numeric(4.2), "mmol/L".into(), None)
            .await
            .unwrap();

        let order = f.registry.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        // pending -> in_progress -> completed，两次状态写入
        assert_eq!(order.version, 3);
    }

    #[tokio::test]
    async fn test_closed_order_rejects_results() {
        let f = fixture().await;
        let order_id = order_with(&f, &["BMP-GLU"]).await;

        f.ingestor
            .submit(order_id, "BMP-GLU", ResultValue::Numeric(5.0), "mmol/L".into(), None)
            .await
            .unwrap();
        assert_eq!(
            f.registry.get(order_id).await.unwrap().status,
            OrderStatus::Completed
        );

        let rejected = f
            .ingestor
            .submit(order_id, "BMP-GLU", ResultValue::Numeric(6.0), "mmol/L".into(), None)
            .await;
        assert!(matches!(rejected, Err(LisError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_order_and_test_code() {
        let f = fixture().await;

        let missing = f
            .ingestor
            .submit(Uuid::new_v4(), "BMP-GLU", ResultValue::Numeric(5.0), "mmol/L".into(), None)
            .await;
        assert!(matches!(missing, Err(LisError::NotFound(_))));

        let order_id = order_with(&f, &["BMP-GLU"]).await;
        let not_ordered = f
            .ingestor
            .submit(order_id, "BMP-K", ResultValue::Numeric(4.0), "mmol/L".into(), None)
            .await;
        assert!(matches!(not_ordered, Err(LisError::Validation(_))));
    }

    #[tokio::test]
    async fn test_critical_result_raises_alert() {
        let f = fixture().await;
        let order_id = order_with(&f, &["BMP-K"]).await;

        let result = f
            .ingestor
            .submit(order_id, "BMP-K", ResultValue::Numeric(7.2), "mmol/L".into(), None)
            .await
            .unwrap();

        assert!(result.is_critical);
        let alert = f.dispatcher.active_alert_for_result(result.id).await.unwrap();
        assert_eq!(alert.recipient_id, "provider-007");
        assert_eq!(alert.test_code, "BMP-K");
    }

    #[tokio::test]
    async fn test_resubmission_updates_in_place() {
        let f = fixture().await;
        let order_id = order_with(&f, &["BMP-GLU", "BMP-K"]).await;

        let first = f
            .ingestor
            .submit(order_id, "BMP-GLU", ResultValue::Numeric(1.8), "mmol/L".into(), None)
            .await
            .unwrap();
        assert!(first.is_critical);

        // 修正为正常值: 同一结果ID，危急标记重算，原报警保持不变
        let second = f
            .ingestor
            .submit(order_id, "BMP-GLU", ResultValue::Numeric(5.1), "mmol/L".into(), None)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert!(!second.is_critical);

        let results = f.store.results_for_order(order_id).await;
        assert_eq!(results.len(), 1);
        assert!(f.dispatcher.active_alert_for_result(first.id).await.is_some());
    }

    #[tokio::test]
    async fn test_still_critical_resubmission_keeps_single_active_alert() {
        let f = fixture().await;
        let order_id = order_with(&f, &["BMP-K", "BMP-GLU"]).await;

        let first = f
            .ingestor
            .submit(order_id, "BMP-K", ResultValue::Numeric(7.2), "mmol/L".into(), None)
            .await
            .unwrap();
        let second = f
            .ingestor
            .submit(order_id, "BMP-K", ResultValue::Numeric(8.0), "mmol/L".into(), None)
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        let alerts = f.dispatcher.alerts_for_order(order_id).await;
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_qualitative_result_flow() {
        let f = fixture().await;
        let order_id = order_with(&f, &["MICRO-BC"]).await;

        let result = f
            .ingestor
            .submit(
                order_id,
                "MICRO-BC",
                ResultValue::Qualitative("gram-negative rods".to_string()),
                "".to_string(),
                Some("双瓶报阳".to_string()),
            )
            .await
            .unwrap();

        assert!(result.is_critical);
        assert_eq!(
            f.registry.get(order_id).await.unwrap().status,
            OrderStatus::Completed
        );
    }
}
