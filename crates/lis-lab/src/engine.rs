//! 检验引擎
//!
//! 协调项目目录、医嘱登记、结果录入、报警派发与统计的核心引擎，
//! 为 Web 层和演示程序提供统一接口。

use crate::catalog::TestCatalog;
use crate::dispatch::{AlertDispatcher, DispatchConfig, NotificationSender};
use crate::ingest::{ResultIngestor, ResultStore};
use crate::registry::{OrderFilter, OrderRegistry};
use crate::state_machine::OrderEvent;
use crate::stats::{StatsAggregator, StatsSnapshot};
use lis_core::{
    Alert, CatalogEntry, EscalationRecord, LabResult, LisConfig, LisError, Order, OrderPriority,
    OrderStatus, Result, ResultValue,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 检验引擎
pub struct LabEngine {
    catalog: Arc<TestCatalog>,
    registry: Arc<OrderRegistry>,
    results: Arc<ResultStore>,
    dispatcher: Arc<AlertDispatcher>,
    ingestor: ResultIngestor,
    stats: StatsAggregator,
}

impl LabEngine {
    /// 按配置创建检验引擎
    pub fn new(config: &LisConfig, sender: Arc<dyn NotificationSender>) -> Self {
        let catalog = Arc::new(TestCatalog::new());
        let registry = Arc::new(OrderRegistry::new());
        let results = Arc::new(ResultStore::new());
        let dispatcher = Arc::new(AlertDispatcher::new(
            sender,
            DispatchConfig::from(&config.dispatch),
        ));
        let ingestor = ResultIngestor::new(
            registry.clone(),
            catalog.clone(),
            results.clone(),
            dispatcher.clone(),
        );
        let stats = StatsAggregator::new(
            registry.clone(),
            dispatcher.clone(),
            config.stats.utc_offset_minutes,
        );

        Self {
            catalog,
            registry,
            results,
            dispatcher,
            ingestor,
            stats,
        }
    }

    /// 启动后台工作器
    pub fn start_workers(&self) -> tokio::task::JoinHandle<()> {
        self.dispatcher.start_worker()
    }

    // ---- 目录 ----

    /// 批量载入目录条目
    pub async fn seed_catalog(&self, entries: Vec<CatalogEntry>) -> Result<usize> {
        let count = self.catalog.seed(entries).await?;
        info!(count, "检验目录已载入");
        Ok(count)
    }

    /// 插入或更新目录条目
    pub async fn upsert_catalog_entry(&self, entry: CatalogEntry) -> Result<CatalogEntry> {
        self.catalog.upsert(entry).await
    }

    /// 列出目录条目
    pub async fn catalog_entries(&self) -> Vec<CatalogEntry> {
        self.catalog.list().await
    }

    /// 获取目录条目
    pub async fn catalog_entry(&self, code: &str) -> Option<CatalogEntry> {
        self.catalog.get(code).await
    }

    // ---- 医嘱 ----

    /// 创建医嘱
    ///
    /// 所有项目代码必须已在目录中登记。
    pub async fn create_order(
        &self,
        patient_id: String,
        provider_id: String,
        ordered_tests: Vec<String>,
        priority: OrderPriority,
        clinical_info: Option<String>,
        diagnosis_codes: Vec<String>,
    ) -> Result<Order> {
        for code in &ordered_tests {
            if !self.catalog.contains(code).await {
                return Err(LisError::Validation(format!(
                    "项目 {} 不在检验目录中",
                    code
                )));
            }
        }
        self.registry
            .create_order(
                patient_id,
                provider_id,
                ordered_tests,
                priority,
                clinical_info,
                diagnosis_codes,
            )
            .await
    }

    /// 获取医嘱
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.registry.get(order_id).await
    }

    /// 查询医嘱列表
    pub async fn list_orders(&self, filter: &OrderFilter) -> Vec<Order> {
        self.registry.list(filter).await
    }

    /// 患者的全部医嘱
    pub async fn orders_for_patient(&self, patient_id: &str) -> Vec<Order> {
        self.registry.orders_for_patient(patient_id).await
    }

    /// 医生开具的全部医嘱
    pub async fn orders_for_provider(&self, provider_id: &str) -> Vec<Order> {
        self.registry.orders_for_provider(provider_id).await
    }

    /// 外部请求的状态转换
    ///
    /// 目标状态映射到状态机事件后执行，并施加结果相关的守卫:
    /// 取消待处理医嘱要求尚无结果，完成要求全部项目有结果。
    /// 检查与写入之间的竞争由版本号兜底，失败方收到 Conflict。
    pub async fn transition_status(
        &self,
        order_id: Uuid,
        expected_version: u64,
        new_status: OrderStatus,
    ) -> Result<Order> {
        let order = self.registry.get(order_id).await?;
        let event = OrderEvent::for_target(new_status).ok_or_else(|| {
            // pending 不是任何事件的目标，等价于图中不存在的边
            LisError::InvalidStateTransition {
                from: order.status.to_string(),
                to: new_status.to_string(),
            }
        })?;
        match event {
            OrderEvent::Cancel => {
                if order.status == OrderStatus::Pending && self.results.has_any(order_id).await {
                    return Err(LisError::Validation(format!(
                        "医嘱 {} 已有结果，不能按待处理取消",
                        order_id
                    )));
                }
            }
            OrderEvent::Complete => {
                if !self
                    .results
                    .has_results_for_all(order_id, &order.ordered_tests)
                    .await
                {
                    return Err(LisError::Validation(format!(
                        "医嘱 {} 仍有项目缺少结果，不能完成",
                        order_id
                    )));
                }
            }
            OrderEvent::Start => {}
        }

        self.registry
            .transition(order_id, expected_version, event)
            .await
    }

    // ---- 结果 ----

    /// 提交检验结果
    pub async fn submit_result(
        &self,
        order_id: Uuid,
        test_code: &str,
        value: ResultValue,
        unit: String,
        notes: Option<String>,
    ) -> Result<LabResult> {
        self.ingestor
            .submit(order_id, test_code, value, unit, notes)
            .await
    }

    /// 医嘱的全部结果
    pub async fn results_for_order(&self, order_id: Uuid) -> Result<Vec<LabResult>> {
        self.registry.get(order_id).await?;
        Ok(self.results.results_for_order(order_id).await)
    }

    // ---- 报警 ----

    /// 确认报警
    pub async fn acknowledge_alert(&self, alert_id: Uuid, user_id: &str) -> Result<Alert> {
        self.dispatcher.acknowledge(alert_id, user_id).await
    }

    /// 获取报警
    pub async fn alert(&self, alert_id: Uuid) -> Option<Alert> {
        self.dispatcher.get(alert_id).await
    }

    /// 全部报警
    pub async fn alerts(&self) -> Vec<Alert> {
        self.dispatcher.all_alerts().await
    }

    /// 全部未确认报警
    pub async fn unacknowledged_alerts(&self) -> Vec<Alert> {
        self.dispatcher.unacknowledged().await
    }

    /// 医嘱关联的报警
    pub async fn alerts_for_order(&self, order_id: Uuid) -> Vec<Alert> {
        self.dispatcher.alerts_for_order(order_id).await
    }

    /// 升级队列
    pub async fn escalations(&self) -> Vec<EscalationRecord> {
        self.dispatcher.escalations().await
    }

    // ---- 统计 ----

    /// 统计快照
    pub async fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot().await
    }
}
