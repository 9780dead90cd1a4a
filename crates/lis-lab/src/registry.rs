//! 医嘱登记管理
//!
//! 维护医嘱主表与患者/医生索引，状态写入使用乐观并发控制：
//! 调用方携带期望版本号，版本不符即拒绝，由调用方重读后重试。

use crate::state_machine::{OrderEvent, OrderStateMachine};
use chrono::Utc;
use lis_core::utils::{dedup_test_codes, generate_accession_number};
use lis_core::{LisError, Order, OrderPriority, OrderStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// 医嘱查询过滤器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub patient_id: Option<String>,
    pub provider_id: Option<String>,
    pub priority: Option<OrderPriority>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            status: None,
            patient_id: None,
            provider_id: None,
            priority: None,
            limit: Some(50),
            offset: Some(0),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    orders: HashMap<Uuid, Order>,
    patient_orders: HashMap<String, Vec<Uuid>>,  // patient_id -> order_ids
    provider_orders: HashMap<String, Vec<Uuid>>, // provider_id -> order_ids
}

/// 医嘱登记表
#[derive(Debug, Default)]
pub struct OrderRegistry {
    inner: RwLock<RegistryInner>,
    state_machine: OrderStateMachine,
}

impl OrderRegistry {
    /// 创建新的医嘱登记表
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            state_machine: OrderStateMachine::new(),
        }
    }

    /// 创建医嘱
    ///
    /// 项目代码去重后不可为空；检验项目集合创建后不可变更。
    pub async fn create_order(
        &self,
        patient_id: String,
        provider_id: String,
        ordered_tests: Vec<String>,
        priority: OrderPriority,
        clinical_info: Option<String>,
        diagnosis_codes: Vec<String>,
    ) -> Result<Order> {
        if patient_id.is_empty() {
            return Err(LisError::Validation("患者ID不能为空".to_string()));
        }
        if provider_id.is_empty() {
            return Err(LisError::Validation("开单医生ID不能为空".to_string()));
        }

        let tests = dedup_test_codes(&ordered_tests);
        if tests.is_empty() {
            return Err(LisError::Validation(
                "医嘱必须包含至少一个检验项目".to_string(),
            ));
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            accession_number: generate_accession_number(),
            patient_id: patient_id.clone(),
            provider_id: provider_id.clone(),
            ordered_tests: tests,
            priority,
            clinical_info,
            diagnosis_codes,
            status: OrderStatus::Pending,
            version: 1,
            created_at: now,
            status_changed_at: now,
        };

        let mut inner = self.inner.write().await;
        inner.orders.insert(order.id, order.clone());
        inner
            .patient_orders
            .entry(patient_id)
            .or_default()
            .push(order.id);
        inner
            .provider_orders
            .entry(provider_id)
            .or_default()
            .push(order.id);

        info!(
            order_id = %order.id,
            accession = %order.accession_number,
            priority = %order.priority,
            "医嘱已创建"
        );
        Ok(order)
    }

    /// 获取医嘱
    pub async fn get(&self, order_id: Uuid) -> Result<Order> {
        self.inner
            .read()
            .await
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| LisError::NotFound(format!("医嘱 {} 不存在", order_id)))
    }

    /// 查询医嘱列表
    ///
    /// 排序契约: 优先级降序 (stat > urgent > routine)，同优先级按创建时间升序。
    pub async fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let inner = self.inner.read().await;
        let mut orders: Vec<&Order> = inner.orders.values().collect();

        if let Some(status) = filter.status {
            orders.retain(|o| o.status == status);
        }
        if let Some(patient_id) = &filter.patient_id {
            orders.retain(|o| &o.patient_id == patient_id);
        }
        if let Some(provider_id) = &filter.provider_id {
            orders.retain(|o| &o.provider_id == provider_id);
        }
        if let Some(priority) = filter.priority {
            orders.retain(|o| o.priority == priority);
        }

        orders.sort_by(|a, b| match b.priority.cmp(&a.priority) {
            std::cmp::Ordering::Equal => a.created_at.cmp(&b.created_at),
            other => other,
        });

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50);
        let total = orders.len();
        let start = offset.min(total);
        let end = (start + limit).min(total);

        orders[start..end].iter().map(|o| (*o).clone()).collect()
    }

    /// 获取患者的全部医嘱
    pub async fn orders_for_patient(&self, patient_id: &str) -> Vec<Order> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .patient_orders
            .get(patient_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.orders.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        orders.sort_by(|a, b| match b.priority.cmp(&a.priority) {
            std::cmp::Ordering::Equal => a.created_at.cmp(&b.created_at),
            other => other,
        });
        orders
    }

    /// 获取医生开具的全部医嘱
    pub async fn orders_for_provider(&self, provider_id: &str) -> Vec<Order> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .provider_orders
            .get(provider_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.orders.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        orders.sort_by(|a, b| match b.priority.cmp(&a.priority) {
            std::cmp::Ordering::Equal => a.created_at.cmp(&b.created_at),
            other => other,
        });
        orders
    }

    /// 执行状态转换
    ///
    /// 版本不符返回 Conflict，非法转换返回 InvalidStateTransition；
    /// 成功时版本号加一并刷新状态变更时间。
    pub async fn transition(
        &self,
        order_id: Uuid,
        expected_version: u64,
        event: OrderEvent,
    ) -> Result<Order> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| LisError::NotFound(format!("医嘱 {} 不存在", order_id)))?;

        if order.version != expected_version {
            warn!(
                order_id = %order_id,
                expected = expected_version,
                actual = order.version,
                "医嘱版本冲突"
            );
            return Err(LisError::Conflict {
                expected: expected_version,
                actual: order.version,
            });
        }

        let new_status = self.state_machine.transition(order.status, event)?;
        let old_status = order.status;
        order.status = new_status;
        order.version += 1;
        order.status_changed_at = Utc::now();

        info!(
            order_id = %order_id,
            from = %old_status,
            to = %new_status,
            version = order.version,
            "医嘱状态已转换"
        );
        Ok(order.clone())
    }

    /// 自动状态推进
    ///
    /// 结果录入等内部流程使用的 CAS 重试循环；
    /// 当前状态不再允许该事件时返回 None，表示已被并发方推进。
    pub async fn advance_auto(&self, order_id: Uuid, event: OrderEvent) -> Result<Option<Order>> {
        loop {
            let order = self.get(order_id).await?;
            if !self.state_machine.can_transition(order.status, event) {
                return Ok(None);
            }
            match self.transition(order_id, order.version, event).await {
                Ok(updated) => return Ok(Some(updated)),
                Err(LisError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// 全量医嘱快照，统计用
    pub async fn all_orders(&self) -> Vec<Order> {
        self.inner.read().await.orders.values().cloned().collect()
    }
}
