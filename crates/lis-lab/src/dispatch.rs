//! 危急值报警派发
//!
//! 危急结果产生报警后由后台工作器异步投递，带超时与指数退避重试；
//! 重试耗尽的报警转入升级队列并通过备用渠道通知，绝不静默丢弃。

use chrono::Utc;
use lis_core::config::DispatchSettings;
use lis_core::{Alert, AlertState, EscalationRecord, LabResult, LisError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// 通知发送器特征
///
/// 投递渠道的抽象接口，生产环境接短信/寻呼等通道，测试用桩实现。
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    /// 向接收者投递报警通知
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()>;

    /// 通过备用渠道上报升级记录
    async fn escalate(&self, record: &EscalationRecord) -> anyhow::Result<()>;
}

/// 默认通知发送器实现，仅记录日志
pub struct LogNotificationSender;

#[async_trait::async_trait]
impl NotificationSender for LogNotificationSender {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(
            alert_id = %alert.id,
            recipient = %alert.recipient_id,
            test_code = %alert.test_code,
            "投递危急值通知"
        );
        Ok(())
    }

    async fn escalate(&self, record: &EscalationRecord) -> anyhow::Result<()> {
        warn!(
            alert_id = %record.alert_id,
            recipient = %record.recipient_id,
            reason = %record.reason,
            "危急值报警升级"
        );
        Ok(())
    }
}

/// 派发重试配置
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// 最大投递尝试次数
    pub max_attempts: u32,
    /// 首次重试退避，之后按指数增长
    pub initial_backoff: Duration,
    /// 单次投递尝试超时，超时按失败计
    pub attempt_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            attempt_timeout: Duration::from_millis(2000),
        }
    }
}

impl From<&DispatchSettings> for DispatchConfig {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
        }
    }
}

#[derive(Debug, Default)]
struct DispatcherInner {
    alerts: HashMap<Uuid, Alert>,
    // result_id -> 未确认报警，每个结果至多一条
    active_by_result: HashMap<Uuid, Uuid>,
    escalations: Vec<EscalationRecord>,
}

/// 报警派发器
pub struct AlertDispatcher {
    inner: RwLock<DispatcherInner>,
    sender: Arc<dyn NotificationSender>,
    config: DispatchConfig,
    queue_tx: mpsc::UnboundedSender<Uuid>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Uuid>>>,
}

impl AlertDispatcher {
    /// 创建新的报警派发器
    pub fn new(sender: Arc<dyn NotificationSender>, config: DispatchConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            inner: RwLock::new(DispatcherInner::default()),
            sender,
            config,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
        }
    }

    /// 为危急结果登记报警并排队投递
    ///
    /// 同一结果已有未确认报警时复用并重置，否则新建；
    /// 入队不阻塞调用方，投递失败不会回传给结果提交流程。
    pub async fn enqueue(&self, result: &LabResult, recipient_id: &str) -> Alert {
        let alert = {
            let mut inner = self.inner.write().await;
            match inner.active_by_result.get(&result.id).copied() {
                Some(alert_id) => {
                    // 重复危急提交: 重置现有报警重新投递
                    let alert = inner
                        .alerts
                        .get_mut(&alert_id)
                        .map(|a| {
                            a.state = AlertState::PendingDelivery;
                            a.attempts = 0;
                            a.created_at = Utc::now();
                            a.clone()
                        });
                    match alert {
                        Some(a) => a,
                        None => {
                            // 索引指向的报警丢失视为无活跃报警
                            let fresh = Self::new_alert(result, recipient_id);
                            inner.alerts.insert(fresh.id, fresh.clone());
                            inner.active_by_result.insert(result.id, fresh.id);
                            fresh
                        }
                    }
                }
                None => {
                    let fresh = Self::new_alert(result, recipient_id);
                    inner.alerts.insert(fresh.id, fresh.clone());
                    inner.active_by_result.insert(result.id, fresh.id);
                    fresh
                }
            }
        };

        info!(
            alert_id = %alert.id,
            result_id = %alert.result_id,
            recipient = %alert.recipient_id,
            "危急值报警已入队"
        );
        if self.queue_tx.send(alert.id).is_err() {
            error!(alert_id = %alert.id, "投递队列已关闭，报警等待手动处理");
        }
        alert
    }

    fn new_alert(result: &LabResult, recipient_id: &str) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            result_id: result.id,
            order_id: result.order_id,
            test_code: result.test_code.clone(),
            recipient_id: recipient_id.to_string(),
            state: AlertState::PendingDelivery,
            attempts: 0,
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
        }
    }

    /// 执行单条报警的投递流程
    ///
    /// 最多尝试 max_attempts 次，每次受 attempt_timeout 约束，
    /// 失败后按 initial_backoff * 2^(n-1) 退避。
    pub async fn process(&self, alert_id: Uuid) -> Result<()> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let snapshot = {
                let inner = self.inner.read().await;
                inner.alerts.get(&alert_id).cloned()
            }
            .ok_or_else(|| LisError::NotFound(format!("报警 {} 不存在", alert_id)))?;

            // 投递期间被确认的报警不再投递
            if snapshot.state == AlertState::Acknowledged {
                return Ok(());
            }

            let outcome = tokio::time::timeout(
                self.config.attempt_timeout,
                self.sender.deliver(&snapshot),
            )
            .await;
            let delivered = matches!(outcome, Ok(Ok(())));

            {
                let mut inner = self.inner.write().await;
                if let Some(alert) = inner.alerts.get_mut(&alert_id) {
                    alert.attempts = attempt;
                    // 已确认状态不回退
                    if delivered && alert.state != AlertState::Acknowledged {
                        alert.state = AlertState::Delivered;
                    }
                }
            }

            if delivered {
                info!(alert_id = %alert_id, attempt, "报警投递成功");
                return Ok(());
            }

            match outcome {
                Ok(Err(e)) => {
                    warn!(alert_id = %alert_id, attempt, error = %e, "报警投递失败")
                }
                _ => warn!(alert_id = %alert_id, attempt, "报警投递超时"),
            }

            if attempt < max_attempts {
                let backoff = self.config.initial_backoff * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
        }

        self.escalate_exhausted(alert_id, max_attempts).await
    }

    async fn escalate_exhausted(&self, alert_id: Uuid, attempts: u32) -> Result<()> {
        let record = {
            let mut inner = self.inner.write().await;
            let alert = inner
                .alerts
                .get_mut(&alert_id)
                .ok_or_else(|| LisError::NotFound(format!("报警 {} 不存在", alert_id)))?;

            if alert.state == AlertState::Acknowledged {
                return Ok(());
            }
            alert.state = AlertState::DeliveryFailed;

            let record = EscalationRecord {
                id: Uuid::new_v4(),
                alert_id: alert.id,
                result_id: alert.result_id,
                recipient_id: alert.recipient_id.clone(),
                reason: format!("投递 {} 次均失败", attempts),
                escalated_at: Utc::now(),
            };
            inner.escalations.push(record.clone());
            record
        };

        error!(
            alert_id = %alert_id,
            recipient = %record.recipient_id,
            "报警重试耗尽，转入升级队列"
        );
        if let Err(e) = self.sender.escalate(&record).await {
            error!(alert_id = %alert_id, error = %e, "升级通道通知失败");
        }

        Err(LisError::Delivery(format!(
            "报警 {} 投递 {} 次均失败，已升级",
            alert_id, attempts
        )))
    }

    /// 确认报警
    ///
    /// 同一用户重复确认幂等返回，不同用户确认已确认的报警被拒绝。
    pub async fn acknowledge(&self, alert_id: Uuid, user_id: &str) -> Result<Alert> {
        let mut inner = self.inner.write().await;
        let alert = inner
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| LisError::NotFound(format!("报警 {} 不存在", alert_id)))?;

        if alert.state == AlertState::Acknowledged {
            return if alert.acknowledged_by.as_deref() == Some(user_id) {
                Ok(alert.clone())
            } else {
                Err(LisError::AlreadyAcknowledged(format!(
                    "报警 {} 已由 {} 确认",
                    alert_id,
                    alert.acknowledged_by.as_deref().unwrap_or("unknown")
                )))
            };
        }

        alert.state = AlertState::Acknowledged;
        alert.acknowledged_at = Some(Utc::now());
        alert.acknowledged_by = Some(user_id.to_string());
        let acknowledged = alert.clone();
        inner.active_by_result.remove(&acknowledged.result_id);

        info!(alert_id = %alert_id, user = %user_id, "报警已确认");
        Ok(acknowledged)
    }

    /// 获取报警
    pub async fn get(&self, alert_id: Uuid) -> Option<Alert> {
        self.inner.read().await.alerts.get(&alert_id).cloned()
    }

    /// 获取结果当前的未确认报警
    pub async fn active_alert_for_result(&self, result_id: Uuid) -> Option<Alert> {
        let inner = self.inner.read().await;
        inner
            .active_by_result
            .get(&result_id)
            .and_then(|id| inner.alerts.get(id))
            .cloned()
    }

    /// 列出全部报警，按创建时间排序
    pub async fn all_alerts(&self) -> Vec<Alert> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner.alerts.values().cloned().collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        alerts
    }

    /// 列出全部未确认报警，按创建时间排序
    pub async fn unacknowledged(&self) -> Vec<Alert> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| a.state != AlertState::Acknowledged)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        alerts
    }

    /// 列出医嘱关联的全部报警
    pub async fn alerts_for_order(&self, order_id: Uuid) -> Vec<Alert> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        alerts
    }

    /// 列出升级记录
    pub async fn escalations(&self) -> Vec<EscalationRecord> {
        self.inner.read().await.escalations.clone()
    }

    /// 启动后台投递工作器
    pub fn start_worker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut rx = match dispatcher.queue_rx.lock().await.take() {
                Some(rx) => rx,
                None => {
                    warn!("投递工作器已在运行，忽略重复启动");
                    return;
                }
            };
            info!("报警投递工作器已启动");
            while let Some(alert_id) = rx.recv().await {
                if let Err(e) = dispatcher.process(alert_id).await {
                    error!(alert_id = %alert_id, error = %e, "报警处理失败");
                }
            }
        })
    }
}
