//! 核心数据模型定义

use crate::error::LisError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 检验医嘱
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub accession_number: String, // 标本登记号
    pub patient_id: String,       // 外部患者档案ID
    pub provider_id: String,      // 开单医生ID
    pub ordered_tests: Vec<String>, // 检验项目代码，创建后不可变更
    pub priority: OrderPriority,
    pub clinical_info: Option<String>,
    pub diagnosis_codes: Vec<String>,
    pub status: OrderStatus,
    pub version: u64, // 乐观并发令牌，每次状态写入递增
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

/// 医嘱状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,    // 待处理
    InProgress, // 检验中
    Completed,  // 已完成
    Cancelled,  // 已取消
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::InProgress => write!(f, "in_progress"),
            OrderStatus::Completed => write!(f, "completed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = LisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "in_progress" => Ok(OrderStatus::InProgress),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(LisError::Validation(format!("unknown order status: {}", other))),
        }
    }
}

/// 医嘱优先级
///
/// 排序约定: stat > urgent > routine，队列展示按此降序排列。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderPriority {
    Routine, // 常规
    Urgent,  // 加急
    Stat,    // 危急，最高优先级
}

impl fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderPriority::Routine => write!(f, "routine"),
            OrderPriority::Urgent => write!(f, "urgent"),
            OrderPriority::Stat => write!(f, "stat"),
        }
    }
}

impl FromStr for OrderPriority {
    type Err = LisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "routine" => Ok(OrderPriority::Routine),
            "urgent" => Ok(OrderPriority::Urgent),
            "stat" => Ok(OrderPriority::Stat),
            other => Err(LisError::Validation(format!("unknown priority: {}", other))),
        }
    }
}

/// 检验项目目录条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String, // 唯一项目代码
    pub name: String,
    pub category: String,
    pub unit: String,
    pub reference_range: ReferenceRange,
    pub version: u32, // 修改时旧版本归档，版本号递增
}

/// 参考范围
///
/// 数值型给出 [low, high] 区间，定性型枚举全部非危急结果；
/// 区间/集合之外的结果按定义即为危急值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferenceRange {
    Numeric { low: f64, high: f64 },
    Qualitative { allowed: Vec<String> },
}

/// 检验结果值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResultValue {
    Numeric(f64),
    Qualitative(String),
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Numeric(v) => write!(f, "{}", v),
            ResultValue::Qualitative(s) => write!(f, "{}", s),
        }
    }
}

/// 检验结果
///
/// 每个 (order_id, test_code) 组合至多一条结果，重复提交视为更新。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResult {
    pub id: Uuid,
    pub order_id: Uuid,
    pub test_code: String,
    pub patient_id: String, // 冗余存储，便于按患者查询
    pub value: ResultValue,
    pub unit: String,
    pub is_critical: bool, // 仅由服务端根据目录参考范围计算
    pub catalog_version: u32, // 计算危急值时使用的目录版本
    pub completed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// 危急值报警
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub result_id: Uuid,
    pub order_id: Uuid,
    pub test_code: String,
    pub recipient_id: String, // 医嘱的开单医生
    pub state: AlertState,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

/// 报警状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    PendingDelivery, // 待发送
    Delivered,       // 已送达
    Acknowledged,    // 已确认
    DeliveryFailed,  // 发送失败，已升级
}

/// 升级记录
///
/// 报警重试耗尽后进入监督队列，绝不静默丢弃。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub result_id: Uuid,
    pub recipient_id: String,
    pub reason: String,
    pub escalated_at: DateTime<Utc>,
}
