//! HTTP处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use lis_core::{
    CatalogEntry, LisError, OrderPriority, OrderStatus, ReferenceRange, ResultValue,
};
use lis_lab::{LabEngine, OrderFilter};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "LIS Lab API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api/v1"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

/// 创建医嘱请求
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub patient_id: String,
    pub provider_id: String,
    pub ordered_tests: Vec<String>,
    pub priority: Option<String>,
    pub clinical_info: Option<String>,
    #[serde(default)]
    pub diagnosis_codes: Vec<String>,
}

/// 状态转换请求
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub expected_version: u64,
    pub new_status: String,
}

/// 结果提交请求
#[derive(Debug, Deserialize)]
pub struct SubmitResultRequest {
    pub test_code: String,
    pub value: ResultValue,
    pub unit: String,
    pub notes: Option<String>,
}

/// 报警确认请求
#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub user_id: String,
}

/// 目录条目写入请求，代码取自路径
#[derive(Debug, Deserialize)]
pub struct CatalogUpsertRequest {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub reference_range: ReferenceRange,
}

/// 医嘱查询参数
///
/// 枚举字段以字符串接收再解析，非法取值报 Validation 而非反序列化失败。
#[derive(Debug, Deserialize)]
pub struct OrderQueryParams {
    pub status: Option<String>,
    pub patient_id: Option<String>,
    pub provider_id: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AlertQueryParams {
    pub unacknowledged: Option<bool>,
}

/// 创建医嘱处理器
pub async fn create_order(
    State(engine): State<Arc<LabEngine>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let priority = match req.priority.as_deref() {
        Some(raw) => raw.parse::<OrderPriority>()?,
        None => OrderPriority::Routine,
    };

    let order = engine
        .create_order(
            req.patient_id,
            req.provider_id,
            req.ordered_tests,
            priority,
            req.clinical_info,
            req.diagnosis_codes,
        )
        .await?;

    info!(order_id = %order.id, accession = %order.accession_number, "医嘱已创建");
    Ok((StatusCode::CREATED, Json(order)))
}

/// 医嘱列表查询处理器
pub async fn list_orders(
    State(engine): State<Arc<LabEngine>>,
    Query(params): Query<OrderQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let defaults = OrderFilter::default();
    let filter = OrderFilter {
        status: parse_opt::<OrderStatus>(params.status.as_deref())?,
        patient_id: params.patient_id,
        provider_id: params.provider_id,
        priority: parse_opt::<OrderPriority>(params.priority.as_deref())?,
        limit: params.limit.or(defaults.limit),
        offset: params.offset.or(defaults.offset),
    };

    let orders = engine.list_orders(&filter).await;
    Ok(Json(json!({
        "orders": orders,
        "total": orders.len(),
        "offset": filter.offset,
        "limit": filter.limit
    })))
}

/// 单个医嘱查询处理器
pub async fn get_order(
    State(engine): State<Arc<LabEngine>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = engine.get_order(id).await?;
    Ok(Json(order))
}

/// 状态转换处理器
pub async fn transition_order(
    State(engine): State<Arc<LabEngine>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_status = req.new_status.parse::<OrderStatus>()?;
    let order = engine
        .transition_status(id, req.expected_version, new_status)
        .await?;
    info!(order_id = %id, status = %order.status, version = order.version, "医嘱状态已转换");
    Ok(Json(order))
}

/// 结果提交处理器
pub async fn submit_result(
    State(engine): State<Arc<LabEngine>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitResultRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = engine
        .submit_result(id, &req.test_code, req.value, req.unit, req.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// 医嘱结果查询处理器
pub async fn get_results(
    State(engine): State<Arc<LabEngine>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let results = engine.results_for_order(id).await?;
    Ok(Json(json!({
        "order_id": id,
        "results": results,
        "total": results.len()
    })))
}

/// 患者医嘱查询处理器
pub async fn patient_orders(
    State(engine): State<Arc<LabEngine>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = engine.orders_for_patient(&id).await;
    Ok(Json(json!({
        "patient_id": id,
        "orders": orders,
        "total": orders.len()
    })))
}

/// 医生医嘱查询处理器
pub async fn provider_orders(
    State(engine): State<Arc<LabEngine>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = engine.orders_for_provider(&id).await;
    Ok(Json(json!({
        "provider_id": id,
        "orders": orders,
        "total": orders.len()
    })))
}

/// 报警列表查询处理器
pub async fn list_alerts(
    State(engine): State<Arc<LabEngine>>,
    Query(params): Query<AlertQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let alerts = if params.unacknowledged.unwrap_or(false) {
        engine.unacknowledged_alerts().await
    } else {
        engine.alerts().await
    };
    Ok(Json(json!({
        "alerts": alerts,
        "total": alerts.len()
    })))
}

/// 报警确认处理器
pub async fn acknowledge_alert(
    State(engine): State<Arc<LabEngine>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AcknowledgeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let alert = engine.acknowledge_alert(id, &req.user_id).await?;
    info!(alert_id = %id, user_id = %req.user_id, "报警已确认");
    Ok(Json(alert))
}

/// 升级队列查询处理器
pub async fn list_escalations(
    State(engine): State<Arc<LabEngine>>,
) -> Result<impl IntoResponse, ApiError> {
    let escalations = engine.escalations().await;
    Ok(Json(json!({
        "escalations": escalations,
        "total": escalations.len()
    })))
}

/// 统计快照处理器
pub async fn get_stats(State(engine): State<Arc<LabEngine>>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = engine.snapshot().await;
    Ok(Json(snapshot))
}

/// 目录列表查询处理器
pub async fn list_catalog(
    State(engine): State<Arc<LabEngine>>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = engine.catalog_entries().await;
    Ok(Json(json!({
        "entries": entries,
        "total": entries.len()
    })))
}

/// 目录条目写入处理器
///
/// 已存在的代码归档旧版本并递增版本号。
pub async fn upsert_catalog(
    State(engine): State<Arc<LabEngine>>,
    Path(code): Path<String>,
    Json(req): Json<CatalogUpsertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = engine
        .upsert_catalog_entry(CatalogEntry {
            code,
            name: req.name,
            category: req.category,
            unit: req.unit,
            reference_range: req.reference_range,
            version: 0,
        })
        .await?;
    info!(code = %entry.code, version = entry.version, "目录条目已写入");
    Ok(Json(entry))
}

fn parse_opt<T: std::str::FromStr<Err = LisError>>(raw: Option<&str>) -> Result<Option<T>, ApiError> {
    match raw {
        Some(s) => Ok(Some(s.parse::<T>()?)),
        None => Ok(None),
    }
}

/// 错误响应包装
///
/// LisError 定义在 lis-core，无法直接为它实现 IntoResponse，
/// 用新类型承接并映射到HTTP状态码。
#[derive(Debug)]
pub struct ApiError(pub LisError);

impl From<LisError> for ApiError {
    fn from(err: LisError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            LisError::Validation(_) => StatusCode::BAD_REQUEST,
            LisError::NotFound(_) => StatusCode::NOT_FOUND,
            LisError::Conflict { .. } => StatusCode::CONFLICT,
            LisError::InvalidStateTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LisError::AlreadyAcknowledged(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": true,
            "message": self.0.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
