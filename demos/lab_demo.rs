//! 检验引擎演示程序
//!
//! 展示检验引擎的核心功能，包括医嘱创建、结果录入、危急值报警和统计快照

use lis_core::{LisConfig, OrderPriority, ResultValue};
use lis_lab::catalog::default_entries;
use lis_lab::{LabEngine, LogNotificationSender, OrderFilter};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    // 创建检验引擎
    let engine = Arc::new(LabEngine::new(
        &LisConfig::default(),
        Arc::new(LogNotificationSender),
    ));
    engine.start_workers();

    println!("🚀 LIS 检验引擎演示\n");

    // 1. 载入检验目录
    let count = engine.seed_catalog(default_entries()).await?;
    println!("✅ 载入了 {} 个检验项目", count);

    // 2. 创建不同优先级的示例医嘱
    let stat_order = engine
        .create_order(
            "patient-314".to_string(),
            "provider-007".to_string(),
            vec!["BMP-K".to_string(), "BMP-NA".to_string(), "BMP-GLU".to_string()],
            OrderPriority::Stat,
            Some("胸闷伴心律不齐".to_string()),
            vec!["I49.9".to_string()],
        )
        .await?;

    let urgent_order = engine
        .create_order(
            "patient-201".to_string(),
            "provider-012".to_string(),
            vec!["CBC-WBC".to_string(), "CBC-HGB".to_string()],
            OrderPriority::Urgent,
            Some("发热待查".to_string()),
            vec![],
        )
        .await?;

    let routine_order = engine
        .create_order(
            "patient-105".to_string(),
            "provider-007".to_string(),
            vec!["UA-NIT".to_string()],
            OrderPriority::Routine,
            None,
            vec![],
        )
        .await?;
    println!("✅ 创建了 3 个示例医嘱");

    // 3. 医嘱队列按优先级降序排列
    let worklist = engine.list_orders(&OrderFilter::default()).await;
    println!("\n📋 医嘱队列:");
    for order in &worklist {
        println!(
            "   - {} [{}] 患者 {} 项目 {}",
            order.accession_number,
            order.priority,
            order.patient_id,
            order.ordered_tests.join(", ")
        );
    }

    // 4. 录入结果，血钾危急触发报警
    println!("\n🔬 录入 stat 医嘱结果");
    let potassium = engine
        .submit_result(
            stat_order.id,
            "BMP-K",
            ResultValue::Numeric(7.2),
            "mmol/L".to_string(),
            Some("溶血已排除".to_string()),
        )
        .await?;
    println!(
        "   BMP-K = {} mmol/L (危急: {})",
        potassium.value, potassium.is_critical
    );

    engine
        .submit_result(
            stat_order.id,
            "BMP-NA",
            ResultValue::Numeric(140.0),
            "mmol/L".to_string(),
            None,
        )
        .await?;
    engine
        .submit_result(
            stat_order.id,
            "BMP-GLU",
            ResultValue::Numeric(5.5),
            "mmol/L".to_string(),
            None,
        )
        .await?;

    // 全部项目有结果后医嘱自动完成
    let completed = engine.get_order(stat_order.id).await?;
    println!("✅ stat 医嘱状态: {} (版本 {})", completed.status, completed.version);

    // 5. 等待后台派发器投递报警
    tokio::time::sleep(Duration::from_millis(300)).await;

    let unacknowledged = engine.unacknowledged_alerts().await;
    println!("\n🚨 未确认危急值报警:");
    for alert in &unacknowledged {
        println!(
            "   - 报警 {} 项目 {} 接收人 {} 状态 {:?}",
            alert.id, alert.test_code, alert.recipient_id, alert.state
        );
    }

    // 6. 开单医生确认危急值
    if let Some(alert) = unacknowledged.first() {
        let acked = engine.acknowledge_alert(alert.id, "provider-007").await?;
        println!("✅ 报警已由 {} 确认", acked.acknowledged_by.unwrap_or_default());
    }

    // 7. 定性结果走查
    engine
        .submit_result(
            routine_order.id,
            "UA-NIT",
            ResultValue::Qualitative("negative".to_string()),
            "".to_string(),
            None,
        )
        .await?;
    println!("✅ 常规尿检结果已录入并自动完成");

    // 8. 取消尚无结果的加急医嘱
    let cancelled = engine
        .transition_status(
            urgent_order.id,
            urgent_order.version,
            lis_core::OrderStatus::Cancelled,
        )
        .await?;
    println!("✅ 加急医嘱已取消 (版本 {})", cancelled.version);

    // 9. 显示统计快照
    let snapshot = engine.snapshot().await;
    println!("\n📊 运营统计:");
    println!("   医嘱总数: {}", snapshot.total);
    println!("   待处理: {}", snapshot.pending);
    println!("   检验中: {}", snapshot.in_progress);
    println!("   今日完成: {}", snapshot.completed_today);
    println!("   未确认危急值: {}", snapshot.outstanding_critical);

    // 10. 升级队列
    let escalations = engine.escalations().await;
    if escalations.is_empty() {
        println!("✅ 升级队列为空，所有报警均已妥善处理");
    } else {
        println!("⚠️  发现 {} 条升级记录", escalations.len());
    }

    println!("\n🎉 检验引擎演示完成!");
    Ok(())
}
