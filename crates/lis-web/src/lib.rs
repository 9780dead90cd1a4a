//! LIS Web API
//!
//! 基于axum的REST服务层，把医嘱、结果、报警和统计
//! 暴露为 /api/v1 下的JSON接口。

pub mod handlers;
pub mod server;

pub use server::WebServer;
