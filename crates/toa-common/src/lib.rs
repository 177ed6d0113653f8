//! TOA Injector Common - 跨模块共享工具与数据结构
//!
//! 该模块提供所有组件共享的数据模型和统一的错误处理机制：
//! 网络接口快照、挂载方向、qdisc 句柄以及错误类型。

pub mod models;
pub mod error;

/// 重新导出常用类型，方便使用
pub use error::{AttachError, Error, Result};
pub use models::hook::*;
pub use models::interface::*;
