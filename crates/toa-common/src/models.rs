//! 数据模型模块
//!
//! 该模块定义了 TOA Injector 中使用的核心数据模型，包括网络接口快照、
//! 挂载方向以及 qdisc 句柄。

pub mod interface;
pub mod hook;
