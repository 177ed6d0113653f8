//! TOA Injector eBPF 模块
//!
//! 该模块是用户态与内核之间的边界：加载预编译的 TC 程序，
//! 并提供按接口挂载/卸载的能力。使用 Aya 框架与 `tc` 命令实现。

mod backend;
mod filter;
mod hooks;
mod loader;
mod sockops;
pub mod tc_cli;

pub use backend::*;
pub use filter::*;
pub use hooks::*;
pub use loader::*;
pub use sockops::*;
