//! 内核挂载能力抽象
//!
//! 挂载驱动只通过 `TcBackend` 操作内核，具体实现在启动时选定一次：
//! 基于 aya 的 `HookManager`，或直接调用 `tc` 命令的 `TcFilterBackend`。

use toa_common::{AttachError, HookDirection, InterfaceDescriptor, QdiscHandle};

/// TC 挂载/卸载能力
pub trait TcBackend {
    /// 单个方向挂载成功后返回的链接句柄，卸载时被消耗
    type Link;

    /// 删除上次异常退出残留的 clsact qdisc
    fn remove_stale_qdisc(&mut self, iface: &InterfaceDescriptor) -> Result<(), AttachError>;

    /// 删除上次运行留在指定方向上的本程序挂载，qdisc 保持不变
    fn remove_stale_hook(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
    ) -> Result<(), AttachError>;

    /// 创建 clsact qdisc
    fn create_qdisc(&mut self, iface: &InterfaceDescriptor) -> Result<QdiscHandle, AttachError>;

    /// 将程序挂载到指定方向
    fn attach(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
    ) -> Result<Self::Link, AttachError>;

    /// 卸载指定方向的程序
    fn detach(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
        link: Self::Link,
    ) -> Result<(), AttachError>;

    /// 删除 clsact qdisc
    fn remove_qdisc(&mut self, qdisc: QdiscHandle) -> Result<(), AttachError>;
}
