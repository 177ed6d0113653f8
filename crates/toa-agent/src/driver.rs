//! 挂载驱动
//!
//! 对单个接口执行有序的内核操作：清理残留 qdisc、创建 clsact qdisc、
//! 按入向先于出向的顺序挂载程序。任何一步失败都会回滚已完成的步骤，
//! 接口要么完整挂载，要么不留下任何资源。

use chrono::Utc;
use std::fmt;
use thiserror::Error;
use toa_common::{AttachError, HookDirection, HookTarget, InterfaceDescriptor, QdiscPolicy};
use toa_ebpf::TcBackend;
use tracing::{debug, info, warn};

use crate::registry::{AttachedHook, RegistryEntry};

/// 挂载流程中的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStep {
    /// 创建 clsact qdisc
    CreateQdisc,
    /// 挂载某个方向
    Attach(HookDirection),
}

impl fmt::Display for AttachStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachStep::CreateQdisc => write!(f, "创建 qdisc"),
            AttachStep::Attach(direction) => write!(f, "挂载 {}", direction),
        }
    }
}

/// 单个接口挂载失败，失败时不持有任何资源
#[derive(Error, Debug)]
#[error("接口 {interface} {step}失败: {source}")]
pub struct DriverError {
    pub interface: String,
    pub step: AttachStep,
    #[source]
    pub source: AttachError,
}

/// 卸载中的一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachStep {
    /// 卸载某个方向
    Detach(HookDirection),
    /// 删除 qdisc
    RemoveQdisc,
}

impl fmt::Display for DetachStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetachStep::Detach(direction) => write!(f, "卸载 {}", direction),
            DetachStep::RemoveQdisc => write!(f, "删除 qdisc"),
        }
    }
}

/// 卸载过程中出现的失败，所有步骤都已尝试过
#[derive(Error, Debug)]
#[error("接口 {interface} 卸载不完整: {}", describe_failures(.failures))]
pub struct DetachError {
    pub interface: String,
    pub failures: Vec<(DetachStep, AttachError)>,
}

fn describe_failures(failures: &[(DetachStep, AttachError)]) -> String {
    failures
        .iter()
        .map(|(step, err)| format!("{}: {}", step, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// 挂载驱动
pub struct HookDriver<B: TcBackend> {
    backend: B,
    target: HookTarget,
    qdisc_policy: QdiscPolicy,
}

impl<B: TcBackend> HookDriver<B> {
    pub fn new(backend: B, target: HookTarget, qdisc_policy: QdiscPolicy) -> Self {
        Self {
            backend,
            target,
            qdisc_policy,
        }
    }

    pub fn target(&self) -> HookTarget {
        self.target
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 将程序挂载到接口的全部目标方向
    pub fn attach(
        &mut self,
        iface: &InterfaceDescriptor,
    ) -> Result<RegistryEntry<B::Link>, DriverError> {
        // 1. 清理上次异常退出留下的状态，失败是正常的（多数情况下本来就不存在）
        match self.qdisc_policy {
            QdiscPolicy::Reset => {
                if let Err(e) = self.backend.remove_stale_qdisc(iface) {
                    debug!("清理接口 {} 的残留 qdisc 未执行: {}", iface.name, e);
                }
            }
            // 共享的 qdisc 保留，只删除本程序残留的挂载
            QdiscPolicy::Reuse => {
                for &direction in self.target.directions() {
                    if let Err(e) = self.backend.remove_stale_hook(iface, direction) {
                        debug!("清理接口 {} {} 的残留挂载未执行: {}", iface.name, direction, e);
                    }
                }
            }
        }

        // 2. 创建 clsact qdisc
        let qdisc = match self.backend.create_qdisc(iface) {
            Ok(handle) => Some(handle),
            Err(e) if e.is_already_attached() && self.qdisc_policy == QdiscPolicy::Reuse => {
                debug!("接口 {} 已有 clsact qdisc，直接复用", iface.name);
                None
            }
            Err(source) => {
                return Err(DriverError {
                    interface: iface.name.clone(),
                    step: AttachStep::CreateQdisc,
                    source,
                })
            }
        };

        // 3. 按固定顺序挂载各方向
        let mut hooks: Vec<AttachedHook<B::Link>> = Vec::with_capacity(2);
        for &direction in self.target.directions() {
            match self.backend.attach(iface, direction) {
                Ok(link) => hooks.push(AttachedHook { direction, link }),
                Err(source) => {
                    warn!(
                        "接口 {} 挂载 {} 失败，回滚已完成的步骤: {}",
                        iface.name, direction, source
                    );
                    // 4. 回滚：先卸载已挂载的方向，再删除本次创建的 qdisc
                    let entry = RegistryEntry {
                        interface: iface.clone(),
                        qdisc,
                        hooks,
                        attached_at: Utc::now(),
                    };
                    if let Err(e) = self.detach(entry) {
                        warn!("回滚不完整: {}", e);
                    }
                    return Err(DriverError {
                        interface: iface.name.clone(),
                        step: AttachStep::Attach(direction),
                        source,
                    });
                }
            }
        }

        info!("TC 程序已挂载到接口 {} ({})", iface.name, self.target);

        Ok(RegistryEntry {
            interface: iface.clone(),
            qdisc,
            hooks,
            attached_at: Utc::now(),
        })
    }

    /// 释放条目持有的全部资源：逆序卸载各方向，最后删除 qdisc
    ///
    /// 每一步都会执行，前面的失败不会阻止后面的步骤。
    pub fn detach(&mut self, entry: RegistryEntry<B::Link>) -> Result<(), DetachError> {
        let RegistryEntry {
            interface,
            qdisc,
            hooks,
            ..
        } = entry;
        let mut failures = Vec::new();

        for hook in hooks.into_iter().rev() {
            let direction = hook.direction;
            match self.backend.detach(&interface, direction, hook.link) {
                Ok(()) => debug!("已卸载接口 {} 的 {} 程序", interface.name, direction),
                Err(e) => failures.push((DetachStep::Detach(direction), e)),
            }
        }

        if let Some(qdisc) = qdisc {
            if let Err(e) = self.backend.remove_qdisc(qdisc) {
                failures.push((DetachStep::RemoveQdisc, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DetachError {
                interface: interface.name,
                failures,
            })
        }
    }
}
