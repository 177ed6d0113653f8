//! 测试用的内存内核实现

use std::collections::{HashMap, HashSet};
use toa_common::{AttachError, HookDirection, InterfaceDescriptor, QdiscHandle};
use toa_ebpf::TcBackend;

use crate::discovery::InterfaceSource;

/// 固定的接口列表
impl InterfaceSource for Vec<InterfaceDescriptor> {
    fn interfaces(&self) -> toa_common::Result<Vec<InterfaceDescriptor>> {
        Ok(self.clone())
    }
}

/// 记录内核状态的假后端，可按接口注入失败
#[derive(Debug, Default)]
pub struct FakeBackend {
    /// 当前存在的 qdisc（接口名）
    pub qdiscs: HashSet<String>,
    /// 当前存在的挂载：链接号 -> (接口名, 方向)
    pub links: HashMap<u32, (String, HookDirection)>,
    /// 调用记录
    pub calls: Vec<String>,
    /// 创建 qdisc 失败的接口
    pub fail_qdisc: HashSet<String>,
    /// 挂载失败的 (接口名, 方向)
    pub fail_attach: HashSet<(String, HookDirection)>,
    /// 卸载失败的接口
    pub fail_detach: HashSet<String>,
    next_link: u32,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_qdisc(mut self, ifname: &str) -> Self {
        self.fail_qdisc.insert(ifname.to_string());
        self
    }

    pub fn failing_attach(mut self, ifname: &str, direction: HookDirection) -> Self {
        self.fail_attach.insert((ifname.to_string(), direction));
        self
    }

    pub fn failing_detach(mut self, ifname: &str) -> Self {
        self.fail_detach.insert(ifname.to_string());
        self
    }

    /// 仍存在于内核中的资源数量
    pub fn live_resources(&self) -> usize {
        self.qdiscs.len() + self.links.len()
    }

    pub fn attached_directions(&self, ifname: &str) -> Vec<HookDirection> {
        let mut directions: Vec<_> = self
            .links
            .values()
            .filter(|(name, _)| name == ifname)
            .map(|(_, direction)| *direction)
            .collect();
        directions.sort_by_key(|d| d.name());
        directions
    }
}

impl TcBackend for FakeBackend {
    type Link = u32;

    fn remove_stale_qdisc(&mut self, iface: &InterfaceDescriptor) -> Result<(), AttachError> {
        self.calls.push(format!("stale {}", iface.name));
        self.links.retain(|_, (name, _)| *name != iface.name);
        if self.qdiscs.remove(&iface.name) {
            Ok(())
        } else {
            Err(AttachError::NotFound(format!("clsact@{}", iface.name)))
        }
    }

    fn remove_stale_hook(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
    ) -> Result<(), AttachError> {
        self.calls.push(format!("stale {} {}", iface.name, direction));
        let before = self.links.len();
        self.links
            .retain(|_, (name, d)| !(*name == iface.name && *d == direction));
        if self.links.len() < before {
            Ok(())
        } else {
            Err(AttachError::NotFound(format!("{} {}", iface.name, direction)))
        }
    }

    fn create_qdisc(&mut self, iface: &InterfaceDescriptor) -> Result<QdiscHandle, AttachError> {
        self.calls.push(format!("qdisc {}", iface.name));
        if self.fail_qdisc.contains(&iface.name) {
            return Err(AttachError::PermissionDenied(format!("clsact@{}", iface.name)));
        }
        if !self.qdiscs.insert(iface.name.clone()) {
            return Err(AttachError::AlreadyAttached(format!("clsact@{}", iface.name)));
        }
        Ok(QdiscHandle::clsact(iface.index, iface.name.clone()))
    }

    fn attach(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
    ) -> Result<u32, AttachError> {
        self.calls.push(format!("attach {} {}", iface.name, direction));
        if self.fail_attach.contains(&(iface.name.clone(), direction)) {
            return Err(AttachError::KernelMismatch(format!("{} {}", iface.name, direction)));
        }
        self.next_link += 1;
        self.links
            .insert(self.next_link, (iface.name.clone(), direction));
        Ok(self.next_link)
    }

    fn detach(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
        link: u32,
    ) -> Result<(), AttachError> {
        self.calls.push(format!("detach {} {}", iface.name, direction));
        if self.fail_detach.contains(&iface.name) {
            return Err(AttachError::Kernel(format!("{} {}", iface.name, direction)));
        }
        self.links
            .remove(&link)
            .map(|_| ())
            .ok_or_else(|| AttachError::NotFound(format!("link {}", link)))
    }

    fn remove_qdisc(&mut self, qdisc: QdiscHandle) -> Result<(), AttachError> {
        self.calls.push(format!("remove {}", qdisc.ifname()));
        // 删除 clsact 会连带删除其上的全部 filter
        self.links.retain(|_, (name, _)| name.as_str() != qdisc.ifname());
        if self.qdiscs.remove(qdisc.ifname()) {
            Ok(())
        } else {
            Err(AttachError::NotFound(qdisc.to_string()))
        }
    }
}
