//! 基于 aya 的 TC 挂载实现
//!
//! 同一个已加载的分类器程序可以挂到任意多个接口的任意方向上，
//! 每次挂载返回一个 `SchedClassifierLinkId`，卸载时交还给程序。

use aya::programs::tc::{self, SchedClassifierLinkId};
use aya::programs::{ProgramError, SchedClassifier, TcAttachType};
use toa_common::{AttachError, HookDirection, InterfaceDescriptor, QdiscHandle};
use tracing::debug;

use crate::backend::TcBackend;
use crate::loader::LoadedProgram;
use crate::tc_cli;

/// 钩子管理器
pub struct HookManager {
    program: LoadedProgram,
}

impl HookManager {
    /// 创建新的钩子管理器
    pub fn new(program: LoadedProgram) -> Self {
        Self { program }
    }

    fn classifier(&mut self) -> Result<&mut SchedClassifier, AttachError> {
        let name = &self.program.program_name;
        let program = self
            .program
            .bpf
            .program_mut(name)
            .ok_or_else(|| AttachError::NotFound(format!("程序 {}", name)))?;

        let classifier: &mut SchedClassifier = program
            .try_into()
            .map_err(|e: ProgramError| AttachError::from_error(format!("程序 {}", name), &e))?;
        Ok(classifier)
    }
}

fn tc_attach_type(direction: HookDirection) -> TcAttachType {
    match direction {
        HookDirection::Ingress => TcAttachType::Ingress,
        HookDirection::Egress => TcAttachType::Egress,
    }
}

impl TcBackend for HookManager {
    type Link = SchedClassifierLinkId;

    fn remove_stale_qdisc(&mut self, iface: &InterfaceDescriptor) -> Result<(), AttachError> {
        tc_cli::delete_clsact(&iface.name)
    }

    // 按程序名删除该方向上的全部 filter，其他程序的 filter 不受影响
    fn remove_stale_hook(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
    ) -> Result<(), AttachError> {
        tc::qdisc_detach_program(
            &iface.name,
            tc_attach_type(direction),
            &self.program.program_name,
        )
        .map_err(|e| AttachError::from_io(format!("{} {}", iface.name, direction), &e))
    }

    fn create_qdisc(&mut self, iface: &InterfaceDescriptor) -> Result<QdiscHandle, AttachError> {
        tc::qdisc_add_clsact(&iface.name)
            .map_err(|e| AttachError::from_io(format!("clsact@{}", iface.name), &e))?;

        Ok(QdiscHandle::clsact(iface.index, iface.name.clone()))
    }

    fn attach(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
    ) -> Result<Self::Link, AttachError> {
        let program = self.classifier()?;
        let link = program
            .attach(&iface.name, tc_attach_type(direction))
            .map_err(|e| AttachError::from_error(format!("{} {}", iface.name, direction), &e))?;

        debug!("TC 程序已挂载到 {} {}", iface.name, direction);
        Ok(link)
    }

    fn detach(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
        link: Self::Link,
    ) -> Result<(), AttachError> {
        let program = self.classifier()?;
        program
            .detach(link)
            .map_err(|e| AttachError::from_error(format!("{} {}", iface.name, direction), &e))
    }

    fn remove_qdisc(&mut self, qdisc: QdiscHandle) -> Result<(), AttachError> {
        tc_cli::delete_clsact(qdisc.ifname())
    }
}
