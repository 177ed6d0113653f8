//! 基于 `tc filter` 命令的挂载实现
//!
//! 直接操作接口的 filter 表：由 `tc` 自己从目标文件中加载程序段并以
//! direct-action 模式挂载，不经过 aya。

use std::path::{Path, PathBuf};
use toa_common::{AttachError, Error, HookDirection, InterfaceDescriptor, QdiscHandle, Result};
use tracing::debug;

use crate::backend::TcBackend;
use crate::tc_cli;

const FILTER_PRIORITY: u16 = 1;
const FILTER_HANDLE: u32 = 1;

/// `tc filter` 挂载产生的链接，由接口名、方向、优先级和句柄唯一确定
#[derive(Debug, PartialEq, Eq)]
pub struct TcFilterLink {
    ifname: String,
    direction: HookDirection,
    priority: u16,
    handle: u32,
}

/// 通过 `tc` 命令挂载 TC 程序
pub struct TcFilterBackend {
    object_file: PathBuf,
    section: String,
}

impl TcFilterBackend {
    pub fn new(object_file: &Path, section: &str) -> Result<Self> {
        if !object_file.is_file() {
            return Err(Error::Loader(format!(
                "eBPF 目标文件不存在: {:?}",
                object_file
            )));
        }

        Ok(Self {
            object_file: object_file.to_path_buf(),
            section: section.to_string(),
        })
    }

    fn add_args(&self, ifname: &str, direction: HookDirection) -> Vec<String> {
        let mut args = filter_selector("add", ifname, direction, FILTER_PRIORITY, FILTER_HANDLE);
        args.extend([
            "direct-action".to_string(),
            "object-file".to_string(),
            self.object_file.to_string_lossy().into_owned(),
            "section".to_string(),
            self.section.clone(),
        ]);
        args
    }
}

fn filter_selector(
    verb: &str,
    ifname: &str,
    direction: HookDirection,
    priority: u16,
    handle: u32,
) -> Vec<String> {
    vec![
        "filter".to_string(),
        verb.to_string(),
        "dev".to_string(),
        ifname.to_string(),
        direction.name().to_string(),
        "prio".to_string(),
        priority.to_string(),
        "handle".to_string(),
        handle.to_string(),
        "bpf".to_string(),
    ]
}

fn run(args: &[String]) -> std::result::Result<(), AttachError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    tc_cli::run_tc(&args)
}

impl TcBackend for TcFilterBackend {
    type Link = TcFilterLink;

    fn remove_stale_qdisc(
        &mut self,
        iface: &InterfaceDescriptor,
    ) -> std::result::Result<(), AttachError> {
        tc_cli::delete_clsact(&iface.name)
    }

    fn remove_stale_hook(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
    ) -> std::result::Result<(), AttachError> {
        run(&filter_selector(
            "del",
            &iface.name,
            direction,
            FILTER_PRIORITY,
            FILTER_HANDLE,
        ))
    }

    fn create_qdisc(
        &mut self,
        iface: &InterfaceDescriptor,
    ) -> std::result::Result<QdiscHandle, AttachError> {
        tc_cli::add_clsact(&iface.name)?;
        Ok(QdiscHandle::clsact(iface.index, iface.name.clone()))
    }

    fn attach(
        &mut self,
        iface: &InterfaceDescriptor,
        direction: HookDirection,
    ) -> std::result::Result<Self::Link, AttachError> {
        run(&self.add_args(&iface.name, direction))?;
        debug!("tc filter 已挂载到 {} {}", iface.name, direction);

        Ok(TcFilterLink {
            ifname: iface.name.clone(),
            direction,
            priority: FILTER_PRIORITY,
            handle: FILTER_HANDLE,
        })
    }

    fn detach(
        &mut self,
        _iface: &InterfaceDescriptor,
        _direction: HookDirection,
        link: Self::Link,
    ) -> std::result::Result<(), AttachError> {
        run(&filter_selector(
            "del",
            &link.ifname,
            link.direction,
            link.priority,
            link.handle,
        ))
    }

    fn remove_qdisc(&mut self, qdisc: QdiscHandle) -> std::result::Result<(), AttachError> {
        tc_cli::delete_clsact(qdisc.ifname())
    }
}
