//! cgroup sockops 挂载
//!
//! 另一种注入方式：把 sockops 程序挂到 cgroup v2 根目录，由内核在建连时
//! 写入 TCP 选项。与按接口挂载的 TC 程序相互独立，只需挂载一次。

use aya::programs::sock_ops::SockOpsLinkId;
use aya::programs::{ProgramError, SockOps};
use aya::Bpf;
use std::fs::File;
use std::path::{Path, PathBuf};
use toa_common::{AttachError, Error, Result};
use tracing::info;

use crate::loader::open_object;

/// 已挂载到 cgroup 的 sockops 程序
pub struct CgroupSockOps {
    bpf: Bpf,
    program_name: String,
    cgroup_path: PathBuf,
    link: Option<SockOpsLinkId>,
}

impl CgroupSockOps {
    /// 加载 sockops 程序并挂载到指定 cgroup
    pub fn attach(object_path: &Path, program_name: &str, cgroup_path: &Path) -> Result<Self> {
        let mut bpf = open_object(object_path)?;

        let program: &mut SockOps = bpf
            .program_mut(program_name)
            .ok_or_else(|| {
                Error::Loader(format!(
                    "目标文件 {:?} 中没有程序 {}",
                    object_path, program_name
                ))
            })?
            .try_into()
            .map_err(|e: ProgramError| Error::Loader(format!("程序 {} 不是 sockops 程序: {}", program_name, e)))?;

        program
            .load()
            .map_err(|e| Error::Loader(format!("内核拒绝加载程序 {}: {}", program_name, e)))?;

        let cgroup = File::open(cgroup_path)
            .map_err(|e| AttachError::from_io(format!("cgroup {:?}", cgroup_path), &e))?;

        let link = program
            .attach(cgroup)
            .map_err(|e: ProgramError| AttachError::from_error(format!("cgroup {:?}", cgroup_path), &e))?;

        info!("sockops 程序 {} 已挂载到 cgroup {:?}", program_name, cgroup_path);

        Ok(Self {
            bpf,
            program_name: program_name.to_string(),
            cgroup_path: cgroup_path.to_path_buf(),
            link: Some(link),
        })
    }

    /// 卸载 sockops 程序，重复调用无副作用
    pub fn detach(&mut self) -> std::result::Result<(), AttachError> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };

        let context = format!("cgroup {:?}", self.cgroup_path);
        let program: &mut SockOps = self
            .bpf
            .program_mut(&self.program_name)
            .ok_or_else(|| AttachError::NotFound(format!("程序 {}", self.program_name)))?
            .try_into()
            .map_err(|e: ProgramError| AttachError::from_error(&context, &e))?;

        program
            .detach(link)
            .map_err(|e: ProgramError| AttachError::from_error(&context, &e))?;

        info!("sockops 程序已从 cgroup {:?} 卸载", self.cgroup_path);
        Ok(())
    }
}
