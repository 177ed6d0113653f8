//! 启动前检查
//!
//! 挂载 TC 程序需要 CAP_NET_ADMIN；老内核上 eBPF map 按 memlock 计费，
//! 需要解除 RLIMIT_MEMLOCK 限制。任一项失败都会终止启动。

use caps::{CapSet, Capability};
use std::io;
use toa_common::{Error, Result};
use tracing::debug;

/// 确认进程拥有 CAP_NET_ADMIN
pub fn check_privileges() -> Result<()> {
    let has_cap = caps::has_cap(None, CapSet::Effective, Capability::CAP_NET_ADMIN)
        .map_err(|e| Error::Privilege(format!("无法查询进程权限: {}", e)))?;

    if !has_cap {
        return Err(Error::Privilege(
            "缺少 CAP_NET_ADMIN，请以 root 运行或授予该权限".to_string(),
        ));
    }

    debug!("权限检查通过");
    Ok(())
}

/// 解除锁定内存限制
pub fn remove_memlock_limit() -> Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        return Err(Error::ResourceLimit(io::Error::last_os_error()));
    }

    debug!("已解除 RLIMIT_MEMLOCK 限制");
    Ok(())
}

/// 依次执行全部启动前检查
pub fn run() -> Result<()> {
    check_privileges()?;
    remove_memlock_limit()
}
