//! `tc` 命令封装
//!
//! aya 没有提供删除 clsact qdisc 的接口，qdisc 的删除以及 `TcFilterBackend`
//! 的全部操作都通过 iproute2 的 `tc` 命令完成。

use std::process::Command;
use toa_common::AttachError;
use tracing::debug;

const TC_BINARY: &str = "tc";

/// 执行一条 `tc` 命令，失败时根据 stderr 分类
pub fn run_tc(args: &[&str]) -> Result<(), AttachError> {
    let context = format!("{} {}", TC_BINARY, args.join(" "));
    debug!("执行命令: {}", context);

    let output = Command::new(TC_BINARY)
        .args(args)
        .output()
        .map_err(|e| AttachError::from_io(&context, &e))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(classify_tc_failure(&context, stderr.trim()))
}

/// 根据 `tc` 的错误输出判断失败类型
pub fn classify_tc_failure(context: &str, stderr: &str) -> AttachError {
    let detail = format!("{}: {}", context, stderr);
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("operation not permitted") || lower.contains("permission denied") {
        AttachError::PermissionDenied(detail)
    } else if lower.contains("file exists") || lower.contains("exclusivity flag on") {
        AttachError::AlreadyAttached(detail)
    } else if lower.contains("cannot find device")
        || lower.contains("no such file")
        || lower.contains("cannot find specified")
        || lower.contains("cannot delete qdisc with handle of zero")
    {
        AttachError::NotFound(detail)
    } else if lower.contains("invalid argument")
        || lower.contains("not supported")
        || lower.contains("unknown qdisc")
    {
        AttachError::KernelMismatch(detail)
    } else {
        AttachError::Kernel(detail)
    }
}

/// 创建 clsact qdisc
pub fn add_clsact(ifname: &str) -> Result<(), AttachError> {
    run_tc(&["qdisc", "add", "dev", ifname, "clsact"])
}

/// 删除 clsact qdisc，挂在其上的所有 filter 会随之删除
pub fn delete_clsact(ifname: &str) -> Result<(), AttachError> {
    run_tc(&["qdisc", "del", "dev", ifname, "clsact"])
}
