//! 错误处理模块
//!
//! 该模块提供 TOA Injector 的统一错误类型。`Error` 覆盖所有启动期致命错误，
//! `AttachError` 描述单次内核挂载/卸载操作的失败原因。

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// TOA Injector 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 无法枚举网络接口
    #[error("网络接口枚举失败: {0}")]
    Discovery(String),

    /// 没有符合条件的网络接口
    #[error("没有符合条件的网络接口")]
    NoEligibleInterfaces,

    /// 所有接口都挂载失败
    #[error("没有任何网络接口挂载成功，请确认以 root 或 CAP_NET_ADMIN 权限运行")]
    NoInterfacesAttached,

    /// 编译产物加载失败
    #[error("eBPF 程序加载失败: {0}")]
    Loader(String),

    /// 权限不足
    #[error("权限检查失败: {0}")]
    Privilege(String),

    /// 资源限制调整失败
    #[error("无法解除内存锁定限制: {0}")]
    ResourceLimit(#[source] io::Error),

    /// 启动期必须成功的挂载失败
    #[error("挂载失败: {0}")]
    Hook(#[from] AttachError),

    /// 同一接口被重复登记，属于程序逻辑错误
    #[error("内部一致性错误: 接口 {0} 被重复登记")]
    DuplicateRegistration(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),
}

/// TOA Injector 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

/// 内核挂载/卸载操作的失败类型
#[derive(Error, Debug)]
pub enum AttachError {
    /// 对象不存在（接口、qdisc、程序或链接）
    #[error("对象不存在: {0}")]
    NotFound(String),

    /// 权限不足
    #[error("权限不足: {0}")]
    PermissionDenied(String),

    /// 已经挂载或已存在
    #[error("已存在: {0}")]
    AlreadyAttached(String),

    /// 内核不支持或版本不匹配
    #[error("内核版本不兼容: {0}")]
    KernelMismatch(String),

    /// 其他内核错误
    #[error("内核操作失败: {0}")]
    Kernel(String),
}

impl AttachError {
    /// 根据 errno 对 I/O 错误分类
    pub fn from_io(context: impl Into<String>, err: &io::Error) -> Self {
        let detail = format!("{}: {}", context.into(), err);

        match err.raw_os_error() {
            Some(libc::EPERM | libc::EACCES) => return AttachError::PermissionDenied(detail),
            Some(libc::EEXIST | libc::EBUSY) => return AttachError::AlreadyAttached(detail),
            Some(libc::ENOENT | libc::ENODEV | libc::ENXIO) => return AttachError::NotFound(detail),
            Some(libc::EINVAL | libc::EOPNOTSUPP | libc::ENOSYS | libc::E2BIG) => {
                return AttachError::KernelMismatch(detail)
            }
            Some(_) => return AttachError::Kernel(detail),
            None => {}
        }

        match err.kind() {
            io::ErrorKind::PermissionDenied => AttachError::PermissionDenied(detail),
            io::ErrorKind::AlreadyExists => AttachError::AlreadyAttached(detail),
            io::ErrorKind::NotFound => AttachError::NotFound(detail),
            io::ErrorKind::Unsupported | io::ErrorKind::InvalidInput => {
                AttachError::KernelMismatch(detail)
            }
            _ => AttachError::Kernel(detail),
        }
    }

    /// 沿错误链查找底层 I/O 错误后分类，找不到时归为 `Kernel`
    pub fn from_error(context: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
        let context = context.into();
        let mut current: Option<&(dyn StdError + 'static)> = Some(err);

        while let Some(e) = current {
            if let Some(io_error) = e.downcast_ref::<io::Error>() {
                return Self::from_io(context, io_error);
            }
            current = e.source();
        }

        AttachError::Kernel(format!("{}: {}", context, err))
    }

    pub fn is_already_attached(&self) -> bool {
        matches!(self, AttachError::AlreadyAttached(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AttachError::NotFound(_))
    }
}
