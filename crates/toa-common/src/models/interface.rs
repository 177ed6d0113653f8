//! 网络接口模型
//!
//! 启动时对宿主机网络接口做一次快照，运行期间不再刷新（不支持热插拔）。

use std::fmt;

/// 接口状态标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterfaceFlags {
    /// 管理状态为 up
    pub up: bool,
    /// 回环接口
    pub loopback: bool,
    /// 点对点接口
    pub point_to_point: bool,
}

impl InterfaceFlags {
    /// 处于 up 状态的普通接口
    pub fn up() -> Self {
        Self {
            up: true,
            ..Self::default()
        }
    }

    /// 回环接口
    pub fn loopback() -> Self {
        Self {
            up: true,
            loopback: true,
            point_to_point: false,
        }
    }
}

/// 网络接口描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// 内核接口索引
    pub index: u32,
    /// 接口名称
    pub name: String,
    /// 状态标志
    pub flags: InterfaceFlags,
}

impl InterfaceDescriptor {
    pub fn new(index: u32, name: impl Into<String>, flags: InterfaceFlags) -> Self {
        Self {
            index,
            name: name.into(),
            flags,
        }
    }

    pub fn is_up(&self) -> bool {
        self.flags.up
    }

    pub fn is_loopback(&self) -> bool {
        self.flags.loopback
    }

    pub fn is_point_to_point(&self) -> bool {
        self.flags.point_to_point
    }
}

impl fmt::Display for InterfaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(#{})", self.name, self.index)
    }
}
