//! 网络接口发现
//!
//! 启动时枚举一次宿主机网络接口，并筛选出可以挂载的接口：
//! 处于 up 状态、不是回环、名称不匹配已知虚拟网卡前缀。

use pnet::datalink::{self, NetworkInterface};
use std::fmt;
use toa_common::{Error, InterfaceDescriptor, InterfaceFlags, Result};
use tracing::debug;

use crate::config::AgentConfig;

/// 网络接口来源
pub trait InterfaceSource {
    /// 按内核顺序返回全部网络接口
    fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>>;
}

/// 通过 pnet 枚举宿主机网络接口
#[derive(Debug, Default, Clone, Copy)]
pub struct HostInterfaces;

impl InterfaceSource for HostInterfaces {
    fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>> {
        let interfaces: Vec<InterfaceDescriptor> =
            datalink::interfaces().iter().map(describe).collect();

        // 正常主机至少有回环接口，空列表说明枚举本身失败了
        if interfaces.is_empty() {
            return Err(Error::Discovery("未枚举到任何网络接口".to_string()));
        }

        debug!("枚举到 {} 个网络接口", interfaces.len());
        Ok(interfaces)
    }
}

fn describe(iface: &NetworkInterface) -> InterfaceDescriptor {
    InterfaceDescriptor::new(
        iface.index,
        iface.name.clone(),
        InterfaceFlags {
            up: iface.is_up(),
            loopback: iface.is_loopback(),
            point_to_point: iface.is_point_to_point(),
        },
    )
}

/// 接口被排除的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// 管理状态不是 up
    Down,
    /// 回环接口
    Loopback,
    /// 名称匹配虚拟网卡前缀
    VirtualPrefix(String),
    /// 不在配置的接口列表中
    NotSelected,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::Down => write!(f, "接口未启用"),
            Exclusion::Loopback => write!(f, "回环接口"),
            Exclusion::VirtualPrefix(prefix) => write!(f, "匹配虚拟网卡前缀 {}", prefix),
            Exclusion::NotSelected => write!(f, "不在配置的接口列表中"),
        }
    }
}

/// 接口资格过滤器
#[derive(Debug, Clone, Default)]
pub struct EligibilityFilter {
    excluded_prefixes: Vec<String>,
    allowlist: Vec<String>,
}

impl EligibilityFilter {
    pub fn new(excluded_prefixes: Vec<String>, allowlist: Vec<String>) -> Self {
        Self {
            excluded_prefixes,
            allowlist,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.excluded_prefixes.clone(), config.interfaces.clone())
    }

    /// 判断单个接口是否可挂载
    pub fn check(&self, iface: &InterfaceDescriptor) -> std::result::Result<(), Exclusion> {
        if !self.allowlist.is_empty() && !self.allowlist.iter().any(|name| *name == iface.name) {
            return Err(Exclusion::NotSelected);
        }
        if !iface.is_up() {
            return Err(Exclusion::Down);
        }
        if iface.is_loopback() {
            return Err(Exclusion::Loopback);
        }
        if let Some(prefix) = self
            .excluded_prefixes
            .iter()
            .find(|prefix| iface.name.starts_with(prefix.as_str()))
        {
            return Err(Exclusion::VirtualPrefix(prefix.clone()));
        }
        Ok(())
    }

    /// 按原顺序返回可挂载的接口
    pub fn eligible(&self, interfaces: Vec<InterfaceDescriptor>) -> Vec<InterfaceDescriptor> {
        interfaces
            .into_iter()
            .filter(|iface| match self.check(iface) {
                Ok(()) => true,
                Err(reason) => {
                    debug!("跳过接口 {}: {}", iface.name, reason);
                    false
                }
            })
            .collect()
    }
}
