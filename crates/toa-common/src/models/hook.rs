//! 挂载点模型
//!
//! 描述 TC 程序在接口上的挂载方向，以及作为挂载前提的 clsact qdisc。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// 单个挂载方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookDirection {
    /// 入向流量
    Ingress,
    /// 出向流量
    Egress,
}

impl HookDirection {
    pub fn name(self) -> &'static str {
        match self {
            HookDirection::Ingress => "ingress",
            HookDirection::Egress => "egress",
        }
    }
}

impl fmt::Display for HookDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 需要挂载的方向集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookTarget {
    /// 仅入向
    Ingress,
    /// 仅出向
    #[default]
    Egress,
    /// 双向，使用同一个编译好的程序
    Both,
}

impl HookTarget {
    /// 按挂载顺序展开为方向列表，入向总是先于出向
    pub fn directions(self) -> &'static [HookDirection] {
        match self {
            HookTarget::Ingress => &[HookDirection::Ingress],
            HookTarget::Egress => &[HookDirection::Egress],
            HookTarget::Both => &[HookDirection::Ingress, HookDirection::Egress],
        }
    }
}

impl fmt::Display for HookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTarget::Ingress => write!(f, "ingress"),
            HookTarget::Egress => write!(f, "egress"),
            HookTarget::Both => write!(f, "both"),
        }
    }
}

impl FromStr for HookTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ingress" => Ok(HookTarget::Ingress),
            "egress" => Ok(HookTarget::Egress),
            "both" => Ok(HookTarget::Both),
            _ => Err(Error::Config(format!("无效的挂载方向: {}", s))),
        }
    }
}

/// clsact qdisc 的幂等策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QdiscPolicy {
    /// 先删除残留的 qdisc 再重新创建，退出时删除
    #[default]
    Reset,
    /// 已存在的 qdisc 直接复用，且退出时不删除
    Reuse,
}

/// clsact qdisc 句柄
///
/// 不可复制：每个句柄只能被释放一次。
#[derive(Debug, PartialEq, Eq)]
pub struct QdiscHandle {
    ifindex: u32,
    ifname: String,
}

impl QdiscHandle {
    pub fn clsact(ifindex: u32, ifname: impl Into<String>) -> Self {
        Self {
            ifindex,
            ifname: ifname.into(),
        }
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn ifname(&self) -> &str {
        &self.ifname
    }
}

impl fmt::Display for QdiscHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clsact@{}", self.ifname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HookTarget::Ingress, &[HookDirection::Ingress])]
    #[case(HookTarget::Egress, &[HookDirection::Egress])]
    #[case(HookTarget::Both, &[HookDirection::Ingress, HookDirection::Egress])]
    fn test_directions_order(#[case] target: HookTarget, #[case] expected: &[HookDirection]) {
        assert_eq!(target.directions(), expected);
    }

    #[test]
    fn test_hook_target_from_str() {
        assert_eq!("BOTH".parse::<HookTarget>().unwrap(), HookTarget::Both);
        assert_eq!("egress".parse::<HookTarget>().unwrap(), HookTarget::Egress);
        assert!("sideways".parse::<HookTarget>().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(HookTarget::default(), HookTarget::Egress);
        assert_eq!(QdiscPolicy::default(), QdiscPolicy::Reset);
    }

    #[test]
    fn test_qdisc_handle_display() {
        let handle = QdiscHandle::clsact(3, "eth0");
        assert_eq!(handle.ifindex(), 3);
        assert_eq!(handle.to_string(), "clsact@eth0");
    }
}
