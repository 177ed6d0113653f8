//! 挂载登记表
//!
//! 纯内存账本：记录每个挂载成功的接口持有的内核资源，
//! 既用于汇报挂载结果，也用于退出时逐个卸载。只由生命周期控制器写入。

use chrono::{DateTime, Utc};
use std::fmt;
use toa_common::{HookDirection, InterfaceDescriptor, QdiscHandle};

/// 单个方向的挂载
#[derive(Debug)]
pub struct AttachedHook<L> {
    pub direction: HookDirection,
    pub link: L,
}

/// 登记表条目
///
/// 至少持有一个已挂载的方向；挂载失败的接口不会产生条目。
#[derive(Debug)]
pub struct RegistryEntry<L> {
    pub interface: InterfaceDescriptor,
    /// 本进程创建的 qdisc；复用已有 qdisc 时为 `None`
    pub qdisc: Option<QdiscHandle>,
    pub hooks: Vec<AttachedHook<L>>,
    pub attached_at: DateTime<Utc>,
}

impl<L> RegistryEntry<L> {
    pub fn name(&self) -> &str {
        &self.interface.name
    }

    pub fn directions(&self) -> Vec<HookDirection> {
        self.hooks.iter().map(|hook| hook.direction).collect()
    }
}

/// 重复登记：被拒绝的条目原样交还，调用方负责释放其资源
#[derive(Debug)]
pub struct DuplicateEntry<L>(pub RegistryEntry<L>);

impl<L> fmt::Display for DuplicateEntry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "接口 {} 已登记", self.0.name())
    }
}

/// 挂载登记表，按插入顺序保存
#[derive(Debug)]
pub struct AttachmentRegistry<L> {
    entries: Vec<RegistryEntry<L>>,
}

impl<L> Default for AttachmentRegistry<L> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<L> AttachmentRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个接口，同一接口不允许登记两次
    pub fn record(&mut self, entry: RegistryEntry<L>) -> Result<(), DuplicateEntry<L>> {
        if self.contains(entry.name()) {
            return Err(DuplicateEntry(entry));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// 按插入顺序遍历
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &RegistryEntry<L>> + '_ {
        self.entries.iter()
    }

    /// 按插入顺序返回接口名
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    /// 移除条目并交出所有权
    pub fn remove(&mut self, name: &str) -> Option<RegistryEntry<L>> {
        let position = self.entries.iter().position(|e| e.name() == name)?;
        Some(self.entries.remove(position))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry<L>> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
