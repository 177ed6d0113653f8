//! eBPF 程序加载器
//!
//! 负责把构建期产出的 TC 目标文件加载进内核。加载失败（文件缺失、校验器拒绝、
//! 资源不足）在启动阶段是致命的：没有程序就没有可挂载的东西。

use aya::programs::{ProgramError, SchedClassifier};
use aya::{Bpf, BpfLoader};
use std::path::Path;
use toa_common::{Error, Result};
use tracing::{debug, info};

/// 已加载进内核的 TC 分类器程序
pub struct LoadedProgram {
    pub(crate) bpf: Bpf,
    pub(crate) program_name: String,
}

/// 加载目标文件并把指定的分类器程序载入内核
pub fn load_classifier(object_path: &Path, program_name: &str) -> Result<LoadedProgram> {
    let mut bpf = open_object(object_path)?;

    let program: &mut SchedClassifier = bpf
        .program_mut(program_name)
        .ok_or_else(|| {
            Error::Loader(format!(
                "目标文件 {:?} 中没有程序 {}",
                object_path, program_name
            ))
        })?
        .try_into()
        .map_err(|e: ProgramError| Error::Loader(format!("程序 {} 不是 TC 分类器: {}", program_name, e)))?;

    program
        .load()
        .map_err(|e| Error::Loader(format!("内核拒绝加载程序 {}: {}", program_name, e)))?;

    info!("已加载 TC 程序 {} ({:?})", program_name, object_path);

    Ok(LoadedProgram {
        bpf,
        program_name: program_name.to_string(),
    })
}

/// 打开目标文件，创建其中的 map 并解析程序段
pub(crate) fn open_object(object_path: &Path) -> Result<Bpf> {
    if !object_path.exists() {
        return Err(Error::Loader(format!(
            "eBPF 目标文件不存在: {:?}",
            object_path
        )));
    }

    debug!("打开 eBPF 目标文件: {:?}", object_path);

    BpfLoader::new()
        .load_file(object_path)
        .map_err(|e| Error::Loader(format!("解析目标文件 {:?} 失败: {}", object_path, e)))
}
