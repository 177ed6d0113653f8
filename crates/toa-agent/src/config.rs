//! 配置管理模块
//!
//! 该模块负责加载和管理 Agent 的配置，支持 YAML/JSON 配置文件，
//! 并允许通过 `TOA_` 前缀的环境变量覆盖单个字段。

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toa_common::{HookTarget, QdiscPolicy};
use tracing::debug;

/// 默认排除的虚拟网卡前缀（容器运行时创建的网桥、veth 对和隧道端点）
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &[
    "veth", "docker", "br-", "cni", "flannel", "cali", "virbr", "lxc", "tunl",
];

/// 挂载机制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachMechanism {
    /// 通过 aya 加载程序并挂载
    #[default]
    Aya,
    /// 通过 `tc filter` 命令直接操作 filter 表
    TcFilter,
}

/// Agent 配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// TC 程序目标文件路径
    pub bpf_object: PathBuf,
    /// 目标文件中的分类器程序名
    pub program_name: String,
    /// 挂载机制
    pub mechanism: AttachMechanism,
    /// `tc-filter` 机制下使用的程序段名
    pub tc_section: String,
    /// 挂载方向
    pub hook_target: HookTarget,
    /// qdisc 幂等策略
    pub qdisc_policy: QdiscPolicy,
    /// 仅挂载这些接口；为空时考虑全部接口
    pub interfaces: Vec<String>,
    /// 排除的接口名前缀
    pub excluded_prefixes: Vec<String>,
    /// 日志级别
    pub log_level: String,
    /// cgroup sockops 配置
    pub sockops: SockOpsConfig,
}

/// cgroup sockops 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SockOpsConfig {
    /// 是否启用
    pub enabled: bool,
    /// sockops 程序目标文件路径
    pub bpf_object: PathBuf,
    /// sockops 程序名
    pub program_name: String,
    /// cgroup v2 挂载路径
    pub cgroup_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bpf_object: PathBuf::from("/opt/toa-injector/bpf/bpf_tcp_option_kern.o"),
            program_name: "inject_tcp_option".to_string(),
            mechanism: AttachMechanism::default(),
            tc_section: "tc".to_string(),
            hook_target: HookTarget::default(),
            qdisc_policy: QdiscPolicy::default(),
            interfaces: Vec::new(),
            excluded_prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            log_level: "info".to_string(),
            sockops: SockOpsConfig::default(),
        }
    }
}

impl Default for SockOpsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bpf_object: PathBuf::from("/opt/toa-injector/bpf/bpf_sockops_toa.o"),
            program_name: "bpf_sockops_toa".to_string(),
            cgroup_path: PathBuf::from("/sys/fs/cgroup"),
        }
    }
}

impl AgentConfig {
    /// 校验反序列化后的配置
    pub fn validate(&self) -> Result<()> {
        if self.bpf_object.as_os_str().is_empty() {
            return Err(anyhow!("bpf_object 不能为空"));
        }
        if self.program_name.trim().is_empty() {
            return Err(anyhow!("program_name 不能为空"));
        }
        if self.mechanism == AttachMechanism::TcFilter && self.tc_section.trim().is_empty() {
            return Err(anyhow!("tc-filter 机制需要 tc_section"));
        }
        if self.sockops.enabled {
            if self.sockops.bpf_object.as_os_str().is_empty()
                || self.sockops.program_name.trim().is_empty()
                || self.sockops.cgroup_path.as_os_str().is_empty()
            {
                return Err(anyhow!(
                    "启用 sockops 时必须配置 bpf_object、program_name 和 cgroup_path"
                ));
            }
        }
        Ok(())
    }
}

/// 配置管理器
pub struct ConfigManager {
    /// 配置文件路径
    config_path: Option<PathBuf>,
    /// 当前配置
    config: AgentConfig,
}

impl ConfigManager {
    /// 从配置文件创建配置管理器，未提供路径时使用默认配置
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Self::load_config(config_path).with_context(|| match config_path {
            Some(path) => format!("无法加载配置文件: {:?}", path),
            None => "无法加载默认配置".to_string(),
        })?;

        Ok(Self {
            config_path: config_path.map(Path::to_path_buf),
            config,
        })
    }

    /// 直接使用给定配置
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// 加载配置文件并叠加环境变量
    fn load_config(config_path: Option<&Path>) -> Result<AgentConfig> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            // 确定配置文件格式
            let format = match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(anyhow!("不支持的配置文件格式，仅支持 YAML 或 JSON")),
            };
            builder = builder.add_source(File::from(path).format(format));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("TOA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("interfaces")
                    .with_list_parse_key("excluded_prefixes"),
            )
            .build()
            .context("构建配置失败")?;

        let agent_config = config
            .try_deserialize::<AgentConfig>()
            .context("配置格式错误")?;
        agent_config.validate()?;

        debug!("配置加载完成: {:?}", agent_config);
        Ok(agent_config)
    }

    /// 获取配置文件路径
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 获取完整配置
    pub fn get_config(&self) -> &AgentConfig {
        &self.config
    }
}
