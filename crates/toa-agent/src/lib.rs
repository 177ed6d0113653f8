//! TOA Injector Agent - 用户态守护进程
//!
//! 该模块实现 TOA Injector 的用户态代理：在宿主机的物理网卡上挂载 TCP 选项
//! 注入程序，记录每个挂载，并在收到退出信号时按逆序全部卸载。

pub mod config;
pub mod discovery;
pub mod driver;
pub mod lifecycle;
pub mod preflight;
pub mod registry;
pub mod shutdown;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use toa_ebpf::{load_classifier, CgroupSockOps, HookManager, TcBackend, TcFilterBackend};
use tracing::{info, warn};

use config::{AgentConfig, AttachMechanism, ConfigManager};
use discovery::{EligibilityFilter, HostInterfaces};
use driver::HookDriver;
use lifecycle::LifecycleController;

/// Agent 主结构体
pub struct Agent {
    /// 配置管理器
    config: ConfigManager,
}

impl Agent {
    /// 创建新的 Agent 实例
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = ConfigManager::new(config_path)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AgentConfig {
        self.config.get_config()
    }

    /// 运行 Agent，直到 `shutdown` 被取消且全部挂载卸载完毕
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let config = self.config();
        if let Some(path) = self.config.config_path() {
            info!("使用配置文件 {:?}", path);
        }

        preflight::run().context("启动前检查失败")?;

        let mut sockops = if config.sockops.enabled {
            let sockops = CgroupSockOps::attach(
                &config.sockops.bpf_object,
                &config.sockops.program_name,
                &config.sockops.cgroup_path,
            )
            .context("sockops 程序挂载失败")?;
            Some(sockops)
        } else {
            None
        };

        let result = self.supervise_interfaces(shutdown).await;

        // sockops 在接口全部卸载之后再卸载
        if let Some(sockops) = sockops.as_mut() {
            if let Err(e) = sockops.detach() {
                warn!("sockops 程序卸载失败: {}", e);
            }
        }

        result.context("TC 程序挂载失败")?;
        info!("TOA Injector Agent 已停止");
        Ok(())
    }

    /// 按配置的机制准备后端并运行生命周期控制器
    async fn supervise_interfaces(&self, shutdown: CancellationToken) -> toa_common::Result<()> {
        let config = self.config();
        match config.mechanism {
            AttachMechanism::Aya => {
                let program = load_classifier(&config.bpf_object, &config.program_name)?;
                supervise(HookManager::new(program), config, shutdown).await
            }
            AttachMechanism::TcFilter => {
                let backend = TcFilterBackend::new(&config.bpf_object, &config.tc_section)?;
                supervise(backend, config, shutdown).await
            }
        }
    }
}

async fn supervise<B: TcBackend>(
    backend: B,
    config: &AgentConfig,
    shutdown: CancellationToken,
) -> toa_common::Result<()> {
    let driver = HookDriver::new(backend, config.hook_target, config.qdisc_policy);
    let mut controller = LifecycleController::new(driver, EligibilityFilter::from_config(config));
    controller.run(&HostInterfaces, shutdown).await
}
