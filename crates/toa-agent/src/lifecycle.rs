//! 生命周期控制器
//!
//! 启动时发现接口并逐个挂载，运行期间等待退出请求，退出时按挂载的逆序
//! 卸载全部接口。登记表只由控制器写入。

use std::fmt;
use tokio_util::sync::CancellationToken;
use toa_common::{Error, Result};
use toa_ebpf::TcBackend;
use tracing::{error, info, warn};

use crate::discovery::{EligibilityFilter, InterfaceSource};
use crate::driver::HookDriver;
use crate::registry::{AttachmentRegistry, DuplicateEntry};

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// 一次卸载的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// 完整卸载的接口，按卸载顺序
    pub detached: Vec<String>,
    /// 卸载不完整的接口
    pub failed: Vec<String>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.detached.is_empty() && self.failed.is_empty()
    }
}

/// 生命周期控制器
pub struct LifecycleController<B: TcBackend> {
    driver: HookDriver<B>,
    registry: AttachmentRegistry<B::Link>,
    filter: EligibilityFilter,
    state: LifecycleState,
}

impl<B: TcBackend> LifecycleController<B> {
    pub fn new(driver: HookDriver<B>, filter: EligibilityFilter) -> Self {
        Self {
            driver,
            registry: AttachmentRegistry::new(),
            filter,
            state: LifecycleState::Starting,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn registry(&self) -> &AttachmentRegistry<B::Link> {
        &self.registry
    }

    pub fn driver(&self) -> &HookDriver<B> {
        &self.driver
    }

    /// 发现接口并逐个挂载，返回挂载成功的接口数
    ///
    /// 没有可挂载的接口或全部挂载失败时返回错误，此时登记表为空。
    pub fn start(&mut self, source: &dyn InterfaceSource) -> Result<usize> {
        self.state = LifecycleState::Starting;

        let discovered = source.interfaces()?;
        let eligible = self.filter.eligible(discovered);
        if eligible.is_empty() {
            return Err(Error::NoEligibleInterfaces);
        }

        for iface in &eligible {
            // 再次挂载会先清理接口，已登记的挂载会被破坏
            if self.registry.contains(&iface.name) {
                error!("接口 {} 被重复发现，释放全部已挂载资源", iface.name);
                self.drain();
                return Err(Error::DuplicateRegistration(iface.name.clone()));
            }

            let entry = match self.driver.attach(iface) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("{}，跳过该接口", e);
                    continue;
                }
            };

            if let Err(DuplicateEntry(rejected)) = self.registry.record(entry) {
                let name = rejected.name().to_string();
                error!("接口 {} 被重复登记，释放全部已挂载资源", name);
                if let Err(e) = self.driver.detach(rejected) {
                    warn!("{}", e);
                }
                self.drain();
                return Err(Error::DuplicateRegistration(name));
            }
        }

        if self.registry.is_empty() {
            return Err(Error::NoInterfacesAttached);
        }

        self.state = LifecycleState::Running;
        info!(
            "已在 {} 个接口上挂载 TC 程序 ({}): {}",
            self.registry.len(),
            self.driver.target(),
            self.registry.names().join(", ")
        );
        Ok(self.registry.len())
    }

    /// 启动、等待退出请求、卸载
    ///
    /// 只有在收到退出请求并完成卸载后才返回 `Ok`。
    pub async fn run(
        &mut self,
        source: &dyn InterfaceSource,
        shutdown: CancellationToken,
    ) -> Result<()> {
        if let Err(e) = self.start(source) {
            self.drain();
            return Err(e);
        }

        if shutdown.is_cancelled() {
            info!("启动期间收到退出请求");
        } else {
            info!("运行中，等待退出信号");
        }
        shutdown.cancelled().await;

        let report = self.drain();
        info!(
            "卸载完成: 成功 {} 个，失败 {} 个",
            report.detached.len(),
            report.failed.len()
        );
        Ok(())
    }

    /// 按挂载的逆序卸载全部接口，单个失败只记录日志
    pub fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        if self.state == LifecycleState::Stopped {
            return report;
        }
        self.state = LifecycleState::Draining;

        for name in self.registry.names().into_iter().rev() {
            let Some(entry) = self.registry.remove(&name) else {
                continue;
            };
            match self.driver.detach(entry) {
                Ok(()) => {
                    info!("已从接口 {} 卸载 TC 程序", name);
                    report.detached.push(name);
                }
                Err(e) => {
                    warn!("{}", e);
                    report.failed.push(name);
                }
            }
        }

        self.state = LifecycleState::Stopped;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use toa_common::{HookDirection, HookTarget, InterfaceDescriptor, InterfaceFlags, QdiscPolicy};

    fn controller(backend: FakeBackend, target: HookTarget) -> LifecycleController<FakeBackend> {
        LifecycleController::new(
            HookDriver::new(backend, target, QdiscPolicy::Reset),
            EligibilityFilter::from_config(&crate::config::AgentConfig::default()),
        )
    }

    fn up(index: u32, name: &str) -> InterfaceDescriptor {
        InterfaceDescriptor::new(index, name, InterfaceFlags::up())
    }

    fn host() -> Vec<InterfaceDescriptor> {
        vec![
            InterfaceDescriptor::new(1, "lo", InterfaceFlags::loopback()),
            up(2, "eth0"),
            up(3, "veth123"),
        ]
    }

    struct BrokenSource;

    impl InterfaceSource for BrokenSource {
        fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>> {
            Err(Error::Discovery("netlink 不可用".to_string()))
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_scenario_egress_only_then_terminate() {
        let mut controller = controller(FakeBackend::new(), HookTarget::Egress);
        let token = CancellationToken::new();
        token.cancel();

        controller.run(&host(), token).await.unwrap();

        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert!(controller.registry().is_empty());
        let backend = controller.driver().backend();
        assert_eq!(backend.live_resources(), 0);
        assert!(backend.calls.contains(&"attach eth0 egress".to_string()));
        assert!(!backend.calls.iter().any(|c| c.contains("lo") || c.contains("veth")));
    }

    #[test]
    fn test_scenario_both_with_egress_failure() {
        let backend = FakeBackend::new().failing_attach("eth1", HookDirection::Egress);
        let mut controller = controller(backend, HookTarget::Both);

        let attached = controller.start(&vec![up(2, "eth0"), up(3, "eth1")]).unwrap();

        assert_eq!(attached, 1);
        assert_eq!(controller.state(), LifecycleState::Running);
        assert_eq!(controller.registry().names(), vec!["eth0"]);
        let backend = controller.driver().backend();
        assert_eq!(
            backend.attached_directions("eth0"),
            vec![HookDirection::Egress, HookDirection::Ingress]
        );
        // eth1 回滚后不留任何资源
        assert!(backend.attached_directions("eth1").is_empty());
        assert!(!backend.qdiscs.contains("eth1"));
    }

    #[test]
    fn test_scenario_reverse_drain_order() {
        let mut controller = controller(FakeBackend::new(), HookTarget::Egress);
        controller
            .start(&vec![up(2, "eth0"), up(3, "eth1"), up(4, "ens5")])
            .unwrap();

        let report = controller.drain();

        assert_eq!(report.detached, vec!["ens5", "eth1", "eth0"]);
        assert!(report.failed.is_empty());
        assert_eq!(controller.driver().backend().live_resources(), 0);
    }

    #[test]
    fn test_no_eligible_interfaces() {
        let mut controller = controller(FakeBackend::new(), HookTarget::Egress);
        let source = vec![
            InterfaceDescriptor::new(1, "lo", InterfaceFlags::loopback()),
            up(3, "docker0"),
        ];

        let err = controller.start(&source).unwrap_err();
        assert!(matches!(err, Error::NoEligibleInterfaces));
        assert!(controller.driver().backend().calls.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_zero_attached_is_fatal() {
        let backend = FakeBackend::new().failing_qdisc("eth0").failing_qdisc("eth1");
        let mut controller = controller(backend, HookTarget::Egress);

        let err = controller
            .run(&vec![up(2, "eth0"), up(3, "eth1")], CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoInterfacesAttached));
        assert!(controller.registry().is_empty());
        assert_ne!(controller.state(), LifecycleState::Running);
        assert_eq!(controller.driver().backend().live_resources(), 0);
    }

    #[test]
    fn test_discovery_failure_is_fatal() {
        let mut controller = controller(FakeBackend::new(), HookTarget::Egress);
        let err = controller.start(&BrokenSource).unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[test]
    fn test_drain_is_idempotent() {
        let mut controller = controller(FakeBackend::new(), HookTarget::Both);
        controller.start(&vec![up(2, "eth0")]).unwrap();

        let first = controller.drain();
        assert_eq!(first.detached, vec!["eth0"]);

        let calls = controller.driver().backend().calls.len();
        let second = controller.drain();
        assert!(second.is_empty());
        assert_eq!(controller.driver().backend().calls.len(), calls);
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_detach_failure_does_not_block_others() {
        let backend = FakeBackend::new().failing_detach("eth0");
        let mut controller = controller(backend, HookTarget::Egress);
        controller
            .start(&vec![up(2, "eth0"), up(3, "eth1")])
            .unwrap();

        let report = controller.drain();

        assert_eq!(report.detached, vec!["eth1"]);
        assert_eq!(report.failed, vec!["eth0"]);
        assert!(controller.registry().is_empty());
        assert_eq!(controller.state(), LifecycleState::Stopped);
        // qdisc 删除仍然执行
        assert!(controller.driver().backend().qdiscs.is_empty());
    }

    #[test]
    fn test_duplicate_discovery_is_fatal() {
        let mut controller = controller(FakeBackend::new(), HookTarget::Egress);
        let source = vec![up(2, "eth0"), up(3, "eth1"), up(2, "eth0")];

        let err = controller.start(&source).unwrap_err();

        assert!(matches!(err, Error::DuplicateRegistration(ref name) if name == "eth0"));
        assert!(controller.registry().is_empty());
        assert_eq!(controller.state(), LifecycleState::Stopped);

        // 重复的接口没有再次经过驱动，已登记的挂载被完整卸载
        let backend = controller.driver().backend();
        let touched = |call: &str| backend.calls.iter().filter(|c| *c == call).count();
        assert_eq!(touched("stale eth0"), 1);
        assert_eq!(touched("attach eth0 egress"), 1);
        assert_eq!(touched("detach eth0 egress"), 1);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_running_until_terminated() {
        let mut controller = controller(FakeBackend::new(), HookTarget::Egress);
        let source = vec![up(2, "eth0"), up(3, "eth1")];
        let token = CancellationToken::new();

        {
            let run = controller.run(&source, token.clone());
            tokio::pin!(run);

            // 没有退出请求时保持运行
            let waiting =
                tokio::time::timeout(std::time::Duration::from_millis(50), &mut run).await;
            assert!(waiting.is_err());

            token.cancel();
            run.await.unwrap();
        }

        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert!(controller.registry().is_empty());
        let backend = controller.driver().backend();
        assert_eq!(backend.live_resources(), 0);
        assert!(backend.calls.contains(&"detach eth1 egress".to_string()));
        assert!(backend.calls.contains(&"detach eth0 egress".to_string()));
        assert!(backend.calls.contains(&"remove eth0".to_string()));
        assert!(backend.calls.contains(&"remove eth1".to_string()));
    }

    #[test]
    fn test_allowlisted_down_interface_never_reaches_driver() {
        let mut controller = LifecycleController::new(
            HookDriver::new(FakeBackend::new(), HookTarget::Egress, QdiscPolicy::Reset),
            EligibilityFilter::new(Vec::new(), vec!["eth1".to_string()]),
        );
        let source = vec![
            up(2, "eth0"),
            InterfaceDescriptor::new(3, "eth1", InterfaceFlags::default()),
        ];

        assert!(matches!(
            controller.start(&source),
            Err(Error::NoEligibleInterfaces)
        ));
        assert!(controller.driver().backend().calls.is_empty());
    }
}
