//! 退出信号
//!
//! 独立任务等待 SIGINT/SIGTERM，收到后取消 `CancellationToken`。
//! 该任务不接触任何内核状态，卸载由生命周期控制器完成。

use std::io;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// SIGINT/SIGTERM 监听器
pub struct SignalListener {
    interrupt: Signal,
    terminate: Signal,
}

impl SignalListener {
    /// 注册信号处理，需在启动挂载之前调用
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// 在后台等待信号，第一次收到时取消 `token`
    pub fn spawn(mut self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    received = self.interrupt.recv() => match received {
                        Some(()) => "SIGINT",
                        None => break,
                    },
                    received = self.terminate.recv() => match received {
                        Some(()) => "SIGTERM",
                        None => break,
                    },
                };

                if token.is_cancelled() {
                    warn!("收到 {}，正在卸载中，忽略", name);
                } else {
                    info!("收到 {}，开始卸载", name);
                    token.cancel();
                }
            }
        })
    }
}
