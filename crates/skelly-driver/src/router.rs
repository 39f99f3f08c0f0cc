//! 通知路由
//!
//! 所有异步设备通知的唯一入口。路由器运行在自己的任务上，
//! 只做一次转发判断就立刻返回，绝不在行内做阻塞工作，
//! 从而既不拖慢 BLE 栈的事件投递，又保持到达顺序。
//!
//! 路由规则：
//! - 认证阶段（[`DeviceState::Authenticating`]）的通知交给握手收件箱
//! - 其余应答/状态字节记入 [`StatusBook`]，供调度器重试逻辑与诊断读取

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::state::DeviceState;

/// 最近一次设备状态通知的快照
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    /// 最近一条状态通知的原始负载
    pub last_payload: Option<Vec<u8>>,
    /// 累计收到的状态通知条数
    pub notify_count: u64,
}

/// 状态记账（ArcSwap 无锁读取）
///
/// 写入只发生在路由任务上，读取方拿到的是廉价的快照克隆。
pub struct StatusBook {
    snapshot: ArcSwap<StatusSnapshot>,
}

impl StatusBook {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(StatusSnapshot::default()),
        }
    }

    /// 记录一条状态通知
    pub(crate) fn record(&self, payload: Vec<u8>) {
        let current = self.snapshot.load();
        self.snapshot.store(Arc::new(StatusSnapshot {
            last_payload: Some(payload),
            notify_count: current.notify_count + 1,
        }));
    }

    /// 读取当前快照
    pub fn load(&self) -> Arc<StatusSnapshot> {
        self.snapshot.load_full()
    }
}

impl Default for StatusBook {
    fn default() -> Self {
        Self::new()
    }
}

/// 启动路由任务
///
/// 任务在通知通道关闭（链路断开或拆除）时自行退出。
pub(crate) fn spawn_router(
    mut notifications: mpsc::Receiver<Vec<u8>>,
    auth_tx: mpsc::Sender<Vec<u8>>,
    status: Arc<StatusBook>,
    state_rx: watch::Receiver<DeviceState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = notifications.recv().await {
            trace!(payload = %hex_preview(&payload), "notification routed");

            if *state_rx.borrow() == DeviceState::Authenticating {
                // try_send：握手收件箱极小，阻塞在这里会卡住后续通知
                let _ = auth_tx.try_send(payload);
            } else {
                status.record(payload);
            }
        }
        debug!("notification router exited");
    })
}

fn hex_preview(payload: &[u8]) -> String {
    payload.iter().map(|b| format!("{b:02x}")).collect()
}
