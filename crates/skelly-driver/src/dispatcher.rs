//! 命令调度泵
//!
//! 单写者队列：所有出站写入都经过唯一一个泵任务——固件假定输入
//! 严格串行且限速，任何时刻不允许两条命令同时在途。
//!
//! 优先级调度沿用"邮箱 + 队列"结构：
//! - **立即邮箱**（容量 1，新者胜）：动作切换用，插到常规队列前面
//! - **常规队列**（FIFO，有界）：灯光、眼睛、系统命令
//!
//! 每写完一条命令，泵强制睡满节流下限再取下一条。立即命令只是
//! 插队，**绝不**绕过节流。写入失败做有界重试，重试耗尽后丢弃
//! 该命令并通过回执上报，不阻塞后续命令。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use skelly_ble::{BleError, GattLink};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::command::QueuedCommand;
use crate::error::DriverError;
use crate::state::DeviceState;

/// 调度配置
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// 节流下限：相邻两次写入之间的最小间隔（合理区间 300-500ms）
    pub pacing_floor: Duration,
    /// 单条命令的写入重试次数（不含首次尝试）
    pub write_retries: u32,
    /// 写入重试间隔
    pub write_backoff: Duration,
    /// 常规队列容量
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pacing_floor: Duration::from_millis(400),
            write_retries: 3,
            write_backoff: Duration::from_millis(50),
            queue_capacity: 32,
        }
    }
}

/// 调度器的提交端集合（由连接句柄持有）
pub(crate) struct DispatcherChannels {
    pub immediate_slot: Arc<Mutex<Option<QueuedCommand>>>,
    pub immediate_notify: Arc<Notify>,
    pub routine_tx: mpsc::Sender<QueuedCommand>,
}

/// 启动调度泵任务
pub(crate) fn spawn_pump<L: GattLink>(
    link: Arc<L>,
    state_rx: watch::Receiver<DeviceState>,
    config: DispatcherConfig,
) -> (DispatcherChannels, JoinHandle<()>) {
    let immediate_slot: Arc<Mutex<Option<QueuedCommand>>> = Arc::new(Mutex::new(None));
    let immediate_notify = Arc::new(Notify::new());
    let (routine_tx, routine_rx) = mpsc::channel(config.queue_capacity);

    let channels = DispatcherChannels {
        immediate_slot: immediate_slot.clone(),
        immediate_notify: immediate_notify.clone(),
        routine_tx,
    };

    let task = tokio::spawn(pump_loop(
        link,
        immediate_slot,
        immediate_notify,
        routine_rx,
        state_rx,
        config,
    ));

    (channels, task)
}

/// 泵主循环
async fn pump_loop<L: GattLink>(
    link: Arc<L>,
    immediate_slot: Arc<Mutex<Option<QueuedCommand>>>,
    immediate_notify: Arc<Notify>,
    mut routine_rx: mpsc::Receiver<QueuedCommand>,
    state_rx: watch::Receiver<DeviceState>,
    config: DispatcherConfig,
) {
    loop {
        // 优先级调度：先看立即邮箱，再等常规队列
        let taken = immediate_slot.lock().take();
        let cmd = match taken {
            Some(cmd) => cmd,
            None => {
                tokio::select! {
                    biased;
                    _ = immediate_notify.notified() => continue,
                    maybe = routine_rx.recv() => match maybe {
                        Some(cmd) => cmd,
                        // 所有提交端都没了，泵退出
                        None => break,
                    },
                }
            },
        };

        // 闸门复查：提交后链路可能已经掉线/降级
        let state = *state_rx.borrow();
        if !state.is_ready() {
            let err = if state.is_linked() {
                DriverError::NotAuthenticated
            } else {
                DriverError::ConnectionLost
            };
            debug!(%state, "dropping queued command, gate closed");
            let _ = cmd.done.send(Err(err));
            // 没碰总线，不烧节流额度
            continue;
        }

        let result = write_with_retries(link.as_ref(), &cmd, &config).await;
        let wrote = result.is_ok();
        let settle = cmd.settle;
        let _ = cmd.done.send(result);

        if wrote && let Some(settle) = settle {
            tokio::time::sleep(settle).await;
        }

        // 节流下限：写入尝试（无论成败）都可能已触碰总线
        tokio::time::sleep(config.pacing_floor).await;
    }

    trace!("dispatcher pump exited");
}

/// 有界重试写入
async fn write_with_retries<L: GattLink>(
    link: &L,
    cmd: &QueuedCommand,
    config: &DispatcherConfig,
) -> Result<(), DriverError> {
    let attempts = config.write_retries + 1;

    for attempt in 1..=attempts {
        match link.write_command(cmd.frame.bytes()).await {
            Ok(()) => {
                trace!(frame = %cmd.frame, attempt, "frame written");
                return Ok(());
            },
            // 链路断开没有重试的意义
            Err(BleError::Dropped) => {
                warn!(frame = %cmd.frame, "link dropped mid-write");
                return Err(DriverError::ConnectionLost);
            },
            Err(e) => {
                warn!(frame = %cmd.frame, attempt, attempts, "write failed: {e}");
                if attempt < attempts {
                    tokio::time::sleep(config.write_backoff).await;
                }
            },
        }
    }

    Err(DriverError::WriteFailed { attempts })
}
