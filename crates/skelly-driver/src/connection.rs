//! 连接管理器
//!
//! 独占持有一条 BLE 链路的完整生命周期：建链 → 认证 → 解锁调度 →
//! 断链感知 → 拆除。设备状态通过 `watch` 通道对外发布，所有组件
//! （包括经典蓝牙音频协调器）以只读方式观察，不存在全局可变状态。

use std::sync::Arc;

use parking_lot::Mutex;
use skelly_ble::{GattLink, LinkEvents, LinkFactory};
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{self, AuthConfig};
use crate::backoff::BackoffPolicy;
use crate::command::{CommandPriority, CommandRequest, CommandTicket, QueuedCommand};
use crate::dispatcher::{self, DispatcherChannels, DispatcherConfig};
use crate::error::DriverError;
use crate::router::{self, StatusBook, StatusSnapshot};
use crate::state::DeviceState;

/// 认证握手收件箱容量
const AUTH_INBOX_CAPACITY: usize = 8;

/// 连接配置
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// 认证配置
    pub auth: AuthConfig,
    /// 调度配置
    pub dispatcher: DispatcherConfig,
}

/// 活动连接句柄
///
/// 每个道具同一时刻至多一个实例；显式按值传递给需要它的组件，
/// 不做任何隐藏的全局单例。
pub struct SkellyConnection<L: GattLink> {
    link: Arc<L>,
    state_tx: Arc<watch::Sender<DeviceState>>,
    status: Arc<StatusBook>,
    immediate_slot: Arc<Mutex<Option<QueuedCommand>>>,
    immediate_notify: Arc<Notify>,
    routine_tx: mpsc::Sender<QueuedCommand>,
    pump_task: JoinHandle<()>,
    router_task: JoinHandle<()>,
}

impl<L: GattLink> SkellyConnection<L> {
    /// 通过链路工厂建立连接（扫描、建链、订阅、认证一条龙）
    ///
    /// 认证失败对当前会话是终局的：链路被断开、状态回到
    /// [`DeviceState::Disconnected`]，错误原样上抛。
    pub async fn establish<F>(factory: &F, config: &ConnectionConfig) -> Result<Self, DriverError>
    where
        F: LinkFactory<Link = L>,
    {
        let (state_tx, state_rx) = watch::channel(DeviceState::Connecting);
        let state_tx = Arc::new(state_tx);

        let (link, events) = match factory.open().await {
            Ok(pair) => pair,
            Err(e) => {
                state_tx.send_replace(DeviceState::Disconnected);
                return Err(e.into());
            },
        };
        let link = Arc::new(link);
        let LinkEvents {
            notifications,
            connected,
        } = events;

        state_tx.send_replace(DeviceState::Connected);

        // 路由器先于认证启动，认证应答不能丢
        let status = Arc::new(StatusBook::new());
        let (auth_tx, mut auth_rx) = mpsc::channel(AUTH_INBOX_CAPACITY);
        let router_task = router::spawn_router(
            notifications,
            auth_tx,
            status.clone(),
            state_rx.clone(),
        );

        state_tx.send_replace(DeviceState::Authenticating);
        match auth::authenticate(link.as_ref(), &mut auth_rx, &config.auth).await {
            Ok(outcome) => {
                debug!(
                    attempts = outcome.attempts,
                    state = ?outcome.state,
                    "authentication complete"
                );
            },
            Err(e) => {
                warn!("authentication failed, tearing down link: {e}");
                state_tx.send_replace(DeviceState::Disconnected);
                let _ = link.disconnect().await;
                router_task.abort();
                return Err(e);
            },
        }
        state_tx.send_replace(DeviceState::Ready);
        info!("device ready");

        spawn_drop_monitor(connected, state_tx.clone());

        let (channels, pump_task) =
            dispatcher::spawn_pump(link.clone(), state_rx, config.dispatcher.clone());
        let DispatcherChannels {
            immediate_slot,
            immediate_notify,
            routine_tx,
        } = channels;

        Ok(Self {
            link,
            state_tx,
            status,
            immediate_slot,
            immediate_notify,
            routine_tx,
            pump_task,
            router_task,
        })
    }

    /// 带退避的重连
    ///
    /// 按策略逐次重试 [`SkellyConnection::establish`]，全部失败后
    /// 返回最后一次的错误。
    pub async fn establish_with_backoff<F>(
        factory: &F,
        config: &ConnectionConfig,
        policy: &BackoffPolicy,
    ) -> Result<Self, DriverError>
    where
        F: LinkFactory<Link = L>,
    {
        let mut last_err = match Self::establish(factory, config).await {
            Ok(connection) => return Ok(connection),
            Err(e) => e,
        };

        for (attempt, delay) in policy.delays().enumerate() {
            warn!(attempt = attempt + 1, ?delay, "reconnect attempt failed: {last_err}");
            tokio::time::sleep(delay).await;

            match Self::establish(factory, config).await {
                Ok(connection) => return Ok(connection),
                Err(e) => last_err = e,
            }
        }

        Err(last_err)
    }

    /// 当前设备状态
    pub fn state(&self) -> DeviceState {
        *self.state_tx.borrow()
    }

    /// 订阅设备状态变化
    pub fn watch_state(&self) -> watch::Receiver<DeviceState> {
        self.state_tx.subscribe()
    }

    /// 是否可以下发命令
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// 状态记账快照（最近通知、计数）
    pub fn status(&self) -> Arc<StatusSnapshot> {
        self.status.load()
    }

    /// 提交一条命令，立刻返回回执
    ///
    /// 闸门检查在这里同步完成：认证未通过的提交直接失败，
    /// 一个字节也不会到达传输层。立即命令走邮箱（新者胜，被覆盖的
    /// 旧命令收到 [`DriverError::Superseded`] 回执），常规命令走
    /// FIFO 队列。
    pub fn submit(&self, request: CommandRequest) -> Result<CommandTicket, DriverError> {
        let state = self.state();
        if !state.is_ready() {
            return Err(if state.is_linked() {
                DriverError::NotAuthenticated
            } else {
                DriverError::ConnectionLost
            });
        }

        let frame = request.command.encode()?;
        let (done_tx, done_rx) = oneshot::channel();
        let queued = QueuedCommand {
            frame,
            settle: request.settle,
            done: done_tx,
        };

        match request.priority {
            CommandPriority::Immediate => {
                let superseded = self.immediate_slot.lock().replace(queued);
                if let Some(old) = superseded {
                    let _ = old.done.send(Err(DriverError::Superseded));
                }
                self.immediate_notify.notify_one();
            },
            CommandPriority::Routine => {
                self.routine_tx.try_send(queued).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => DriverError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => DriverError::ChannelClosed,
                })?;
            },
        }

        Ok(CommandTicket { done: done_rx })
    }

    /// 提交并等待写入完成
    pub async fn execute(&self, request: CommandRequest) -> Result<(), DriverError> {
        self.submit(request)?.wait().await
    }

    /// 断开连接（幂等）
    ///
    /// 泵和路由任务被终止，尚未写出的命令回执统一收到
    /// [`DriverError::ConnectionLost`]。
    pub async fn disconnect(&self) -> Result<(), DriverError> {
        self.state_tx.send_replace(DeviceState::Disconnected);
        self.pump_task.abort();
        self.router_task.abort();

        // 邮箱里残留的立即命令同样按链路丢失上报
        if let Some(pending) = self.immediate_slot.lock().take() {
            let _ = pending.done.send(Err(DriverError::ConnectionLost));
        }

        self.link.disconnect().await?;
        Ok(())
    }
}

/// 断链监视：链路存活标志翻转为 false 时立刻把设备状态打回
/// Disconnected，让调度闸门和音频协调器在同一个通知周期内感知。
fn spawn_drop_monitor(
    mut connected: watch::Receiver<bool>,
    state_tx: Arc<watch::Sender<DeviceState>>,
) {
    tokio::spawn(async move {
        while connected.changed().await.is_ok() {
            if !*connected.borrow() {
                warn!("BLE link lost, marking device disconnected");
                state_tx.send_replace(DeviceState::Disconnected);
                break;
            }
        }
    });
}

#[cfg(feature = "btleplug-backend")]
impl SkellyConnection<skelly_ble::BtleplugLink> {
    /// 扫描并连接真实设备（btleplug 后端）
    pub async fn connect(
        target: &skelly_ble::DeviceTarget,
        link_config: &skelly_ble::LinkConfig,
        config: &ConnectionConfig,
    ) -> Result<Self, DriverError> {
        let factory =
            skelly_ble::BtleplugFactory::new(target.clone(), link_config.clone());
        Self::establish(&factory, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{auto_ack, ready_mock_connection, single_use_factory};
    use skelly_ble::{BleError, MockController, MockLink};
    use skelly_protocol::{Command, Movement};
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    async fn ready_connection() -> (SkellyConnection<MockLink>, Arc<MockController>) {
        ready_mock_connection(&ConnectionConfig::default()).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_reaches_ready() {
        let (connection, _controller) = ready_connection().await;
        assert!(connection.is_ready());
        assert_eq!(connection.state(), DeviceState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_timeout_tears_down_connection() {
        let (link, events, _controller) = MockLink::new();
        let factory = single_use_factory(link, events);

        let result = SkellyConnection::establish(&factory, &ConnectionConfig::default()).await;
        assert!(matches!(result, Err(DriverError::AuthTimeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_auth_writes_only_auth_payload() {
        let (link, events, controller) = MockLink::new();
        let controller = Arc::new(controller);

        // 不应答认证，让握手超时失败
        let factory = single_use_factory(link, events);
        let result = SkellyConnection::establish(&factory, &ConnectionConfig::default()).await;
        assert!(result.is_err());

        // 整个过程中写入的只有认证载荷本身
        let payloads = controller.written_payloads().await;
        assert!(!payloads.is_empty());
        assert!(payloads.iter().all(|p| p == skelly_protocol::AUTH_PAYLOAD));
    }

    #[tokio::test(start_paused = true)]
    async fn test_movement_command_flows_to_link() {
        let (connection, controller) = ready_connection().await;

        connection
            .execute(CommandRequest::immediate(Command::Movement(Movement::Head)))
            .await
            .unwrap();

        let payloads = controller.written_payloads().await;
        let expected = Command::Movement(Movement::Head).encode().unwrap();
        assert_eq!(payloads.last().unwrap(), expected.bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_drop_degrades_state_and_fails_submissions() {
        let (connection, controller) = ready_connection().await;
        let mut state_rx = connection.watch_state();

        controller.drop_link();
        // 断链监视在一个通知周期内翻转状态
        tokio::time::timeout(Duration::from_secs(1), async {
            while *state_rx.borrow_and_update() != DeviceState::Disconnected {
                state_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("state did not degrade after link drop");

        assert!(matches!(
            connection.submit(CommandRequest::routine(Command::Movement(Movement::Head))),
            Err(DriverError::ConnectionLost)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent() {
        let (connection, _controller) = ready_connection().await;

        connection.disconnect().await.unwrap();
        connection.disconnect().await.unwrap();
        assert_eq!(connection.state(), DeviceState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_with_backoff_eventually_succeeds() {
        let (link, events, controller) = MockLink::new();
        let controller = Arc::new(controller);
        auto_ack(controller.clone());

        // 前两次 open 失败，第三次交出真实链路
        let slot = AsyncMutex::new(Some((link, events)));
        let failures = std::sync::atomic::AtomicU32::new(2);
        let factory = move || {
            if failures
                .fetch_update(
                    std::sync::atomic::Ordering::SeqCst,
                    std::sync::atomic::Ordering::SeqCst,
                    |n| n.checked_sub(1),
                )
                .is_ok()
            {
                return Err(BleError::NotFound);
            }
            slot.try_lock()
                .ok()
                .and_then(|mut guard| guard.take())
                .ok_or(BleError::NotFound)
        };

        let policy = BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            max_attempts: 4,
        };
        let connection =
            SkellyConnection::establish_with_backoff(&factory, &ConnectionConfig::default(), &policy)
                .await
                .unwrap();
        assert!(connection.is_ready());
    }
}
