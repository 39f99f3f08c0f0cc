//! btleplug 后端
//!
//! 扫描、连接、服务发现、CCCD 订阅与断链监视。
//!
//! 平台差异备注：
//! - Linux (BlueZ) 在 connect 返回后 GATT 缓存尚未就绪，立刻做服务
//!   发现可能拿到空集，需要短暂等待。
//! - `org.bluez.Device1.Connect` 在设备不在范围内时可能无限阻塞，
//!   必须套硬超时。

use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::{
    BleDeviceError, BleDeviceErrorKind, BleError, DeviceTarget, GattLink, LinkConfig, LinkEvents,
    uuids,
};

/// 通知通道容量
///
/// 设备的应答频率很低（每条命令至多一两条状态通知），64 足够。
const NOTIFY_CHANNEL_CAPACITY: usize = 64;

impl From<btleplug::Error> for BleError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => BleError::Device(BleDeviceError::new(
                BleDeviceErrorKind::AccessDenied,
                "permission denied",
            )),
            btleplug::Error::DeviceNotFound => BleError::NotFound,
            btleplug::Error::NotConnected => BleError::Dropped,
            btleplug::Error::TimedOut(_) => BleError::Timeout,
            other => BleError::Device(BleDeviceError::new(
                BleDeviceErrorKind::Backend,
                other.to_string(),
            )),
        }
    }
}

/// 连接中途被取消（future 被 drop）时负责断开外设，
/// 避免残留半订阅状态占住设备。
struct DisconnectGuard {
    peripheral: Peripheral,
    armed: bool,
}

impl DisconnectGuard {
    fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            armed: true,
        }
    }

    /// 连接流程完整结束后解除武装
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            let peripheral = self.peripheral.clone();
            handle.spawn(async move {
                debug!("connect cancelled, releasing peripheral");
                let _ = peripheral.disconnect().await;
            });
        }
    }
}

/// btleplug GATT 链路
///
/// 由 [`BtleplugLink::connect`] 创建；写半部留在本结构体内，
/// 通知流与断链标志通过 [`LinkEvents`] 交给驱动层。
pub struct BtleplugLink {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
}

impl BtleplugLink {
    /// 扫描并连接目标设备
    ///
    /// 完整流程：扫描匹配 → connect（硬超时）→ 服务发现 →
    /// 特征值定位 → CCCD 订阅 → 启动通知转发与断链监视任务。
    ///
    /// 失败语义：
    /// - 扫描窗口内无命中 → [`BleError::NotFound`]
    /// - connect/发现超时 → [`BleError::Timeout`]
    /// - CCCD 订阅被拒 → [`BleError::SubscriptionFailed`]
    pub async fn connect(
        target: &DeviceTarget,
        config: &LinkConfig,
    ) -> Result<(Self, LinkEvents), BleError> {
        let adapter = default_adapter().await?;

        let peripheral = scan_for_target(&adapter, target, config.scan_timeout).await?;
        let mut guard = DisconnectGuard::new(peripheral.clone());

        tokio::time::timeout(config.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| BleError::Timeout)??;

        // BlueZ 在 connect 完成后才开始填充 GATT 缓存
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| BleError::Timeout)??;

        let find_char = |uuid: uuid::Uuid| -> Result<Characteristic, BleError> {
            peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == uuid)
                .ok_or_else(|| {
                    BleError::Device(BleDeviceError::new(
                        BleDeviceErrorKind::CharacteristicMissing,
                        format!("characteristic {uuid} not found"),
                    ))
                })
        };

        let write_char = find_char(uuids::WRITE_CHARACTERISTIC)?;
        let notify_char = find_char(uuids::NOTIFY_CHARACTERISTIC)?;

        // CCCD 订阅必须在认证之前完成，否则认证应答收不到
        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|_| BleError::SubscriptionFailed)?;

        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CHANNEL_CAPACITY);
        let (connected_tx, connected_rx) = watch::channel(true);

        spawn_notification_forwarder(&peripheral, notify_tx, connected_tx.clone()).await?;
        spawn_disconnect_watcher(&adapter, &peripheral, connected_tx);

        info!("BLE link established");
        guard.disarm();

        Ok((
            Self {
                peripheral,
                write_char,
                notify_char,
            },
            LinkEvents {
                notifications: notify_rx,
                connected: connected_rx,
            },
        ))
    }
}

/// btleplug 链路工厂
///
/// 持有扫描目标与超时配置，每次 `open` 都从扫描开始完整建链，
/// 因此同一个工厂可以反复用于重连。
pub struct BtleplugFactory {
    pub target: DeviceTarget,
    pub config: LinkConfig,
}

impl BtleplugFactory {
    pub fn new(target: DeviceTarget, config: LinkConfig) -> Self {
        Self { target, config }
    }
}

impl crate::LinkFactory for BtleplugFactory {
    type Link = BtleplugLink;

    async fn open(&self) -> Result<(BtleplugLink, LinkEvents), BleError> {
        BtleplugLink::connect(&self.target, &self.config).await
    }
}

impl GattLink for BtleplugLink {
    async fn write_command(&self, payload: &[u8]) -> Result<(), BleError> {
        self.peripheral
            .write(&self.write_char, payload, WriteType::WithoutResponse)
            .await
            .map_err(BleError::from)
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        // 退订失败无所谓，设备断开后 CCCD 状态自然失效
        let _ = self.peripheral.unsubscribe(&self.notify_char).await;
        match self.peripheral.disconnect().await {
            Ok(()) => Ok(()),
            // 已断开视为成功（幂等）
            Err(btleplug::Error::NotConnected) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 取第一个可用蓝牙适配器
async fn default_adapter() -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or_else(|| {
        BleError::Device(BleDeviceError::new(
            BleDeviceErrorKind::AdapterMissing,
            "no Bluetooth adapter found",
        ))
    })
}

/// 扫描直到命中目标或超时
///
/// 每 250ms 轮询一次已发现外设列表；按广播名子串优先、
/// MAC 地址兜底的规则匹配。
async fn scan_for_target(
    adapter: &Adapter,
    target: &DeviceTarget,
    scan_timeout: Duration,
) -> Result<Peripheral, BleError> {
    info!(?target, "scanning for prop ({:?} window)", scan_timeout);
    adapter.start_scan(ScanFilter::default()).await?;

    let result = tokio::time::timeout(scan_timeout, async {
        loop {
            let peripherals = adapter.peripherals().await.unwrap_or_default();
            for peripheral in peripherals {
                if let Ok(Some(props)) = peripheral.properties().await {
                    let address = props.address.to_string();
                    if target.matches(props.local_name.as_deref(), &address) {
                        info!(
                            name = props.local_name.as_deref().unwrap_or("<unnamed>"),
                            %address,
                            "found prop"
                        );
                        return peripheral;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await;

    adapter.stop_scan().await.ok();

    result.map_err(|_| BleError::NotFound)
}

/// 把通知特征值上的数据转发进 mpsc 通道
///
/// 转发任务本身不做任何解析，保序交给驱动层的路由器。
/// 通知流结束意味着链路断开，顺手翻转存活标志。
async fn spawn_notification_forwarder(
    peripheral: &Peripheral,
    notify_tx: mpsc::Sender<Vec<u8>>,
    connected_tx: watch::Sender<bool>,
) -> Result<(), BleError> {
    let mut notifications = peripheral.notifications().await?;

    tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            if notification.uuid != uuids::NOTIFY_CHARACTERISTIC {
                trace!(uuid = %notification.uuid, "ignoring notification from unrelated characteristic");
                continue;
            }
            trace!(payload = ?notification.value, "notification");
            if notify_tx.send(notification.value).await.is_err() {
                // 接收端（驱动层路由器）已关闭
                break;
            }
        }
        debug!("notification stream ended");
        let _ = connected_tx.send(false);
    });

    Ok(())
}

/// 监听适配器事件流，设备断开时立刻翻转存活标志
///
/// 比等通知流关闭更快感知断链（设备断电、超出范围等场景）。
fn spawn_disconnect_watcher(
    adapter: &Adapter,
    peripheral: &Peripheral,
    connected_tx: watch::Sender<bool>,
) {
    let adapter = adapter.clone();
    let peripheral_id = peripheral.id();

    tokio::spawn(async move {
        match adapter.events().await {
            Ok(mut events) => {
                while let Some(event) = events.next().await {
                    if let CentralEvent::DeviceDisconnected(id) = event
                        && id == peripheral_id
                    {
                        warn!("BLE link dropped");
                        let _ = connected_tx.send(false);
                        break;
                    }
                }
            },
            Err(e) => {
                warn!("disconnect watcher could not subscribe to adapter events: {e}");
            },
        }
    });
}
