//! 经典蓝牙音频桥协调器
//!
//! 道具的扬声器走的是独立的经典蓝牙（A2DP）端点，平时不广播。
//! 在已认证的 BLE 链路上发送一段固定系统命令序列后，设备才开始
//! 以 `<名称>(Live)` 广播第二个 MAC，随后用固定 PIN 配对即可推流。
//!
//! 序列（顺序与步进等待都是固件要求，不可调换）：
//! 预设查询 → 初始化 → 预设确认 → 再初始化 → live 装配 → 录音触发。
//!
//! 不变量：音频桥只有在所属 BLE 链路 Ready 期间才允许处于
//! Paired/Streaming；链路一掉，监视任务立刻把桥打到 Aborted。
//! 配对失败不影响 BLE 控制通路，只是音频不可用。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use skelly_ble::GattLink;
use skelly_driver::{CommandRequest, DeviceState, SkellyConnection};
use skelly_protocol::{Command, SystemCommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// 音频桥状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioBridgeState {
    /// 尚未配对
    #[default]
    Unpaired,
    /// 启用序列已完成，配对进行中
    Pairing,
    /// 配对完成，可以推流
    Paired,
    /// 正在推流
    Streaming,
    /// BLE 链路丢失，桥被强制中止
    Aborted,
}

/// 音频桥配置
#[derive(Debug, Clone)]
pub struct AudioBridgeConfig {
    /// 经典蓝牙端点 MAC（与 BLE 控制接口不同）
    pub audio_address: String,
    /// 配对 PIN
    pub pin: String,
    /// 设备广播名后缀（启用后出现）
    pub name_suffix: String,
    /// 序列各步写入后的静候时间
    pub step_settle: Duration,
    /// 录音触发后的静候时间（设备需要时间开始广播）
    pub record_settle: Duration,
    /// 启用失败后的重试上限（含重连）
    pub retry_ceiling: u32,
}

impl Default for AudioBridgeConfig {
    fn default() -> Self {
        Self {
            audio_address: "24:F4:95:F4:CA:45".to_string(),
            pin: "1234".to_string(),
            name_suffix: "(Live)".to_string(),
            step_settle: Duration::from_millis(500),
            record_settle: Duration::from_secs(2),
            retry_ceiling: 3,
        }
    }
}

/// 经典蓝牙端点对应的 PulseAudio sink 名
///
/// 配对成功后音频路由要用到，如 `bluez_output.24_F4_95_F4_CA_45.1`。
pub fn pulse_sink_name(audio_address: &str) -> String {
    format!("bluez_output.{}.1", audio_address.replace(':', "_"))
}

/// 经典蓝牙配对器抽象
///
/// 生产实现驱动 `bluetoothctl`（Linux），测试注入 mock。
pub trait Pairer: Send + Sync + 'static {
    /// 用 `pin` 与 `address` 配对并建立连接
    fn pair(&self, address: &str, pin: &str)
    -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// 启用序列：命令 + 各步静候
fn enable_sequence(config: &AudioBridgeConfig) -> [(SystemCommand, Duration); 6] {
    [
        (SystemCommand::PresetQuery, config.step_settle),
        (SystemCommand::Initialize, config.step_settle),
        (SystemCommand::PresetConfirm, config.step_settle),
        (SystemCommand::Initialize, config.step_settle),
        (SystemCommand::LiveSetup, config.step_settle),
        (SystemCommand::RecordTrigger, config.record_settle),
    ]
}

/// 音频桥协调器
pub struct AudioCoordinator {
    config: AudioBridgeConfig,
    state: Arc<watch::Sender<AudioBridgeState>>,
    /// 启用会话世代号：旧连接上的监视任务不得中止新会话
    session_gen: Arc<AtomicU64>,
}

impl AudioCoordinator {
    pub fn new(config: AudioBridgeConfig) -> Self {
        let (state_tx, _) = watch::channel(AudioBridgeState::default());
        Self {
            config,
            state: Arc::new(state_tx),
            session_gen: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 当前桥状态
    pub fn state(&self) -> AudioBridgeState {
        *self.state.borrow()
    }

    /// 订阅桥状态变化
    pub fn watch(&self) -> watch::Receiver<AudioBridgeState> {
        self.state.subscribe()
    }

    /// 配置
    pub fn config(&self) -> &AudioBridgeConfig {
        &self.config
    }

    /// 在已就绪的连接上启用音频桥
    ///
    /// 依次写入启用序列并发起配对。任何一步时链路掉线都会把桥
    /// 打到 [`AudioBridgeState::Aborted`]；配对自身的失败把桥退回
    /// [`AudioBridgeState::Unpaired`] 并上抛，BLE 控制不受影响。
    pub async fn enable<L: GattLink, P: Pairer>(
        &self,
        connection: &SkellyConnection<L>,
        pairer: &P,
    ) -> Result<(), ClientError> {
        if !connection.is_ready() {
            return Err(ClientError::NotReady);
        }

        let generation = self.session_gen.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(AudioBridgeState::Unpaired);
        self.spawn_abort_watcher(connection.watch_state(), generation);

        info!("enabling Classic BT audio mode");
        for (command, settle) in enable_sequence(&self.config) {
            let request = CommandRequest::routine(Command::System(command)).with_settle(settle);
            if let Err(e) = connection.execute(request).await {
                warn!("audio enable sequence failed at {command:?}: {e}");
                self.state.send_replace(AudioBridgeState::Aborted);
                return Err(e.into());
            }
        }

        info!(
            suffix = %self.config.name_suffix,
            address = %self.config.audio_address,
            "device advertising Classic BT endpoint"
        );
        self.state.send_replace(AudioBridgeState::Pairing);

        match pairer.pair(&self.config.audio_address, &self.config.pin).await {
            Ok(()) => {
                // 配对期间链路可能已经没了，Paired 只允许在 Ready 下出现
                if !connection.is_ready() {
                    self.state.send_replace(AudioBridgeState::Aborted);
                    return Err(ClientError::AudioAborted);
                }
                self.state.send_replace(AudioBridgeState::Paired);
                info!(sink = %pulse_sink_name(&self.config.audio_address), "Classic BT audio paired");
                Ok(())
            },
            Err(e) => {
                warn!("Classic BT pairing failed: {e}");
                self.state.send_replace(AudioBridgeState::Unpaired);
                Err(e)
            },
        }
    }

    /// 标记推流开始（仅允许从 Paired 进入）
    pub fn mark_streaming(&self) -> Result<(), ClientError> {
        let mut switched = false;
        self.state.send_if_modified(|state| {
            if *state == AudioBridgeState::Paired {
                *state = AudioBridgeState::Streaming;
                switched = true;
                true
            } else {
                false
            }
        });

        if switched { Ok(()) } else { Err(ClientError::AudioAborted) }
    }

    /// 链路状态监视：离开 Ready 的瞬间强制中止音频桥
    fn spawn_abort_watcher(
        &self,
        mut device: watch::Receiver<DeviceState>,
        generation: u64,
    ) {
        let state = self.state.clone();
        let session_gen = self.session_gen.clone();

        tokio::spawn(async move {
            loop {
                let ready = device.borrow_and_update().is_ready();
                if !ready {
                    break;
                }
                // changed() 出错说明连接句柄整个被拆除，同样视作断链
                if device.changed().await.is_err() {
                    break;
                }
            }

            // 只允许中止自己这一代的会话
            if session_gen.load(Ordering::SeqCst) != generation {
                debug!("stale audio watcher, ignoring link drop");
                return;
            }

            let aborted = state.send_if_modified(|bridge| match bridge {
                AudioBridgeState::Pairing
                | AudioBridgeState::Paired
                | AudioBridgeState::Streaming => {
                    *bridge = AudioBridgeState::Aborted;
                    true
                },
                _ => false,
            });
            if aborted {
                warn!("BLE link lost, audio bridge aborted");
            }
        });
    }
}

// ============================================================================
// bluetoothctl 配对器（Linux）
// ============================================================================

/// `bluetoothctl` 驱动的配对器
///
/// 经典蓝牙端点刚开始广播时经常要扫两轮才会出现在缓存里，
/// 流程沿用实测可行的"双扫描"：扫描 → 停 → 再扫描 → 停 → 配对 →
/// 连接 → 信任。
#[cfg(target_os = "linux")]
pub struct BluetoothctlPairer {
    /// 第一轮扫描时长
    pub first_scan: Duration,
    /// 第二轮扫描时长
    pub second_scan: Duration,
    /// pair 命令超时
    pub pair_timeout: Duration,
    /// connect 命令超时
    pub connect_timeout: Duration,
}

#[cfg(target_os = "linux")]
impl Default for BluetoothctlPairer {
    fn default() -> Self {
        Self {
            first_scan: Duration::from_secs(15),
            second_scan: Duration::from_secs(10),
            pair_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(target_os = "linux")]
impl BluetoothctlPairer {
    /// 清理历史配对（设备每次重新广播都换会话密钥，旧配对必须先移除）
    pub async fn remove_stale_pairing(&self, address: &str) -> Result<(), ClientError> {
        let _ = run_bluetoothctl(&["disconnect", address], None, Duration::from_secs(10)).await;
        let output =
            run_bluetoothctl(&["remove", address], None, Duration::from_secs(10)).await?;
        if output.contains("Device has been removed") || output.contains("not available") {
            debug!("stale pairing removed");
        }
        Ok(())
    }

    async fn scan_cycle(&self, duration: Duration) -> Result<(), ClientError> {
        let secs = duration.as_secs().max(1).to_string();
        let _ = run_bluetoothctl(
            &["--timeout", &secs, "scan", "on"],
            None,
            duration + Duration::from_secs(5),
        )
        .await?;
        let _ = run_bluetoothctl(&["scan", "off"], None, Duration::from_secs(5)).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl Pairer for BluetoothctlPairer {
    async fn pair(&self, address: &str, pin: &str) -> Result<(), ClientError> {
        debug!(%address, "starting Classic BT dual-scan pairing");
        self.scan_cycle(self.first_scan).await?;
        self.scan_cycle(self.second_scan).await?;

        let pair_output = run_bluetoothctl(
            &["pair", address],
            Some(&format!("{pin}\n")),
            self.pair_timeout,
        )
        .await?;
        let connect_output =
            run_bluetoothctl(&["connect", address], None, self.connect_timeout).await?;
        let _ = run_bluetoothctl(&["trust", address], None, Duration::from_secs(5)).await;

        let combined = format!("{pair_output}\n{connect_output}");
        if combined.contains("Pairing successful")
            || combined.contains("Already paired")
            || combined.contains("Connection successful")
        {
            Ok(())
        } else {
            Err(ClientError::PairingRejected)
        }
    }
}

/// 跑一条 bluetoothctl 命令并收集输出
#[cfg(target_os = "linux")]
async fn run_bluetoothctl(
    args: &[&str],
    input: Option<&str>,
    timeout: Duration,
) -> Result<String, ClientError> {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command as Process;

    let mut command = Process::new("bluetoothctl");
    command
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ClientError::PairingUnavailable("bluetoothctl not found, install bluez-utils".into())
        } else {
            ClientError::PairingUnavailable(e.to_string())
        }
    })?;

    if let (Some(text), Some(stdin)) = (input, child.stdin.as_mut()) {
        let _ = stdin.write_all(text.as_bytes()).await;
    }
    // 关闭 stdin，否则交互式 bluetoothctl 不退出
    drop(child.stdin.take());

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ClientError::PairingTimeout)?
        .map_err(|e| ClientError::PairingUnavailable(e.to_string()))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}
