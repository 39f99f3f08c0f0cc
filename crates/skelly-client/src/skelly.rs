//! Skelly 门面
//!
//! 把连接句柄、动作跟踪、灯光去抖和音频协调器组合成一个对象。
//! 连接句柄放在读写锁里：日常操作并发读，重连时独占换新。

use std::sync::Arc;

use skelly_ble::LinkFactory;
use skelly_driver::{CommandRequest, DeviceState, SkellyConnection};
use skelly_protocol::{Command, EyeAnimation, Movement};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::audio::{AudioBridgeState, AudioCoordinator, Pairer};
use crate::config::SkellyConfig;
use crate::error::ClientError;
use crate::lighting::{LightRequest, LightTracker};
use crate::movement::{MovementPhase, MovementTracker, random_movement};

/// 骨架道具客户端
///
/// 通过 [`SkellyBuilder`]（真实设备）或 [`Skelly::connect_with`]
/// （自定义链路工厂，含测试）创建。
pub struct Skelly<F: LinkFactory> {
    factory: F,
    config: SkellyConfig,
    connection: RwLock<Arc<SkellyConnection<F::Link>>>,
    movement: MovementTracker,
    lights: LightTracker,
    audio: AudioCoordinator,
}

impl<F: LinkFactory> Skelly<F> {
    /// 用链路工厂建立连接并组装客户端
    pub async fn connect_with(factory: F, config: SkellyConfig) -> Result<Self, ClientError> {
        let connection = SkellyConnection::establish(&factory, &config.connection).await?;

        Ok(Self {
            movement: MovementTracker::new(config.movement_duration),
            lights: LightTracker::new(),
            audio: AudioCoordinator::new(config.audio.clone()),
            factory,
            config,
            connection: RwLock::new(Arc::new(connection)),
        })
    }

    async fn connection(&self) -> Arc<SkellyConnection<F::Link>> {
        self.connection.read().await.clone()
    }

    /// 设备是否就绪
    pub async fn is_ready(&self) -> bool {
        self.connection().await.is_ready()
    }

    /// 设备连接状态
    pub async fn device_state(&self) -> DeviceState {
        self.connection().await.state()
    }

    /// 当前动作会话相位
    pub fn movement_phase(&self) -> MovementPhase {
        self.movement.phase()
    }

    /// 执行一个动作（刷新/切换语义见 [`MovementTracker`]）
    pub async fn perform(&self, kind: Movement) -> Result<(), ClientError> {
        let connection = self.connection().await;
        self.movement.perform(connection.as_ref(), kind).await
    }

    /// 按权重随机执行一个动作，返回选中的动作
    pub async fn perform_random(&self) -> Result<Movement, ClientError> {
        let kind = random_movement();
        self.perform(kind).await?;
        Ok(kind)
    }

    /// 播放眼睛动画
    pub async fn play_eyes(&self, animation: EyeAnimation) -> Result<(), ClientError> {
        let connection = self.connection().await;
        connection
            .execute(CommandRequest::routine(Command::Eyes(animation)))
            .await?;
        Ok(())
    }

    /// 播放配置的默认眼睛动画
    pub async fn play_default_eyes(&self) -> Result<(), ClientError> {
        self.play_eyes(self.config.default_eye_animation).await
    }

    /// 应用一次灯光设置（只下发变化字段）
    pub async fn set_light(&self, request: LightRequest) -> Result<(), ClientError> {
        let connection = self.connection().await;
        self.lights.set_light(connection.as_ref(), request).await
    }

    /// 应用配置的默认灯光
    pub async fn apply_default_lights(&self) -> Result<(), ClientError> {
        self.set_light(self.config.default_lights).await
    }

    /// 当前音频桥状态
    pub fn audio_state(&self) -> AudioBridgeState {
        self.audio.state()
    }

    /// 订阅音频桥状态变化
    pub fn watch_audio(&self) -> tokio::sync::watch::Receiver<AudioBridgeState> {
        self.audio.watch()
    }

    /// 标记音频推流开始（仅允许从 Paired 进入）
    pub fn mark_streaming(&self) -> Result<(), ClientError> {
        self.audio.mark_streaming()
    }

    /// 启用经典蓝牙音频桥（带重连恢复）
    ///
    /// 链路掉线类失败先走驱动层的退避重连，再整段重跑启用序列，
    /// 次数由重试上限约束。配对自身被拒绝/超时不重试——BLE 控制
    /// 完好，重复配对不会有不同结果。
    pub async fn enable_audio<P: Pairer>(&self, pairer: &P) -> Result<(), ClientError> {
        let attempts = self.config.audio.retry_ceiling.max(1);

        for attempt in 1..=attempts {
            if !self.is_ready().await {
                info!(attempt, "BLE link down before audio enable, reconnecting");
                if let Err(e) = self.reconnect().await {
                    warn!(attempt, "reconnect failed: {e}");
                    continue;
                }
            }

            let connection = self.connection().await;
            match self.audio.enable(connection.as_ref(), pairer).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_pairing_failure() => return Err(e),
                Err(e) => {
                    warn!(attempt, attempts, "audio enable attempt failed: {e}");
                },
            }
        }

        Err(ClientError::AudioRetriesExhausted { attempts })
    }

    /// 重建 BLE 连接（拆旧链路、按退避策略建新链路、清灯光缓存）
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let mut guard = self.connection.write().await;
        let _ = guard.disconnect().await;

        let fresh = SkellyConnection::establish_with_backoff(
            &self.factory,
            &self.config.connection,
            &self.config.reconnect,
        )
        .await?;

        // 设备重启后回到默认灯光，缓存作废
        self.lights.reset();
        *guard = Arc::new(fresh);
        info!("BLE link re-established");
        Ok(())
    }

    /// 断开连接（幂等）
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.connection().await.disconnect().await?;
        Ok(())
    }

    /// 配置
    pub fn config(&self) -> &SkellyConfig {
        &self.config
    }
}

// ============================================================================
// Builder（真实设备入口）
// ============================================================================

/// Skelly Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use skelly_client::SkellyBuilder;
///
/// # async fn run() -> Result<(), skelly_client::ClientError> {
/// let skelly = SkellyBuilder::new()
///     .name("Animated Skelly")
///     .connect()
///     .await?;
/// skelly.perform_random().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "btleplug-backend")]
pub struct SkellyBuilder {
    target: skelly_ble::DeviceTarget,
    link: skelly_ble::LinkConfig,
    config: SkellyConfig,
}

#[cfg(feature = "btleplug-backend")]
impl SkellyBuilder {
    /// 创建新的 Builder（默认按广播名匹配）
    pub fn new() -> Self {
        Self {
            target: skelly_ble::DeviceTarget::by_name(crate::config::DEFAULT_DEVICE_NAME),
            link: skelly_ble::LinkConfig::default(),
            config: SkellyConfig::default(),
        }
    }

    /// 按广播名片段匹配目标
    pub fn name(mut self, fragment: impl Into<String>) -> Self {
        self.target.name_fragment = Some(fragment.into());
        self
    }

    /// 按 MAC 地址匹配目标（名称匹配失败时的兜底）
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.target.address = Some(address.into());
        self
    }

    /// 覆盖链路超时配置
    pub fn link_config(mut self, link: skelly_ble::LinkConfig) -> Self {
        self.link = link;
        self
    }

    /// 覆盖客户端配置
    pub fn config(mut self, config: SkellyConfig) -> Self {
        self.config = config;
        self
    }

    /// 标称动作时长
    pub fn movement_duration(mut self, duration: std::time::Duration) -> Self {
        self.config.movement_duration = duration;
        self
    }

    /// 扫描、连接并认证
    pub async fn connect(self) -> Result<Skelly<skelly_ble::BtleplugFactory>, ClientError> {
        let factory = skelly_ble::BtleplugFactory::new(self.target, self.link);
        Skelly::connect_with(factory, self.config).await
    }
}

#[cfg(feature = "btleplug-backend")]
impl Default for SkellyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skelly_ble::MockLink;
    use skelly_driver::testing::{auto_ack, command_payloads, queue_factory};
    use std::time::Duration;

    async fn mock_skelly(
        links: u32,
    ) -> (Skelly<impl LinkFactory<Link = MockLink>>, Vec<Arc<skelly_ble::MockController>>) {
        let mut pairs = Vec::new();
        let mut controllers = Vec::new();
        for _ in 0..links {
            let (link, events, controller) = MockLink::new();
            let controller = Arc::new(controller);
            auto_ack(controller.clone());
            controllers.push(controller);
            pairs.push((link, events));
        }

        let skelly = Skelly::connect_with(queue_factory(pairs), SkellyConfig::default())
            .await
            .unwrap();
        (skelly, controllers)
    }

    #[tokio::test(start_paused = true)]
    async fn test_facade_connects_and_performs() {
        let (skelly, controllers) = mock_skelly(1).await;
        assert!(skelly.is_ready().await);

        skelly.perform(Movement::Head).await.unwrap();
        assert_eq!(skelly.movement_phase().kind(), Some(Movement::Head));

        skelly.play_default_eyes().await.unwrap();
        skelly.apply_default_lights().await.unwrap();

        // 动作 1 + 眼睛 1 + 灯光全量 5
        assert_eq!(command_payloads(&controllers[0]).await.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_movement_reports_choice() {
        let (skelly, _controllers) = mock_skelly(1).await;
        let kind = skelly.perform_random().await.unwrap();
        assert_eq!(skelly.movement_phase().kind(), Some(kind));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_link_and_resets_lights() {
        let (skelly, controllers) = mock_skelly(2).await;

        skelly.apply_default_lights().await.unwrap();
        assert_eq!(command_payloads(&controllers[0]).await.len(), 5);

        // 断链：旧句柄上的操作失败
        controllers[0].drop_link();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(skelly.perform(Movement::Head).await.is_err());

        skelly.reconnect().await.unwrap();
        assert!(skelly.is_ready().await);

        // 灯光缓存已清空：同样的请求在新链路上重新全量下发
        skelly.apply_default_lights().await.unwrap();
        assert_eq!(command_payloads(&controllers[1]).await.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_recovery_reconnects_up_to_ceiling() {
        let (skelly, controllers) = mock_skelly(2).await;

        struct OkPairer;
        impl Pairer for OkPairer {
            async fn pair(&self, _address: &str, _pin: &str) -> Result<(), ClientError> {
                Ok(())
            }
        }

        // 启用前链路就断了：门面应自动重连到第二条链路再走序列
        controllers[0].drop_link();
        tokio::time::sleep(Duration::from_millis(50)).await;

        skelly.enable_audio(&OkPairer).await.unwrap();
        assert_eq!(skelly.audio_state(), AudioBridgeState::Paired);

        // 序列帧落在第二条链路上
        assert_eq!(command_payloads(&controllers[1]).await.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_retries_exhausted_when_link_unrecoverable() {
        let (skelly, controllers) = mock_skelly(1).await;

        struct NeverPairer;
        impl Pairer for NeverPairer {
            async fn pair(&self, _address: &str, _pin: &str) -> Result<(), ClientError> {
                Ok(())
            }
        }

        // 唯一一条链路断掉，工厂再也给不出新链路
        controllers[0].drop_link();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = skelly.enable_audio(&NeverPairer).await;
        assert!(matches!(
            result,
            Err(ClientError::AudioRetriesExhausted { .. })
        ));
    }
}
