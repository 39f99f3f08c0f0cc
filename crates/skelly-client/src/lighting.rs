//! 灯光状态去抖
//!
//! 固件按顺序逐条应用灯光命令，且**模式选择之前到达的参数写入会被
//! 忽略**，因此一次灯光更新必须按 分区 → 模式 → 亮度/颜色/速度 的
//! 固定顺序下发。本跟踪器缓存最近一次确认写入的各字段值，只为
//! 发生变化的字段生成命令，避免冗余写入挤占节流额度。
//!
//! 提交语义：每条子命令写入成功后立刻落账；任何一条失败即停止并
//! 上抛，缓存停留在最后一次确认成功的取值上（即设备实际所处状态）。

use std::sync::Arc;

use arc_swap::ArcSwap;
use skelly_ble::GattLink;
use skelly_driver::{CommandRequest, SkellyConnection};
use skelly_protocol::{
    BrightnessLevel, Command, EffectSpeed, LightColor, LightMode, LightZone,
};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::ClientError;

/// 一次灯光设置请求
///
/// 亮度接受 0-255 原始值，提交前量化到最近的已验证档位。
#[derive(Debug, Clone, Copy)]
pub struct LightRequest {
    pub zone: LightZone,
    pub mode: LightMode,
    pub brightness: u8,
    pub color: LightColor,
    pub speed: EffectSpeed,
}

impl Default for LightRequest {
    fn default() -> Self {
        Self {
            zone: LightZone::All,
            mode: LightMode::Static,
            brightness: 0xFF,
            color: LightColor::default(),
            speed: EffectSpeed::default(),
        }
    }
}

/// 最近一次确认写入的灯光状态
///
/// 字段为 `None` 表示本次连接内还没有成功写过该字段。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommittedLight {
    pub zone: Option<LightZone>,
    pub mode: Option<LightMode>,
    pub brightness: Option<BrightnessLevel>,
    pub color: Option<LightColor>,
    pub speed: Option<EffectSpeed>,
}

/// 灯光状态跟踪器
pub struct LightTracker {
    committed: ArcSwap<CommittedLight>,
    /// 序列化并发的 set_light 调用：两组灯光子命令交错会打乱
    /// 固件要求的字段顺序
    update_lock: tokio::sync::Mutex<()>,
}

impl LightTracker {
    pub fn new() -> Self {
        Self {
            committed: ArcSwap::from_pointee(CommittedLight::default()),
            update_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 当前已确认的灯光状态快照
    pub fn committed(&self) -> Arc<CommittedLight> {
        self.committed.load_full()
    }

    /// 应用一次灯光设置
    ///
    /// 与缓存逐字段比对，只把变化的字段按固定顺序提交给调度器。
    /// 全部字段已是目标值时不产生任何写入。
    pub async fn set_light<L: GattLink>(
        &self,
        connection: &SkellyConnection<L>,
        request: LightRequest,
    ) -> Result<(), ClientError> {
        let _guard = self.update_lock.lock().await;

        let brightness = BrightnessLevel::quantize(request.brightness);
        let committed = **self.committed.load();

        // 固定顺序：分区 → 模式 → 亮度/颜色/速度
        let mut plan: SmallVec<[Command; 6]> = SmallVec::new();
        if committed.zone != Some(request.zone) {
            plan.push(Command::LightZone(request.zone));
        }
        if committed.mode != Some(request.mode) {
            plan.push(Command::LightMode(request.mode));
        }
        if committed.brightness != Some(brightness) {
            plan.push(Command::Brightness(brightness));
        }
        if committed.color != Some(request.color) {
            plan.push(Command::Color(request.color));
        }
        if committed.speed != Some(request.speed) {
            plan.push(Command::Speed(request.speed));
        }

        if plan.is_empty() {
            trace!("light state unchanged, nothing to send");
            return Ok(());
        }
        debug!(commands = plan.len(), "applying light update");

        for command in plan {
            connection.execute(CommandRequest::routine(command)).await?;
            self.commit(command);
        }

        Ok(())
    }

    /// 单条子命令写入成功后落账
    fn commit(&self, command: Command) {
        let mut next = **self.committed.load();
        match command {
            Command::LightZone(zone) => next.zone = Some(zone),
            Command::LightMode(mode) => next.mode = Some(mode),
            Command::Brightness(level) => next.brightness = Some(level),
            Command::Color(color) => next.color = Some(color),
            Command::Speed(speed) => next.speed = Some(speed),
            // 其余命令族不经过灯光跟踪器
            _ => {},
        }
        self.committed.store(Arc::new(next));
    }

    /// 连接重建后清空缓存（设备重启回到默认灯光状态）
    pub fn reset(&self) {
        self.committed.store(Arc::new(CommittedLight::default()));
    }
}

impl Default for LightTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skelly_ble::{MockController, MockLink};
    use skelly_driver::ConnectionConfig;
    use skelly_driver::testing::{command_payloads, ready_mock_connection};

    async fn ready_connection() -> (SkellyConnection<MockLink>, Arc<MockController>) {
        ready_mock_connection(&ConnectionConfig::default()).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_update_sends_all_fields_in_order() {
        let (connection, controller) = ready_connection().await;
        let tracker = LightTracker::new();

        tracker
            .set_light(&connection, LightRequest::default())
            .await
            .unwrap();

        let payloads = command_payloads(&controller).await;
        assert_eq!(payloads.len(), 5);
        // 固定顺序：分区 → 模式 → 亮度 → 颜色 → 速度
        assert_eq!(payloads[0][1], 0xF5);
        assert_eq!(payloads[1][1], 0xF2);
        assert_eq!(payloads[2][1], 0xF3);
        assert_eq!(payloads[3][1], 0xF4);
        assert_eq!(payloads[4][1], 0xF6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_fields_generate_no_commands() {
        let (connection, controller) = ready_connection().await;
        let tracker = LightTracker::new();

        let request = LightRequest::default();
        tracker.set_light(&connection, request).await.unwrap();
        let baseline = command_payloads(&controller).await.len();

        // 完全相同的请求：零写入
        tracker.set_light(&connection, request).await.unwrap();
        assert_eq!(command_payloads(&controller).await.len(), baseline);

        // 只改颜色：单条写入
        let recolor = LightRequest {
            color: LightColor::Purple,
            ..request
        };
        tracker.set_light(&connection, recolor).await.unwrap();

        let payloads = command_payloads(&controller).await;
        assert_eq!(payloads.len(), baseline + 1);
        assert_eq!(payloads.last().unwrap()[1], 0xF4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_brightness_quantized_before_diff() {
        let (connection, controller) = ready_connection().await;
        let tracker = LightTracker::new();

        let request = LightRequest {
            brightness: 0x7F,
            ..LightRequest::default()
        };
        tracker.set_light(&connection, request).await.unwrap();
        let baseline = command_payloads(&controller).await.len();

        // 0x7F 与 0x82 量化到同一档位（0x80），不算变化
        let nearby = LightRequest {
            brightness: 0x82,
            ..request
        };
        tracker.set_light(&connection, nearby).await.unwrap();
        assert_eq!(command_payloads(&controller).await.len(), baseline);
        assert_eq!(
            tracker.committed().brightness,
            Some(BrightnessLevel::quantize(0x80))
        );
    }

    /// 子命令失败：缓存停在最后一次确认成功的取值
    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_keeps_last_known_good() {
        let (connection, controller) = ready_connection().await;
        let tracker = LightTracker::new();

        // 分区、模式两条成功，亮度开始失败（首次+3 次重试）
        controller.fail_after_next_writes(2, 4);

        let result = tracker
            .set_light(&connection, LightRequest::default())
            .await;
        assert!(result.is_err());

        let committed = tracker.committed();
        assert_eq!(committed.zone, Some(LightZone::All));
        assert_eq!(committed.mode, Some(LightMode::Static));
        // 亮度没写成功，不落账
        assert_eq!(committed.brightness, None);
        assert_eq!(committed.color, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_forgets_committed_state() {
        let (connection, controller) = ready_connection().await;
        let tracker = LightTracker::new();

        tracker
            .set_light(&connection, LightRequest::default())
            .await
            .unwrap();
        let baseline = command_payloads(&controller).await.len();

        tracker.reset();
        tracker
            .set_light(&connection, LightRequest::default())
            .await
            .unwrap();

        // 重置后同样的请求重新全量下发
        assert_eq!(command_payloads(&controller).await.len(), baseline + 5);
    }
}
