//! 动作会话跟踪
//!
//! 设备收到动作命令后自行执行约 15-20 秒，协议**没有**停止命令，
//! 回到空闲只有两条路：自然到期，或被另一条动作命令接管。
//! 本模块跟踪"设备当前在做什么、什么时候做完"：
//!
//! - `Idle --command(T)--> Active(T, now+duration)`
//! - `Active(T) --command(T)--> Active(T, now+duration)`（刷新窗口，不叠加）
//! - `Active(T) --command(U≠T)--> Active(U, now+duration)`（立即切换，无过渡态）
//! - `Active(T, exp)` 到期无新命令 → `Idle`
//!
//! 到期定时器按"取消-重建"管理：每次转移递增世代号，旧定时器
//! 醒来后发现世代不匹配即自行作废，不会把刷新/切换后的会话
//! 错杀回空闲。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::distributions::{Distribution, WeightedIndex};
use skelly_ble::GattLink;
use skelly_driver::{CommandRequest, SkellyConnection};
use skelly_protocol::{Command, Movement};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::ClientError;

/// 加权随机动作表（单一动作权重高于组合动作）
const MOVEMENT_WEIGHTS: [(Movement, u32); 7] = [
    (Movement::Head, 25),
    (Movement::Torso, 20),
    (Movement::Arm, 25),
    (Movement::HeadTorso, 10),
    (Movement::HeadArm, 10),
    (Movement::TorsoArm, 5),
    (Movement::All, 5),
];

/// 按权重随机挑一个动作
pub fn random_movement() -> Movement {
    let dist = WeightedIndex::new(MOVEMENT_WEIGHTS.iter().map(|(_, weight)| *weight))
        .expect("movement weight table is valid");
    MOVEMENT_WEIGHTS[dist.sample(&mut rand::thread_rng())].0
}

/// 动作会话相位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementPhase {
    /// 设备空闲
    Idle,
    /// 设备正在执行某个动作，到期时刻为 `expires_at`
    Active {
        kind: Movement,
        expires_at: Instant,
    },
}

impl MovementPhase {
    /// 当前动作类型（空闲时为 `None`）
    pub fn kind(&self) -> Option<Movement> {
        match self {
            MovementPhase::Idle => None,
            MovementPhase::Active { kind, .. } => Some(*kind),
        }
    }
}

struct TrackerState {
    phase: MovementPhase,
    /// 会话世代号：每次转移 +1，用于作废旧的到期定时器
    generation: u64,
}

/// 动作会话跟踪器
///
/// 每台设备同一时刻至多一个活动会话；会话状态只由本跟踪器改写。
pub struct MovementTracker {
    duration: Duration,
    state: Arc<Mutex<TrackerState>>,
}

impl MovementTracker {
    /// `duration` 为标称动作时长（设备实测 15-20 秒，可配置）
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: Arc::new(Mutex::new(TrackerState {
                phase: MovementPhase::Idle,
                generation: 0,
            })),
        }
    }

    /// 下发一个动作并推进会话
    ///
    /// 动作命令以立即优先级插队（切换不能排在灯光更新后面）。
    /// 只有写入确认成功才推进会话：写失败时设备没收到命令，
    /// 旧会话该到期还是会到期。
    pub async fn perform<L: GattLink>(
        &self,
        connection: &SkellyConnection<L>,
        kind: Movement,
    ) -> Result<(), ClientError> {
        connection
            .execute(CommandRequest::immediate(Command::Movement(kind)))
            .await?;
        self.note_sent(kind);
        Ok(())
    }

    /// 记录一次成功下发，刷新/切换会话并重建到期定时器
    fn note_sent(&self, kind: Movement) {
        let expires_at = Instant::now() + self.duration;
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;

            match state.phase {
                MovementPhase::Active { kind: prev, .. } if prev == kind => {
                    trace!(%kind, "movement window refreshed");
                },
                MovementPhase::Active { kind: prev, .. } => {
                    debug!(from = %prev, to = %kind, "movement switched");
                },
                MovementPhase::Idle => {
                    debug!(%kind, "movement session started");
                },
            }

            state.phase = MovementPhase::Active { kind, expires_at };
            state.generation
        };

        // 到期定时器：世代号不匹配说明会话已被刷新或切换，直接作废
        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let mut state = state.lock();
            if state.generation == generation {
                trace!("movement session expired");
                state.phase = MovementPhase::Idle;
            }
        });
    }

    /// 当前会话相位
    ///
    /// 定时器粒度之内可能存在已过期但尚未回写的窗口，这里按
    /// 到期时刻兜底判断，读取方永远看不到"过期但 Active"的状态。
    pub fn phase(&self) -> MovementPhase {
        let state = self.state.lock();
        match state.phase {
            MovementPhase::Active { expires_at, .. } if expires_at <= Instant::now() => {
                MovementPhase::Idle
            },
            phase => phase,
        }
    }

    /// 标称动作时长
    pub fn duration(&self) -> Duration {
        self.duration
    }
}
