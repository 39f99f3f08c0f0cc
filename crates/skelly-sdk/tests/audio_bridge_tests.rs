//! 经典蓝牙音频桥测试
//!
//! 覆盖：启用序列顺序、断链即中止、带重连的恢复路径、
//! 配对失败不影响 BLE 控制。

use std::sync::Arc;
use std::time::Duration;

use skelly_ble::{MockController, MockLink};
use skelly_driver::testing::{auto_ack, command_payloads, queue_factory};
use skelly_sdk::protocol::SystemCommand;
use skelly_sdk::{
    AudioBridgeState, ClientError, Movement, Pairer, Skelly, SkellyConfig,
};

async fn mock_skelly(
    links: u32,
) -> (
    Skelly<impl skelly_ble::LinkFactory<Link = MockLink>>,
    Vec<Arc<MockController>>,
) {
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

struct OkPairer;

impl Pairer for OkPairer {
    async fn pair(&self, _address: &str, _pin: &str) -> Result<(), ClientError> {
        Ok(())
    }
}

struct RejectingPairer;

impl Pairer for RejectingPairer {
    async fn pair(&self, _address: &str, _pin: &str) -> Result<(), ClientError> {
        Err(ClientError::PairingRejected)
    }
}

#[tokio::test(start_paused = true)]
async fn enable_sequence_hits_wire_in_captured_order() {
    let (skelly, controllers) = mock_skelly(1).await;

    skelly.enable_audio(&OkPairer).await.unwrap();
    assert_eq!(skelly.audio_state(), AudioBridgeState::Paired);

    let expected: Vec<Vec<u8>> = [
        SystemCommand::PresetQuery,
        SystemCommand::Initialize,
        SystemCommand::PresetConfirm,
        SystemCommand::Initialize,
        SystemCommand::LiveSetup,
        SystemCommand::RecordTrigger,
    ]
    .iter()
    .map(|c| c.frame_bytes().to_vec())
    .collect();
    assert_eq!(command_payloads(&controllers[0]).await, expected);
}

/// 推流中断链：桥在一个通知周期内翻到 Aborted
#[tokio::test(start_paused = true)]
async fn link_drop_aborts_streaming_within_one_cycle() {
    let (skelly, controllers) = mock_skelly(1).await;

    skelly.enable_audio(&OkPairer).await.unwrap();
    skelly
        .mark_streaming()
        .expect("bridge should accept streaming from Paired");
    assert_eq!(skelly.audio_state(), AudioBridgeState::Streaming);

    let mut bridge = skelly.watch_audio();
    controllers[0].drop_link();

    tokio::time::timeout(Duration::from_secs(1), async {
        while *bridge.borrow_and_update() != AudioBridgeState::Aborted {
            bridge.changed().await.unwrap();
        }
    })
    .await
    .expect("audio bridge did not abort after BLE drop");
}

/// 断链后启用：门面自动重连再整段重跑序列，受重试上限约束
#[tokio::test(start_paused = true)]
async fn audio_recovery_reconnects_then_reruns_sequence() {
    let (skelly, controllers) = mock_skelly(2).await;

    controllers[0].drop_link();
    tokio::time::sleep(Duration::from_millis(50)).await;

    skelly.enable_audio(&OkPairer).await.unwrap();
    assert_eq!(skelly.audio_state(), AudioBridgeState::Paired);
    assert_eq!(command_payloads(&controllers[1]).await.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn recovery_gives_up_at_retry_ceiling() {
    let (skelly, controllers) = mock_skelly(1).await;

    controllers[0].drop_link();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = skelly.enable_audio(&OkPairer).await;
    assert!(matches!(
        result,
        Err(ClientError::AudioRetriesExhausted { .. })
    ));
}

/// 配对失败后 BLE 控制照常可用
#[tokio::test(start_paused = true)]
async fn pairing_failure_leaves_ble_control_intact() {
    let (skelly, _controllers) = mock_skelly(1).await;

    let result = skelly.enable_audio(&RejectingPairer).await;
    assert!(matches!(result, Err(ClientError::PairingRejected)));
    assert_eq!(skelly.audio_state(), AudioBridgeState::Unpaired);

    skelly.perform(Movement::Head).await.unwrap();
    assert_eq!(skelly.movement_phase().kind(), Some(Movement::Head));
}
