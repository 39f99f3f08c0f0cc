//! 命令闸门与节流测试
//!
//! 验证两条核心纪律：
//! 1. 认证确认之前，任何命令字节都不会到达传输层
//! 2. 高负载下相邻两次写入的间隔不低于节流下限

use std::sync::Arc;

use skelly_ble::MockLink;
use skelly_driver::testing::{auto_ack, command_payloads, single_use_factory};
use skelly_driver::{CommandRequest, ConnectionConfig, DriverError, SkellyConnection};
use skelly_protocol::{AUTH_PAYLOAD, Command, EyeAnimation, Movement};

#[tokio::test(start_paused = true)]
async fn no_bytes_reach_transport_before_auth_ack() {
    let (link, events, controller) = MockLink::new();
    let controller = Arc::new(controller);

    // 从不应答认证
    let factory = single_use_factory(link, events);
    let result = SkellyConnection::establish(&factory, &ConnectionConfig::default()).await;
    assert!(matches!(result, Err(DriverError::AuthTimeout { .. })));

    // 传输层只见过认证载荷
    let payloads = controller.written_payloads().await;
    assert!(!payloads.is_empty());
    assert!(payloads.iter().all(|p| p == AUTH_PAYLOAD));
}

#[tokio::test(start_paused = true)]
async fn submissions_after_link_loss_fail_without_transport_io() {
    let (link, events, controller) = MockLink::new();
    let controller = Arc::new(controller);
    auto_ack(controller.clone());

    let factory = single_use_factory(link, events);
    let connection = SkellyConnection::establish(&factory, &ConnectionConfig::default())
        .await
        .unwrap();

    controller.drop_link();
    // 等断链监视把状态打回 Disconnected
    let mut state_rx = connection.watch_state();
    while state_rx.borrow_and_update().is_ready() {
        state_rx.changed().await.unwrap();
    }

    let before = command_payloads(&controller).await.len();
    assert!(matches!(
        connection.submit(CommandRequest::immediate(Command::Movement(Movement::Head))),
        Err(DriverError::ConnectionLost)
    ));
    assert_eq!(command_payloads(&controller).await.len(), before);
}

#[tokio::test(start_paused = true)]
async fn pacing_floor_holds_under_burst_load() {
    let (link, events, controller) = MockLink::new();
    let controller = Arc::new(controller);
    auto_ack(controller.clone());

    let factory = single_use_factory(link, events);
    let connection = SkellyConnection::establish(&factory, &ConnectionConfig::default())
        .await
        .unwrap();
    let floor = ConnectionConfig::default().dispatcher.pacing_floor;

    // 一口气塞进 8 条例行命令 + 中途一条立即命令
    let mut tickets = Vec::new();
    for index in 1..=8 {
        let ticket = connection
            .submit(CommandRequest::routine(Command::Eyes(
                EyeAnimation::new(index).unwrap(),
            )))
            .unwrap();
        tickets.push(ticket);
    }
    tickets.push(
        connection
            .submit(CommandRequest::immediate(Command::Movement(Movement::All)))
            .unwrap(),
    );

    for ticket in tickets {
        ticket.wait().await.unwrap();
    }

    // 立即命令插了队，但所有写入间隔仍然 >= 节流下限
    let writes: Vec<_> = controller
        .writes()
        .await
        .into_iter()
        .filter(|w| w.payload != AUTH_PAYLOAD)
        .collect();
    assert_eq!(writes.len(), 9);
    for pair in writes.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= floor, "inter-write gap {gap:?} below pacing floor");
    }

    // 立即命令（动作帧）确实跳过了尚未发出的例行命令
    let movement_frame = Command::Movement(Movement::All).encode().unwrap();
    let position = writes
        .iter()
        .position(|w| w.payload == movement_frame.bytes())
        .expect("movement frame was written");
    assert!(position < writes.len() - 1, "immediate command did not jump the queue");
}

#[tokio::test(start_paused = true)]
async fn failed_routine_command_does_not_block_movement() {
    let (link, events, controller) = MockLink::new();
    let controller = Arc::new(controller);
    auto_ack(controller.clone());

    let factory = single_use_factory(link, events);
    let connection = SkellyConnection::establish(&factory, &ConnectionConfig::default())
        .await
        .unwrap();

    // 让下一条（眼睛）命令连首次带重试全部失败
    controller.fail_next_writes(4);

    let eyes = connection
        .submit(CommandRequest::routine(Command::Eyes(
            EyeAnimation::new(3).unwrap(),
        )))
        .unwrap();
    assert!(matches!(
        eyes.wait().await,
        Err(DriverError::WriteFailed { .. })
    ));

    // 眼睛命令失败被丢弃，动作命令照常送达
    connection
        .execute(CommandRequest::immediate(Command::Movement(Movement::Torso)))
        .await
        .unwrap();

    let expected = Command::Movement(Movement::Torso).encode().unwrap();
    let payloads = command_payloads(&controller).await;
    assert_eq!(payloads.last().unwrap(), expected.bytes());
}
