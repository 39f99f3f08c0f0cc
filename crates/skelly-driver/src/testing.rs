//! 测试支撑（mock feature）
//!
//! 下游 crate 的测试反复需要"一条已就绪的 mock 连接"，这里提供
//! 统一的搭建入口，避免每个测试模块各写一份认证自动应答。

use std::sync::Arc;
use std::time::Duration;

use skelly_ble::{BleError, LinkEvents, LinkFactory, MockController, MockLink};

use crate::connection::{ConnectionConfig, SkellyConnection};

/// 后台自动应答认证：看到认证载荷就回一条肯定应答
pub fn auto_ack(controller: Arc<MockController>) {
    tokio::spawn(async move {
        loop {
            let authed = controller
                .written_payloads()
                .await
                .iter()
                .any(|p| p == skelly_protocol::AUTH_PAYLOAD);
            if authed {
                controller.push_notification([0x01]).await;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });
}

/// 一次性工厂：第一次 `open` 交出给定链路，之后报 NotFound
pub fn single_use_factory(
    link: MockLink,
    events: LinkEvents,
) -> impl LinkFactory<Link = MockLink> {
    let slot = std::sync::Mutex::new(Some((link, events)));
    move || slot.lock().unwrap().take().ok_or(BleError::NotFound)
}

/// 多次工厂：按顺序交出预先捏好的链路（重连测试用）
pub fn queue_factory(
    links: Vec<(MockLink, LinkEvents)>,
) -> impl LinkFactory<Link = MockLink> {
    let queue = std::sync::Mutex::new(std::collections::VecDeque::from(links));
    move || {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(BleError::NotFound)
    }
}

/// 建一条已就绪（已认证）的 mock 连接
pub async fn ready_mock_connection(
    config: &ConnectionConfig,
) -> (SkellyConnection<MockLink>, Arc<MockController>) {
    let (link, events, controller) = MockLink::new();
    let controller = Arc::new(controller);
    auto_ack(controller.clone());

    let factory = single_use_factory(link, events);
    let connection = SkellyConnection::establish(&factory, config)
        .await
        .expect("mock connection should authenticate");
    (connection, controller)
}

/// 过滤掉认证载荷后的全部写入
pub async fn command_payloads(controller: &MockController) -> Vec<Vec<u8>> {
    controller
        .written_payloads()
        .await
        .into_iter()
        .filter(|p| p != skelly_protocol::AUTH_PAYLOAD)
        .collect()
}
