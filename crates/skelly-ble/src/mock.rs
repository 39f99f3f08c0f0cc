//! Mock 链路（无硬件测试用）
//!
//! 记录每次写入的负载与时间戳（tokio 时钟，配合 `start_paused`
//! 可确定性地验证节流间隔），并允许测试侧注入通知、模拟断链和
//! 写入失败。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;

use crate::{BleError, GattLink, LinkEvents};

/// 单次写入记录
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub payload: Vec<u8>,
    pub at: Instant,
}

struct MockShared {
    writes: Mutex<Vec<WriteRecord>>,
    /// 失败注入前还要放行的写入次数
    fail_delay: AtomicU32,
    /// 剩余注入失败次数：>0 时后续写入依次失败并递减
    fail_remaining: AtomicU32,
    connected: watch::Sender<bool>,
}

/// Mock GATT 链路
pub struct MockLink {
    shared: Arc<MockShared>,
}

/// 测试侧控制柄
pub struct MockController {
    shared: Arc<MockShared>,
    notify_tx: mpsc::Sender<Vec<u8>>,
}

impl MockLink {
    /// 创建链路 + 事件通道 + 控制柄三元组
    pub fn new() -> (MockLink, LinkEvents, MockController) {
        let (notify_tx, notify_rx) = mpsc::channel(64);
        let (connected_tx, connected_rx) = watch::channel(true);

        let shared = Arc::new(MockShared {
            writes: Mutex::new(Vec::new()),
            fail_delay: AtomicU32::new(0),
            fail_remaining: AtomicU32::new(0),
            connected: connected_tx,
        });

        (
            MockLink {
                shared: shared.clone(),
            },
            LinkEvents {
                notifications: notify_rx,
                connected: connected_rx,
            },
            MockController { shared, notify_tx },
        )
    }
}

impl GattLink for MockLink {
    async fn write_command(&self, payload: &[u8]) -> Result<(), BleError> {
        if !*self.shared.connected.borrow() {
            return Err(BleError::Dropped);
        }

        let in_grace = self
            .shared
            .fail_delay
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !in_grace
            && self
                .shared
                .fail_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(BleError::Device("injected write failure".into()));
        }

        self.shared.writes.lock().await.push(WriteRecord {
            payload: payload.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        let _ = self.shared.connected.send(false);
        Ok(())
    }
}

impl MockController {
    /// 注入一条设备通知
    pub async fn push_notification(&self, payload: impl Into<Vec<u8>>) {
        self.notify_tx
            .send(payload.into())
            .await
            .expect("notification receiver dropped");
    }

    /// 模拟链路突然断开
    pub fn drop_link(&self) {
        let _ = self.shared.connected.send(false);
    }

    /// 让接下来的 `n` 次写入失败
    pub fn fail_next_writes(&self, n: u32) {
        self.shared.fail_delay.store(0, Ordering::SeqCst);
        self.shared.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// 先放行 `succeed` 次写入，随后让 `fail` 次写入失败
    pub fn fail_after_next_writes(&self, succeed: u32, fail: u32) {
        self.shared.fail_delay.store(succeed, Ordering::SeqCst);
        self.shared.fail_remaining.store(fail, Ordering::SeqCst);
    }

    /// 已写入的全部记录
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.shared.writes.lock().await.clone()
    }

    /// 已写入的负载列表（不含时间戳）
    pub async fn written_payloads(&self) -> Vec<Vec<u8>> {
        self.shared
            .writes
            .lock()
            .await
            .iter()
            .map(|record| record.payload.clone())
            .collect()
    }
}
