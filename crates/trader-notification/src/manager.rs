//! 여러 전송기로 알림을 동시에 보내는 관리자.

use crate::types::{Notification, NotificationSender, NotifyLevel};
use futures::future::join_all;
use std::sync::Arc;
use tracing::error;

/// 알림 관리자.
///
/// 활성화된 모든 전송기에 동시에 전송합니다. 전송 실패는 로그로만 남고
/// 호출자에게 전파되지 않습니다.
#[derive(Clone, Default)]
pub struct NotificationManager {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl NotificationManager {
    /// 새 알림 관리자를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 알림 전송기를 추가합니다.
    pub fn add_sender<S: NotificationSender + 'static>(&mut self, sender: S) {
        self.senders.push(Arc::new(sender));
    }

    /// 공유 전송기를 추가합니다.
    pub fn add_shared_sender(&mut self, sender: Arc<dyn NotificationSender>) {
        self.senders.push(sender);
    }

    /// 등록된 전송기 이름 목록.
    pub fn sender_names(&self) -> Vec<String> {
        self.senders.iter().map(|s| s.name().to_string()).collect()
    }

    /// 활성화된 모든 전송기를 통해 알림을 전송하고 성공한 전송기 수를 반환합니다.
    pub async fn notify(&self, notification: &Notification) -> usize {
        let enabled: Vec<_> = self.senders.iter().filter(|s| s.is_enabled()).collect();
        let results = join_all(enabled.iter().map(|s| s.send(notification))).await;

        let mut delivered = 0;
        for (sender, result) in enabled.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => error!(sender = sender.name(), error = %e, "Failed to send notification"),
            }
        }
        delivered
    }

    /// 레벨과 본문으로 알림을 전송합니다.
    pub async fn send(&self, level: NotifyLevel, message: impl Into<String>) -> usize {
        self.notify(&Notification::new(level, message)).await
    }

    pub async fn info(&self, message: impl Into<String>) -> usize {
        self.send(NotifyLevel::Info, message).await
    }

    pub async fn success(&self, message: impl Into<String>) -> usize {
        self.send(NotifyLevel::Success, message).await
    }

    pub async fn warning(&self, message: impl Into<String>) -> usize {
        self.send(NotifyLevel::Warning, message).await
    }

    pub async fn critical(&self, message: impl Into<String>) -> usize {
        self.send(NotifyLevel::Critical, message).await
    }

    pub async fn trade(&self, message: impl Into<String>) -> usize {
        self.send(NotifyLevel::Trade, message).await
    }
}
