//! tracing 로그로 알림을 남기는 전송기와 메모리 전송기.

use crate::types::{Notification, NotificationResult, NotificationSender, NotifyLevel};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// 알림을 로그로 출력하는 전송기.
///
/// 텔레그램이 설정되지 않은 환경에서도 모든 알림이 로그에 남습니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        let level = notification.level;
        let message = notification.message.as_str();
        match level {
            NotifyLevel::Critical => error!(target: "notification", %level, "{}", message),
            NotifyLevel::Warning => warn!(target: "notification", %level, "{}", message),
            _ => info!(target: "notification", %level, "{}", message),
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// 전송된 알림을 메모리에 보관하는 전송기 (드라이런, 테스트용).
#[derive(Debug, Default)]
pub struct MemorySender {
    sent: Mutex<Vec<Notification>>,
}

impl MemorySender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 전송된 알림.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// 특정 레벨의 알림 본문.
    pub fn messages_at(&self, level: NotifyLevel) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }
}

#[async_trait]
impl NotificationSender for MemorySender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memory"
    }
}
