use crate::repo::notifications_repo::NotificationsRepo;
use rust_decimal::Decimal;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub kind: String,
}

impl Notification {
    pub fn deposit_completed(user_id: i64, amount: Decimal) -> Self {
        Self {
            user_id,
            title: "Deposit Completed".to_string(),
            message: format!(
                "Your deposit of ${:.2} has been completed successfully!",
                amount.round_dp(2)
            ),
            kind: "success".to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes in-app notifications to the `notifications` table.
#[derive(Clone)]
pub struct DbNotifier {
    pub repo: NotificationsRepo,
}

#[async_trait::async_trait]
impl Notifier for DbNotifier {
    async fn notify(&self, n: &Notification) -> anyhow::Result<()> {
        self.repo.insert(n.user_id, &n.title, &n.message, &n.kind).await
    }
}

/// Keeps notifications in memory; `fail` makes every call error.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, n: &Notification) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("notification sink unavailable");
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(n.clone());
        }
        Ok(())
    }
}
