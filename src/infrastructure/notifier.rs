use crate::domain::ledger::Ledger;
use crate::domain::ports::{MailMessage, Notifier};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Writes comments and mails to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn post_comment(&self, ledger: &Ledger, comment: &str) -> Result<()> {
        tracing::info!(reference = %ledger.reference, %comment, "Audit comment");
        Ok(())
    }

    async fn send_mail(&self, mail: &MailMessage) -> Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, body = %mail.body, "Notification mail");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub reference: String,
    pub comment: String,
}

/// Keeps everything it receives; shared clones see the same records.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    comments: Arc<Mutex<Vec<PostedComment>>>,
    mails: Arc<Mutex<Vec<MailMessage>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn comments(&self) -> Vec<PostedComment> {
        self.comments.lock().await.clone()
    }

    pub async fn comments_for(&self, reference: &str) -> Vec<String> {
        self.comments
            .lock()
            .await
            .iter()
            .filter(|posted| posted.reference == reference)
            .map(|posted| posted.comment.clone())
            .collect()
    }

    pub async fn mails(&self) -> Vec<MailMessage> {
        self.mails.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn post_comment(&self, ledger: &Ledger, comment: &str) -> Result<()> {
        self.comments.lock().await.push(PostedComment {
            reference: ledger.reference.clone(),
            comment: comment.to_string(),
        });
        Ok(())
    }

    async fn send_mail(&self, mail: &MailMessage) -> Result<()> {
        self.mails.lock().await.push(mail.clone());
        Ok(())
    }
}
