use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};

use crate::storage::Storage;
use crate::types::PipelineCancellationToken;

/// The plumbing shared by every pipeline stage: the storage it talks to, the channel it
/// reads from and the channel it writes to.
pub struct Stage<T> {
    pub storage: Option<Storage>,
    pub receiver: Option<Receiver<T>>,
    pub sender: Option<Sender<T>>,
    pub cancellation_token: PipelineCancellationToken,
    pub has_warning: Arc<AtomicBool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
}

impl<T> Stage<T> {
    pub fn new(
        storage: Option<Storage>,
        receiver: Option<Receiver<T>>,
        sender: Option<Sender<T>>,
        cancellation_token: PipelineCancellationToken,
        has_warning: Arc<AtomicBool>,
    ) -> Self {
        Self {
            storage,
            receiver,
            sender,
            cancellation_token,
            has_warning,
        }
    }

    pub fn storage(&self) -> Result<&Storage> {
        self.storage
            .as_ref()
            .ok_or_else(|| anyhow!("stage has no storage."))
    }

    pub fn receiver(&self) -> Result<&Receiver<T>> {
        self.receiver
            .as_ref()
            .ok_or_else(|| anyhow!("stage has no receiver."))
    }

    /// A closed channel means the downstream stage has gone away, which is not an error.
    pub async fn send(&self, item: T) -> Result<SendResult>
    where
        T: Send + Sync + 'static,
    {
        let Some(sender) = self.sender.as_ref() else {
            return Ok(SendResult::Closed);
        };

        let result = sender
            .send(item)
            .await
            .context("async_channel::Sender::send() failed.");

        if let Err(e) = result {
            return if !self.is_channel_closed() {
                Err(anyhow!(e))
            } else {
                Ok(SendResult::Closed)
            };
        }

        Ok(SendResult::Success)
    }

    pub fn is_channel_closed(&self) -> bool {
        self.sender.as_ref().is_none_or(|sender| sender.is_closed())
    }

    pub fn set_warning(&self) {
        self.has_warning.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use crate::types::create_pipeline_cancellation_token;

    use super::*;

    #[tokio::test]
    async fn send_and_close() {
        init_dummy_tracing_subscriber();

        let (sender, receiver) = async_channel::bounded::<u32>(10);
        let stage = Stage::new(
            None,
            None,
            Some(sender),
            create_pipeline_cancellation_token(),
            Arc::new(AtomicBool::new(false)),
        );

        assert_eq!(stage.send(1).await.unwrap(), SendResult::Success);
        assert_eq!(receiver.recv().await.unwrap(), 1);

        receiver.close();
        assert!(stage.is_channel_closed());
        assert_eq!(stage.send(2).await.unwrap(), SendResult::Closed);
    }

    #[tokio::test]
    async fn missing_parts_are_errors() {
        init_dummy_tracing_subscriber();

        let stage = Stage::<u32>::new(
            None,
            None,
            None,
            create_pipeline_cancellation_token(),
            Arc::new(AtomicBool::new(false)),
        );

        assert!(stage.storage().is_err());
        assert!(stage.receiver().is_err());
        assert_eq!(stage.send(1).await.unwrap(), SendResult::Closed);
    }

    #[test]
    fn set_warning() {
        init_dummy_tracing_subscriber();

        let has_warning = Arc::new(AtomicBool::new(false));
        let stage = Stage::<u32>::new(
            None,
            None,
            None,
            create_pipeline_cancellation_token(),
            has_warning.clone(),
        );
        stage.set_warning();

        assert!(has_warning.load(Ordering::SeqCst));
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
