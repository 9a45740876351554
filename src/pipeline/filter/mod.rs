use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::stage::{SendResult, Stage};

pub use crate::pipeline::filter::rules::RuleFilter;

mod rules;

#[async_trait]
pub trait ObjectFilter {
    async fn filter(&self) -> Result<()>;
}

/// Drains the previous stage completely, then passes on the items accepted by `filter_fn`
/// in their arrival order and closes the channel to the next stage.
pub struct ObjectFilterBase<'a, T> {
    name: &'a str,
    base: Stage<T>,
}

impl<T: Send + Sync + 'static> ObjectFilterBase<'_, T> {
    pub async fn filter<F>(&self, filter_fn: F) -> Result<()>
    where
        F: Fn(&T) -> bool + Send + Sync,
    {
        let Some(buffered) = self.receive_all().await? else {
            return Ok(());
        };

        let received = buffered.len();
        let mut passed = 0;
        for item in buffered {
            if self.base.cancellation_token.is_cancelled() {
                debug!(name = self.name, "filter has been cancelled.");
                return Ok(());
            }
            if !filter_fn(&item) {
                continue;
            }

            passed += 1;
            if self.base.send(item).await? == SendResult::Closed {
                return Ok(());
            }
        }

        debug!(
            name = self.name,
            received = received,
            passed = passed,
            "filter has been completed."
        );
        Ok(())
    }

    // `None` when cancelled while receiving.
    async fn receive_all(&self) -> Result<Option<Vec<T>>> {
        let receiver = self.base.receiver()?;

        let mut buffered = vec![];
        loop {
            tokio::select! {
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(item) => buffered.push(item),
                        Err(_) => return Ok(Some(buffered)),
                    }
                },
                _ = self.base.cancellation_token.cancelled() => {
                    debug!(name = self.name, "filter has been cancelled.");
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use async_channel::Receiver;

    use crate::types::{PipelineCancellationToken, create_pipeline_cancellation_token};

    use super::*;

    fn create_base_helper(
        receiver: Receiver<String>,
        cancellation_token: PipelineCancellationToken,
    ) -> (Stage<String>, Receiver<String>) {
        let (sender, next_stage_receiver) = async_channel::bounded::<String>(1000);
        (
            Stage::new(
                None,
                Some(receiver),
                Some(sender),
                cancellation_token,
                Arc::new(AtomicBool::new(false)),
            ),
            next_stage_receiver,
        )
    }

    #[tokio::test]
    async fn filter_keeps_arrival_order() {
        init_dummy_tracing_subscriber();

        let (sender, receiver) = async_channel::bounded::<String>(1000);
        let (base, next_stage_receiver) =
            create_base_helper(receiver, create_pipeline_cancellation_token());
        let filter_base = ObjectFilterBase {
            name: "unittest",
            base,
        };

        for key in ["c", "a", "bb", "d"] {
            sender.send(key.to_string()).await.unwrap();
        }
        sender.close();

        filter_base.filter(|key| key.len() == 1).await.unwrap();
        drop(filter_base);

        let mut keys = vec![];
        while let Ok(key) = next_stage_receiver.recv().await {
            keys.push(key);
        }
        assert_eq!(keys, vec!["c", "a", "d"]);
    }

    #[tokio::test]
    async fn filter_false() {
        init_dummy_tracing_subscriber();

        let (sender, receiver) = async_channel::bounded::<String>(1000);
        let (base, next_stage_receiver) =
            create_base_helper(receiver, create_pipeline_cancellation_token());
        let filter_base = ObjectFilterBase {
            name: "unittest",
            base,
        };

        sender.send("test".to_string()).await.unwrap();
        sender.close();

        filter_base.filter(|_| false).await.unwrap();

        assert!(next_stage_receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn filter_canceled() {
        init_dummy_tracing_subscriber();

        let (_sender, receiver) = async_channel::bounded::<String>(1000);
        let cancellation_token = create_pipeline_cancellation_token();
        let (base, next_stage_receiver) =
            create_base_helper(receiver, cancellation_token.clone());
        let filter_base = ObjectFilterBase {
            name: "unittest",
            base,
        };

        cancellation_token.cancel();
        filter_base.filter(|_| true).await.unwrap();

        assert!(next_stage_receiver.try_recv().is_err());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
