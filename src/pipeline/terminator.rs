use async_channel::Receiver;
use tracing::trace;

/// The last stage. Drains whatever the workers pass on so that they never block on a full
/// channel.
#[derive(Debug)]
pub struct Terminator<T> {
    receiver: Receiver<T>,
}

impl<T> Terminator<T> {
    pub fn new(receiver: Receiver<T>) -> Self {
        Self { receiver }
    }

    /// Returns the number of items drained.
    pub async fn terminate(&self) -> u64 {
        trace!("terminator has started.");

        let mut count = 0;
        while self.receiver.recv().await.is_ok() {
            count += 1;
        }

        trace!(count = count, "terminator has been completed.");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_until_closed() {
        init_dummy_tracing_subscriber();

        let (sender, receiver) = async_channel::bounded::<u32>(10);
        sender.send(1).await.unwrap();
        sender.send(2).await.unwrap();
        sender.close();

        assert_eq!(Terminator::new(receiver).terminate().await, 2);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
