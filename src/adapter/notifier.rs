use tokio::sync::mpsc;

use crate::port::notifier::ResultsNotifier;

/// Forwards "results ready" to whoever holds the receiver, e.g. the console
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<()>
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ResultsNotifier for ChannelNotifier {
    fn results_ready(&self) {
        // Nobody listening is fine
        let _ = self.sender.send(());
    }
}

/// Discards notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ResultsNotifier for NoopNotifier {
    fn results_ready(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut receiver) = ChannelNotifier::new();
        notifier.results_ready();
        assert_eq!(receiver.recv().await, Some(()));

        drop(receiver);
        notifier.results_ready();
    }
}
