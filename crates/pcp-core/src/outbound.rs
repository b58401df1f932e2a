//! Outbound reply channel

use tokio::sync::mpsc;

use crate::models::ReplyMessage;

/// Enqueues one outbound message towards the UI surface.
///
/// Posting never blocks and never fails outward; a closed channel means the
/// surface went away and the reply has nobody to go to.
pub trait Outbound: Send + Sync {
    fn post(&self, reply: ReplyMessage);
}

impl Outbound for mpsc::UnboundedSender<ReplyMessage> {
    fn post(&self, reply: ReplyMessage) {
        if self.send(reply).is_err() {
            tracing::debug!("Outbound channel closed, dropping reply");
        }
    }
}

impl<T: Outbound + ?Sized> Outbound for std::sync::Arc<T> {
    fn post(&self, reply: ReplyMessage) {
        (**self).post(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_to_unbounded_sender() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.post(ReplyMessage::error("a", "boom"));
        assert_eq!(rx.try_recv().unwrap(), ReplyMessage::error("a", "boom"));
    }

    #[test]
    fn test_post_to_closed_channel_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel::<ReplyMessage>();
        drop(rx);
        tx.post(ReplyMessage::error("a", "boom"));
    }
}
