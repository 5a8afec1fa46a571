use crate::NodeId;
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Tells the rendering host to re-read part of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeChanged {
    /// Subtree to refresh; `None` means the whole tree.
    pub node: Option<NodeId>,
}

/// Broadcast of [`TreeChanged`] events. Every subscriber sees every event.
#[derive(Clone)]
pub struct TreeEvents {
    sender: broadcast::Sender<TreeChanged>,
}

impl TreeEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChanged> {
        self.sender.subscribe()
    }

    pub fn emit(&self, node: Option<NodeId>) {
        if self.sender.send(TreeChanged { node }).is_err() {
            log::debug!("Tree changed with no subscribers");
        }
    }
}

impl Default for TreeEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
