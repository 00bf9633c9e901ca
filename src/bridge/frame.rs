use crate::protocol::EmbedMessage;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("assistant frame is detached")]
    Detached,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("frame channel closed")]
    Closed,
}

/// The embedded Assistant Frame as seen from the host: something that may or
/// may not exist right now and accepts posted messages for one origin.
pub trait AssistantFrame: Send + Sync {
    /// The frame element is mounted and has a content window.
    fn is_attached(&self) -> bool;

    fn post_message(&self, message: &EmbedMessage, target_origin: &str) -> Result<(), FrameError>;
}

/// `not-loaded -> loaded -> ready -> torn-down`. A load event after
/// teardown (the frame was re-mounted) starts over at `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameReadiness {
    #[default]
    NotLoaded,
    /// Load event seen, listener not confirmed.
    Loaded,
    /// READY received for the current load.
    Ready,
    TornDown,
}

impl FrameReadiness {
    pub fn on_load(self) -> Self {
        FrameReadiness::Loaded
    }

    /// READY can race ahead of the load event; a torn-down frame stays down.
    pub fn on_ready(self) -> Self {
        match self {
            FrameReadiness::TornDown => FrameReadiness::TornDown,
            _ => FrameReadiness::Ready,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, FrameReadiness::Loaded | FrameReadiness::Ready)
    }
}
