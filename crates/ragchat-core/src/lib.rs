pub mod attachments;
pub mod chat;
pub mod citations;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod highlight;
pub mod session;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use attachments::{Attachment, AttachmentContext, AttachmentSet};
pub use chat::{ChatState, PendingTurn, TurnOutcome, TurnUpdate, TurnUpdateKind};
pub use citations::{NumberedSource, SourceRef};
pub use client::RagClient;
pub use config::{Config, Endpoints};
pub use conversation::{Conversation, TurnId, TurnPhase, FALLBACK_REPLY};
pub use error::{ClientError, Result};
pub use highlight::{HighlightProjector, OverlayRect, OverlaySurface, PageGeometry, PageSize, Zoom};
pub use session::SessionIdentity;
pub use state::{BoundingBox, Message, Sender, Source};
pub use stream::{EventDecoder, StreamEvent, StreamProtocol};
