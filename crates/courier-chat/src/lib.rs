//! Message delivery and reconciliation for Courier.
//!
//! Wires the retrying network client, the durable offline queue, the
//! optimistic delivery coordinator and the in-memory conversation state
//! into one pipeline that never loses a message the user typed.

pub mod agents;
pub mod client;
pub mod connectivity;
pub mod conversation;
pub mod coordinator;
pub mod error;
pub mod queue;
pub mod speech;
pub mod transport;

pub use agents::AgentDirectory;
pub use client::{NetworkClient, RetryPolicy};
pub use connectivity::ConnectivityMonitor;
pub use conversation::ConversationState;
pub use coordinator::{DeliveryCoordinator, QueueDispatcher, SubmitOutcome, Submission};
pub use error::ChatError;
pub use queue::{OfflineQueue, PassSummary, QueueSender};
pub use speech::{MockSpeechSink, SpeechError, SpeechGuard, SpeechSink, SpeechTarget};
pub use transport::{
    ChatTransport, HttpTransport, MockStep, MockTransport, TransportError, TransportResponse,
};
