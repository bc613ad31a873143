/*
    router.rs - Inbound message classification

    Every message the transport delivers goes through dispatch(). Envelope
    filters run first and silently drop traffic that is not for us; the
    survivors are decoded and handed to the handshake or liveness handlers.
    Nothing here returns an error to the caller.
*/

use tracing::{error, trace};

use super::codec::ProtocolMessage;
use super::message::Message;
use super::state::ProviderCore;
use crate::metrics;

/// Why an inbound message was discarded before decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    ForeignDocument,
    OwnEcho,
    Misaddressed,
    StaleClock,
    /// Sender runs a newer epoch. Logged only.
    HigherClock,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::ForeignDocument => "foreign_document",
            DropReason::OwnEcho => "own_echo",
            DropReason::Misaddressed => "misaddressed",
            DropReason::StaleClock => "stale_clock",
            DropReason::HigherClock => "higher_clock",
        }
    }
}

/// What dispatch() did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Passed the filters and was handled; carries the message kind
    Handled(&'static str),
    Dropped(DropReason),
    /// Awareness traffic is received but not implemented
    Unsupported,
    /// Malformed envelope or payload the document rejected
    Rejected(String),
}

impl ProviderCore {
    /// Route one inbound message
    pub async fn dispatch(&self, message: Message) -> DispatchOutcome {
        metrics::record_received();

        if let Some(reason) = self.filter(&message) {
            trace!(
                document = %self.document_id,
                instance = %self.instance_id,
                sender = %message.sender_id,
                target = %message.target_id,
                clock = message.clock,
                local_clock = self.epoch,
                reason = reason.as_str(),
                "Dropping message"
            );
            metrics::record_dropped(reason.as_str());
            return DispatchOutcome::Dropped(reason);
        }

        let decoded = match ProtocolMessage::decode(&message.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(
                    document = %self.document_id,
                    instance = %self.instance_id,
                    sender = %message.sender_id,
                    message_size = message.data.len(),
                    error = %e,
                    "Malformed protocol envelope"
                );
                metrics::record_dropped("malformed");
                return DispatchOutcome::Rejected(e.to_string());
            }
        };

        let kind = decoded.kind();
        trace!(
            document = %self.document_id,
            instance = %self.instance_id,
            sender = %message.sender_id,
            target = %message.target_id,
            message_type = kind,
            message_size = message.data.len(),
            "Handling foreign message"
        );

        let result = match decoded {
            ProtocolMessage::Sync(sync) => self.handle_sync(message.sender_id, sync).await,
            ProtocolMessage::Awareness(state) => {
                error!(
                    document = %self.document_id,
                    instance = %self.instance_id,
                    sender = %message.sender_id,
                    message_size = state.len(),
                    "Awareness messages are not supported"
                );
                metrics::record_dropped("unsupported");
                return DispatchOutcome::Unsupported;
            }
            ProtocolMessage::Ping => {
                self.handle_ping(message.sender_id).await;
                Ok(())
            }
            ProtocolMessage::Pong => {
                self.handle_pong(message.sender_id).await;
                Ok(())
            }
        };

        match result {
            Ok(()) => DispatchOutcome::Handled(kind),
            Err(e) => {
                error!(
                    document = %self.document_id,
                    instance = %self.instance_id,
                    sender = %message.sender_id,
                    message_type = kind,
                    error = %e,
                    "Failed to handle sync message"
                );
                metrics::record_dropped("rejected");
                DispatchOutcome::Rejected(e.to_string())
            }
        }
    }

    /// Envelope checks, in order. `None` means the message is for us.
    pub fn filter(&self, message: &Message) -> Option<DropReason> {
        if message.id != self.document_id {
            Some(DropReason::ForeignDocument)
        } else if message.sender_id == self.instance_id {
            Some(DropReason::OwnEcho)
        } else if !message.target_id.accepts(self.instance_id) {
            Some(DropReason::Misaddressed)
        } else if message.clock < self.epoch {
            Some(DropReason::StaleClock)
        } else if message.clock > self.epoch {
            // TODO: a newer epoch means this instance is stale; trigger a reload instead of dropping
            Some(DropReason::HigherClock)
        } else {
            None
        }
    }
}
