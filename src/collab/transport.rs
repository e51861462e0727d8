//! Cloud transport interface (MQTT session, TLS and broker handling live
//! behind it).

use bytes::Bytes;

use crate::error::Result;
use crate::manager::EventSink;

/// Logical publish destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Ad hoc messages such as button presses
    Messages,
    /// Batched backlog of queued entries
    Batch,
    /// Device shadow update (reported state)
    StateUpdate,
    /// Device shadow request
    StateGet,
    /// AGPS assistance request
    AgpsRequest,
}

impl Topic {
    /// Broker topic for this destination
    pub fn path(&self, client_id: &str) -> String {
        match self {
            Topic::Messages => format!("{}/messages", client_id),
            Topic::Batch => format!("{}/batch", client_id),
            Topic::StateUpdate => format!("$aws/things/{}/shadow/update", client_id),
            Topic::StateGet => format!("$aws/things/{}/shadow/get", client_id),
            Topic::AgpsRequest => format!("{}/agps/get", client_id),
        }
    }
}

/// Topic the transport subscribes to for desired configuration
pub fn config_subscription(client_id: &str) -> String {
    format!("$aws/things/{}/shadow/get/accepted/desired/cfg", client_id)
}

/// Session notifications raised by the transport outside of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A subscription was acknowledged; may repeat once per subscription
    Ready,
    /// The broker session was lost
    Disconnected,
    /// A firmware image was downloaded and is ready to boot
    FotaDone,
}

/// Connection to the cloud broker
#[cfg_attr(test, mockall::automock)]
pub trait CloudTransport: Send {
    /// Install the sink for session notifications
    fn register(&mut self, link: EventSink<LinkEvent>);

    /// Open the broker session
    fn connect(&mut self) -> Result<()>;

    /// Publish `payload` to `topic`
    fn send(&mut self, topic: Topic, payload: Bytes) -> Result<()>;

    /// Next inbound payload, if any
    fn poll_inbound(&mut self) -> Option<Bytes>;

    fn disconnect(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_paths() {
        assert_eq!(Topic::Batch.path("cat-1"), "cat-1/batch");
        assert_eq!(Topic::Messages.path("cat-1"), "cat-1/messages");
        assert_eq!(Topic::StateUpdate.path("cat-1"), "$aws/things/cat-1/shadow/update");
        assert_eq!(Topic::StateGet.path("cat-1"), "$aws/things/cat-1/shadow/get");
        assert_eq!(
            config_subscription("cat-1"),
            "$aws/things/cat-1/shadow/get/accepted/desired/cfg"
        );
    }
}
