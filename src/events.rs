//! Management events emitted on join/leave and talker transitions.
//!
//! Sessions publish [`ManagerEvent`]s through an [`EventBus`], a cheap
//! cloneable handle over a flume channel. The consuming side (a manager
//! interface, a test harness) holds the receiver; a departed consumer never
//! blocks or fails a session.

use flume::{Receiver, Sender};
use serde::Serialize;
use std::fmt;
use tracing::trace;

/// Classes of management event a conference session can emit.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum EventKind {
    /// A participant joined a conference.
    #[serde(rename = "MeetmeJoin")]
    Join,
    /// A participant left a conference.
    #[serde(rename = "MeetmeLeave")]
    Leave,
    /// A monitored participant started talking.
    #[serde(rename = "MeetmeTalking")]
    Talking,
    /// A monitored participant stopped talking.
    #[serde(rename = "MeetmeStopTalking")]
    StopTalking,
}

impl EventKind {
    /// The manager-wire name of this event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Join => "MeetmeJoin",
            EventKind::Leave => "MeetmeLeave",
            EventKind::Talking => "MeetmeTalking",
            EventKind::StopTalking => "MeetmeStopTalking",
        }
    }
}

/// One management event, carrying the classic field set in wire order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ManagerEvent {
    /// Which event occurred.
    #[serde(rename = "Event")]
    pub kind: EventKind,
    /// Name of the channel attached to the conference.
    #[serde(rename = "Channel")]
    pub channel: String,
    /// The channel's globally unique call identifier.
    #[serde(rename = "Uniqueid")]
    pub unique_id: String,
    /// Conference number.
    #[serde(rename = "Meetme")]
    pub meetme: String,
    /// Participant number within the conference.
    #[serde(rename = "Usernum")]
    pub usernum: u32,
}

impl fmt::Display for ManagerEvent {
    /// Renders the event as a `Key: value` manager block.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event: {}\r\nChannel: {}\r\nUniqueid: {}\r\nMeetme: {}\r\nUsernum: {}\r\n",
            self.kind.as_str(),
            self.channel,
            self.unique_id,
            self.meetme,
            self.usernum
        )
    }
}

/// Sending half of the management event stream.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: Option<Sender<ManagerEvent>>,
}

impl EventBus {
    /// Wraps an existing sender.
    #[must_use]
    pub fn new(tx: Sender<ManagerEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A bus that discards everything, for callers with no manager interface.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Creates a connected bus/receiver pair.
    #[must_use]
    pub fn pair() -> (Self, Receiver<ManagerEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self::new(tx), rx)
    }

    /// Publishes one event. Send failures are swallowed: the consumer may
    /// legitimately be gone, and a session must never stall on it.
    pub fn emit(&self, event: ManagerEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                trace!("manager event dropped: no consumer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: EventKind) -> ManagerEvent {
        ManagerEvent {
            kind,
            channel: "TEST/alice-0001".into(),
            unique_id: "1700000000.17".into(),
            meetme: "1000".into(),
            usernum: 2,
        }
    }

    #[test]
    fn wire_block_preserves_field_order() {
        let rendered = sample(EventKind::Join).to_string();
        assert_eq!(
            rendered,
            "Event: MeetmeJoin\r\nChannel: TEST/alice-0001\r\nUniqueid: 1700000000.17\r\n\
             Meetme: 1000\r\nUsernum: 2\r\n"
        );
        let chan = rendered.find("Channel").unwrap();
        let uid = rendered.find("Uniqueid").unwrap();
        let meetme = rendered.find("Meetme:").unwrap();
        assert!(chan < uid && uid < meetme);
    }

    #[test]
    fn json_form_uses_manager_names() {
        let json = serde_json::to_value(sample(EventKind::StopTalking)).unwrap();
        assert_eq!(json["Event"], "MeetmeStopTalking");
        assert_eq!(json["Usernum"], 2);
    }

    #[test]
    fn disabled_bus_swallows_events() {
        EventBus::disabled().emit(sample(EventKind::Leave));
    }

    #[test]
    fn pair_delivers_in_order() {
        let (bus, rx) = EventBus::pair();
        bus.emit(sample(EventKind::Join));
        bus.emit(sample(EventKind::Leave));
        assert_eq!(rx.recv().unwrap().kind, EventKind::Join);
        assert_eq!(rx.recv().unwrap().kind, EventKind::Leave);
    }
}
