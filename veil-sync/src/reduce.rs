//! Per-channel lite-snapshot reduction.
//!
//! A [`ChannelCursor`] remembers what a logical broadcast channel has
//! already transmitted — the `(generation, identity)` of the last image
//! whose payload actually went over the wire, and the event-log length
//! last sent. All viewers on a channel share one cursor (the channel, not
//! the connection, is the unit of cache coherency; late joiners get their
//! payload through the pull path instead).
//!
//! Keying on the generation closes the cross-session staleness hole: a
//! full-state load bumps the generation, so an identity that happens to
//! collide with one from a previous session can never suppress the
//! payload.

use veil_core::Snapshot;

use crate::protocol::SnapshotFrame;

/// History cursor for one logical broadcast channel.
#[derive(Debug, Default)]
pub struct ChannelCursor {
    /// `(generation, identity)` of the last image payload transmitted.
    image_sent: Option<(u64, String)>,
    /// `(generation, length)` of the event log last transmitted.
    events_sent: Option<(u64, usize)>,
}

impl ChannelCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project a snapshot into the frame this channel should transmit,
    /// stripping payloads the channel already holds.
    pub fn reduce(&mut self, snapshot: &Snapshot) -> SnapshotFrame {
        let mut out = snapshot.clone();
        let generation = out.state.generation;

        let mut image_elided = false;
        match out.state.image.as_mut() {
            Some(image) => {
                let key = (generation, image.identity.clone());
                if self.image_sent.as_ref() == Some(&key) {
                    log::trace!("eliding image payload for {}", image.identity);
                    image.payload = Vec::new();
                    image_elided = true;
                } else {
                    self.image_sent = Some(key);
                }
            }
            None => self.image_sent = None,
        }

        let events_key = (generation, out.state.events.len());
        let events_elided = if self.events_sent == Some(events_key) {
            out.state.events = Vec::new();
            true
        } else {
            self.events_sent = Some(events_key);
            false
        };

        SnapshotFrame {
            snapshot: out,
            image_elided,
            events_elided,
        }
    }

    /// Forget everything transmitted; the next frame is full.
    pub fn reset(&mut self) {
        self.image_sent = None;
        self.events_sent = None;
    }
}
