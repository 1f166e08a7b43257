//! Passive observation of response frames addressed to other bus devices.
//!
//! The thermostat polls the air handler and heat pump continuously; their
//! replies cross our receiver anyway, so observers register a source address
//! range and get a copy of every matching response without ever touching
//! the wire.

use std::sync::Mutex;

use crate::frame::Frame;

pub type SnoopCallback = Box<dyn Fn(Frame) + Send + 'static>;

struct SnoopEntry {
    src_min: u16,
    src_max: u16,
    callback: SnoopCallback,
}

/// Ordered, append-only observer registry. Registration is additive;
/// observers live for the life of the engine. The list is read-heavy: one
/// registration burst at startup, then a lookup per snooped frame.
pub struct SnoopList {
    entries: Mutex<Vec<SnoopEntry>>,
}

impl SnoopList {
    pub fn new() -> Self {
        SnoopList {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, src_min: u16, src_max: u16, callback: SnoopCallback) {
        self.entries.lock().unwrap().push(SnoopEntry {
            src_min,
            src_max,
            callback,
        });
    }

    /// Deliver a clone of `frame` to every observer whose range covers the
    /// frame's source. Callbacks run synchronously on the caller's task.
    pub fn handle(&self, frame: &Frame) {
        let entries = self.entries.lock().unwrap();
        for entry in entries.iter() {
            if frame.src >= entry.src_min && frame.src <= entry.src_max {
                (entry.callback)(frame.clone());
            }
        }
    }
}

impl Default for SnoopList {
    fn default() -> Self {
        SnoopList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Op;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn frame_from(src: u16) -> Frame {
        Frame {
            dst: 0x2001,
            src,
            op: Op::Ack06,
            data: vec![0x00, 0x3e, 0x01, 0x01],
        }
    }

    #[test]
    fn source_range_filtering() {
        let snoops = SnoopList::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        snoops.register(
            0x5000,
            0x51ff,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        snoops.handle(&frame_from(0x4fff));
        snoops.handle(&frame_from(0x5000));
        snoops.handle(&frame_from(0x5001));
        snoops.handle(&frame_from(0x51ff));
        snoops.handle(&frame_from(0x5200));

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn overlapping_ranges_each_get_a_copy() {
        let snoops = SnoopList::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        snoops.register(
            0x4000,
            0x42ff,
            Box::new(move |frame| {
                assert_eq!(frame.src, 0x4001);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = second.clone();
        snoops.register(
            0x4000,
            0x5fff,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        snoops.handle(&frame_from(0x4001));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
