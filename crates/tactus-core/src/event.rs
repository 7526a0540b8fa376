//! Note events delivered to the input-feed stage.

use crate::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteEventKind {
    NoteOn,
    NoteOff,
    KeyPressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    pub pitch: u8,
    /// 0.0..=1.0
    pub velocity: f32,
    /// Frame offset inside the cycle the event is delivered in.
    pub timestamp: u32,
    /// Raw id of the audio object addressed.
    pub target: u64,
}

impl NoteEvent {
    pub fn note_on(target: u64, pitch: u8, velocity: f32) -> Self {
        Self {
            kind: NoteEventKind::NoteOn,
            pitch,
            velocity,
            timestamp: 0,
            target,
        }
    }

    pub fn note_off(target: u64, pitch: u8) -> Self {
        Self {
            kind: NoteEventKind::NoteOff,
            pitch,
            velocity: 0.0,
            timestamp: 0,
            target,
        }
    }

    pub fn key_pressure(target: u64, pitch: u8, pressure: f32) -> Self {
        Self {
            kind: NoteEventKind::KeyPressure,
            pitch,
            velocity: pressure,
            timestamp: 0,
            target,
        }
    }

    pub fn at(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Producer handle, cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<NoteEvent>,
}

impl EventSender {
    /// Never blocks. A full queue drops the event.
    pub fn send(&self, event: NoteEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) | TrySendError::Disconnected(_) => Error::EventQueueFull,
        })
    }
}

/// Bounded MPSC queue drained once per cycle by the driver.
pub struct EventQueue {
    tx: Sender<NoteEvent>,
    rx: Receiver<NoteEvent>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Move every pending event into `out`, ordered by timestamp.
    pub fn drain_into(&self, out: &mut Vec<NoteEvent>) {
        out.extend(self.rx.try_iter());
        out.sort_by_key(|e| e.timestamp);
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
