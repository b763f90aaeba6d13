//! Controller events
//!
//! The controller never calls out synchronously on state changes; it
//! parks events in a small FIFO that the host polls (or drains into its
//! `on_event` sink) once per frame.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::EVENT_QUEUE_DEPTH;
use crate::input::GameInput;

/// Events emitted by the sync controller.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A remote input was accepted into its queue at the given frame.
    ConfirmedInput { input: GameInput },
}

#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: VecDeque<SyncEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(EVENT_QUEUE_DEPTH),
        }
    }

    /// Push an event, dropping it when the host hasn't polled for a
    /// full queue's worth. Events are advisory; losing one is logged
    /// but never fatal.
    pub fn push(&mut self, event: SyncEvent) {
        if self.events.len() >= EVENT_QUEUE_DEPTH {
            debug!("event queue full, dropping {:?}", event);
            return;
        }
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<SyncEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(frame: i32) -> SyncEvent {
        SyncEvent::ConfirmedInput {
            input: GameInput::new(frame, &[0; 4]),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = EventQueue::new();
        queue.push(event(1));
        queue.push(event(2));

        let SyncEvent::ConfirmedInput { input } = queue.pop().unwrap();
        assert_eq!(input.frame, 1);
        let SyncEvent::ConfirmedInput { input } = queue.pop().unwrap();
        assert_eq!(input.frame, 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_newest() {
        let mut queue = EventQueue::new();
        for frame in 0..EVENT_QUEUE_DEPTH as i32 + 4 {
            queue.push(event(frame));
        }
        assert_eq!(queue.len(), EVENT_QUEUE_DEPTH);

        let SyncEvent::ConfirmedInput { input } = queue.pop().unwrap();
        assert_eq!(input.frame, 0);
    }
}
