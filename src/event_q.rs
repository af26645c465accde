// implements a time-ordered event queue with discrete ticks

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::commons::Tick;

/// Anything that lets a component ask to be woken up later with event `E`.
pub trait Schedule<E> {
    fn cur_tick(&self) -> Tick;
    fn schedule_at(&mut self, when: Tick, ev: E);
    fn schedule_in(&mut self, delay: Tick, ev: E) {
        let when = self.cur_tick() + delay;
        self.schedule_at(when, ev);
    }
}

// timed event type

/*
    `t` is the absolute tick at which the event fires. `ord` increases monotonically
    with every insertion and orders events that share a tick, so that events
    scheduled for the same tick fire in the order they were scheduled.
 */

struct TimedEvent<E> {
    t: Tick,
    ord: u64,
    ev: E,
}

impl<E> Eq for TimedEvent<E> {}

impl<E> PartialEq for TimedEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        (self.t, self.ord) == (other.t, other.ord)
    }
}

impl<E> Ord for TimedEvent<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed, BinaryHeap is a max-heap
        (other.t, other.ord).cmp(&(self.t, self.ord))
    }
}

impl<E> PartialOrd for TimedEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// event queue

pub struct EventQueue<E> {
    q: BinaryHeap<TimedEvent<E>>,
    time: Tick,
    ord_ctr: u64,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        EventQueue {
            q: BinaryHeap::new(),
            time: 0,
            ord_ctr: 0,
        }
    }
    pub fn now(&self) -> Tick {
        self.time
    }
    pub fn len(&self) -> usize {
        self.q.len()
    }
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
    pub fn push(&mut self, when: Tick, ev: E) {
        assert!(
            when >= self.time,
            "event scheduled in the past (tick {} < now {})", when, self.time
        );
        self.q.push(TimedEvent { t: when, ord: self.ord_ctr, ev });
        self.ord_ctr += 1;
    }
    pub fn peek_tick(&self) -> Option<Tick> {
        self.q.peek().map(|te| te.t)
    }
    /// Remove the earliest event and advance the clock to its tick.
    pub fn pop(&mut self) -> Option<(Tick, E)> {
        let TimedEvent { t, ev, .. } = self.q.pop()?;
        self.time = t;
        Some((t, ev))
    }
}

impl<E> Schedule<E> for EventQueue<E> {
    fn cur_tick(&self) -> Tick {
        self.time
    }
    fn schedule_at(&mut self, when: Tick, ev: E) {
        self.push(when, ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_tick_order() {
        let mut q = EventQueue::new();
        q.push(5, 'c');
        q.push(1, 'a');
        q.push(3, 'b');
        assert_eq!(q.pop(), Some((1, 'a')));
        assert_eq!(q.now(), 1);
        assert_eq!(q.pop(), Some((3, 'b')));
        assert_eq!(q.pop(), Some((5, 'c')));
        assert_eq!(q.pop(), None);
        assert_eq!(q.now(), 5);
    }

    #[test]
    #[should_panic(expected = "scheduled in the past")]
    fn refuses_the_past() {
        let mut q = EventQueue::new();
        q.push(4, ());
        q.pop();
        q.push(3, ());
    }
}
