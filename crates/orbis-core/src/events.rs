//! Per-name synchronous event channels.
//!
//! Each event name owns an ordered list of listeners. [`EventChannel::dispatch`] invokes
//! them in registration order on the calling thread; there is no global bus and no
//! queuing.

use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Handle returned by [`EventChannel::on`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<P> = Box<dyn FnMut(&P)>;

/// Listener registry for a closed set of event names `E` carrying payload `P`.
pub struct EventChannel<E, P> {
    listeners: FxHashMap<E, Vec<(ListenerId, Listener<P>)>>,
    next_id: u64,
}

impl<E: Copy + Eq + Hash, P> EventChannel<E, P> {
    pub fn new() -> Self {
        Self {
            listeners: FxHashMap::default(),
            next_id: 0,
        }
    }

    /// Subscribes `listener` to `event`. Listeners run in the order they were added.
    pub fn on(&mut self, event: E, listener: impl FnMut(&P) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners
            .entry(event)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if the id was unknown.
    pub fn off(&mut self, id: ListenerId) -> bool {
        for list in self.listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(lid, _)| *lid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Calls every listener of `event` with `payload`.
    pub fn dispatch(&mut self, event: E, payload: &P) {
        if let Some(list) = self.listeners.get_mut(&event) {
            for (_, listener) in list.iter_mut() {
                listener(payload);
            }
        }
    }

    pub fn has_listeners(&self, event: E) -> bool {
        self.listeners.get(&event).is_some_and(|l| !l.is_empty())
    }

    pub fn listener_count(&self, event: E) -> usize {
        self.listeners.get(&event).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl<E: Copy + Eq + Hash, P> Default for EventChannel<E, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, P> std::fmt::Debug for EventChannel<E, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("events", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Ev {
        A,
        B,
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut channel: EventChannel<Ev, u32> = EventChannel::new();
        for tag in 0..3 {
            let log = Rc::clone(&log);
            channel.on(Ev::A, move |p| log.borrow_mut().push((tag, *p)));
        }
        channel.dispatch(Ev::A, &7);
        assert_eq!(*log.borrow(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_events_are_independent() {
        let hits = Rc::new(RefCell::new(0));
        let mut channel: EventChannel<Ev, ()> = EventChannel::new();
        let h = Rc::clone(&hits);
        channel.on(Ev::B, move |_| *h.borrow_mut() += 1);
        channel.dispatch(Ev::A, &());
        assert_eq!(*hits.borrow(), 0);
        channel.dispatch(Ev::B, &());
        assert_eq!(*hits.borrow(), 1);
        assert!(channel.has_listeners(Ev::B));
        assert!(!channel.has_listeners(Ev::A));
    }

    #[test]
    fn test_off_removes_listener() {
        let hits = Rc::new(RefCell::new(0));
        let mut channel: EventChannel<Ev, ()> = EventChannel::new();
        let h = Rc::clone(&hits);
        let id = channel.on(Ev::A, move |_| *h.borrow_mut() += 1);
        assert!(channel.off(id));
        assert!(!channel.off(id));
        channel.dispatch(Ev::A, &());
        assert_eq!(*hits.borrow(), 0);
        assert!(!channel.has_listeners(Ev::A));
    }
}
