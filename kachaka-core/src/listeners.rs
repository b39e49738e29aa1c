//! Listener fan-out state machine.
//!
//! A subscriber runs at most one polling loop, however many listeners are
//! registered. This module tracks the listeners and the loop state without
//! doing any I/O; the subscriber drives it:
//!
//! ```text
//!            insert (while Idle)
//!   Idle ─────────────────────────► Polling ──┐ insert into an empty set:
//!    ▲                                 │ ▲    │ new generation, Restart
//!    │                                 │ └────┘
//!    │                                 │ recheck → fetch → snapshot
//!    │                                 │ → invoke → finish_dispatch
//!    ├──────── recheck (set empty) ◄───┤
//!    └──────────── fail ◄──────────────┘
//! ```
//!
//! Every time an empty set gains a listener the *generation* moves on. A
//! loop that sees a new generation at its re-check must start over from the
//! sentinel cursor, so the new listeners get the current value first even if
//! the loop never saw the set empty.
//!
//! Callbacks are handed out by [`ListenerSet::snapshot`] so the caller can
//! invoke them without holding whatever lock guards the set; a callback is
//! then free to add or remove listeners.

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// The raw identifier.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// How long a listener stays registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerKind {
    /// Until removed.
    #[default]
    Persistent,
    /// Removed after its first invocation.
    Once,
}

/// Whether the polling loop is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// No loop; no remote calls are made.
    #[default]
    Idle,
    /// A loop is fetching and dispatching.
    Polling,
}

/// What the caller must do after registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The set was idle: start a loop from the sentinel cursor.
    StartPolling,
    /// The set was empty but its loop has not stopped yet: wake the loop so
    /// it restarts from the sentinel cursor.
    Restart,
    /// A loop is already serving other listeners.
    AlreadyPolling,
}

/// What the loop must do after a re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    /// Listeners remain: fetch again.
    Continue,
    /// The set was refilled since the loop last looked: reset the bookmark
    /// and carry on with `generation`.
    Restart {
        /// The generation to check against from now on.
        generation: u64,
    },
    /// The set is empty and the state is now `Idle`: exit the loop.
    Stop,
}

#[derive(Debug, Clone)]
struct Entry<C> {
    id: ListenerId,
    kind: ListenerKind,
    callback: C,
}

/// Registered listeners plus the loop state, in registration order.
#[derive(Debug, Clone)]
pub struct ListenerSet<C> {
    entries: Vec<Entry<C>>,
    state: LoopState,
    generation: u64,
    next_id: u64,
}

impl<C> Default for ListenerSet<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            state: LoopState::Idle,
            generation: 0,
            next_id: 0,
        }
    }
}

impl<C: Clone> ListenerSet<C> {
    /// Create an empty, idle set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// How many times an empty set has gained a listener.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Allocate an identifier without registering anything.
    ///
    /// Shares the counter with [`ListenerSet::insert`], so identifiers handed
    /// to side registries never collide with listener identifiers.
    pub fn allocate_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Register a listener.
    ///
    /// Moves an idle set to `Polling` and tells the caller to start a loop.
    /// Inserting into an empty set that is still `Polling` starts a new
    /// generation instead.
    pub fn insert(&mut self, callback: C, kind: ListenerKind) -> (ListenerId, Transition) {
        let id = self.allocate_id();
        let was_empty = self.entries.is_empty();
        self.entries.push(Entry { id, kind, callback });
        if was_empty {
            self.generation = self.generation.wrapping_add(1);
        }

        let transition = match self.state {
            LoopState::Idle => {
                self.state = LoopState::Polling;
                Transition::StartPolling
            }
            LoopState::Polling if was_empty => Transition::Restart,
            LoopState::Polling => Transition::AlreadyPolling,
        };
        (id, transition)
    }

    /// Unregister a listener. Returns whether it was registered.
    ///
    /// Does not change the loop state; the loop notices at its next re-check.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// The listeners to invoke for one delivery, in registration order.
    pub fn snapshot(&self) -> Vec<(ListenerId, C)> {
        self.entries
            .iter()
            .map(|e| (e.id, e.callback.clone()))
            .collect()
    }

    /// Record that `delivered` were invoked.
    ///
    /// `Once` listeners among them are removed; the loop notices an emptied
    /// set at its next re-check.
    pub fn finish_dispatch(&mut self, delivered: &[ListenerId]) {
        self.entries
            .retain(|e| !(e.kind == ListenerKind::Once && delivered.contains(&e.id)));
    }

    /// Decide the loop's next step, given the generation it is serving.
    ///
    /// Goes idle if the set is empty.
    pub fn recheck(&mut self, generation: u64) -> LoopControl {
        if self.entries.is_empty() {
            self.state = LoopState::Idle;
            LoopControl::Stop
        } else if self.generation != generation {
            LoopControl::Restart {
                generation: self.generation,
            }
        } else {
            LoopControl::Continue
        }
    }

    /// The loop hit a fatal error: drop every listener and go idle.
    ///
    /// Returns how many listeners were dropped.
    pub fn fail(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.state = LoopState::Idle;
        dropped
    }
}
