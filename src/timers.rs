/// When a scheduled action becomes due.
///
/// An action never fires in the frame that scheduled it, and not before the
/// simulated clock reaches `at_time`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Deadline {
    pub after_frame: u64,
    pub at_time: f64,
}

impl Deadline {
    pub fn is_due(&self, frame: u64, time: f64) -> bool {
        frame > self.after_frame && time >= self.at_time
    }
}

/// Deferred actions, drained by the frame driver.
#[derive(Clone, Debug)]
pub struct TimerQueue<T> {
    pending: Vec<(Deadline, T)>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self { pending: Vec::new() }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Deadline, action: T) {
        self.pending.push((deadline, action));
    }

    /// Remove and return every action due at `frame` / `time`, in schedule order.
    pub fn drain_due(&mut self, frame: u64, time: f64) -> Vec<T> {
        let mut due = Vec::new();
        let mut keep = Vec::with_capacity(self.pending.len());
        for (deadline, action) in self.pending.drain(..) {
            if deadline.is_due(frame, time) {
                due.push(action);
            } else {
                keep.push((deadline, action));
            }
        }
        self.pending = keep;
        due
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Keep only the actions for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.pending.retain(|(_, action)| keep(action));
    }
}
