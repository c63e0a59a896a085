//! Worker lifecycle states and their debounced reporting.

use super::debounce::Debouncer;
use log::warn;
use std::fmt;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Default quiescence window before an `Idle` state is reported.
pub const DEFAULT_IDLE_DEBOUNCE: Duration = Duration::from_millis(100);

/// What a worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkerState {
    /// Handle exists, engine not requested yet.
    #[default]
    Created,
    /// Engine is being instantiated.
    Loading,
    /// Engine is ready, no request served yet.
    Loaded,
    /// Waiting for requests.
    Idle,
    /// Evaluating source text.
    Eval,
    /// Computing one row.
    Compute {
        /// Row being computed.
        row: u32,
    },
}

impl WorkerState {
    /// Whether this is [`WorkerState::Idle`].
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Created → Loading → Loaded happens once; afterwards the worker
    /// cycles between Idle and Eval/Compute.
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Loading)
                | (Self::Loading, Self::Loaded)
                | (Self::Loaded | Self::Idle, Self::Eval | Self::Compute { .. })
                | (Self::Loaded | Self::Eval | Self::Compute { .. }, Self::Idle)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Loading => f.write_str("loading"),
            Self::Loaded => f.write_str("loaded"),
            Self::Idle => f.write_str("idle"),
            Self::Eval => f.write_str("eval"),
            Self::Compute { row } => write!(f, "compute row {row}"),
        }
    }
}

/// A worker's state plus its single, debounced subscriber.
///
/// Non-idle transitions reach the listener synchronously. `Idle` is
/// reported only after the worker stayed idle for the debounce window.
pub struct StateMachine {
    id: usize,
    current: Mutex<WorkerState>,
    reporter: Debouncer<WorkerState>,
}

impl StateMachine {
    /// Create the state machine of worker `id`, starting in `Created`.
    pub fn new(id: usize, idle_debounce: Duration) -> io::Result<Self> {
        let reporter = Debouncer::spawn(
            format!("scanline-state-{id}"),
            idle_debounce,
            WorkerState::is_idle,
        )?;
        Ok(Self {
            id,
            current: Mutex::new(WorkerState::Created),
            reporter,
        })
    }

    /// The state the worker is in, regardless of what was reported.
    pub fn current(&self) -> WorkerState {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` and report it.
    pub fn transition(&self, next: WorkerState) {
        {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if !current.can_transition_to(&next) {
                warn!("worker {}: unexpected transition {} -> {}", self.id, *current, next);
            }
            *current = next;
        }
        self.reporter.push(next);
    }

    /// Register the listener, replacing any previous one.
    pub fn subscribe(&self, mut listener: impl FnMut(WorkerState) + Send + 'static) {
        self.reporter.set_listener(move |state: &WorkerState| listener(*state));
    }

    /// Drop the listener.
    pub fn unsubscribe(&self) {
        self.reporter.clear_listener();
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.id)
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::thread;

    fn recording(window: Duration) -> (StateMachine, crossbeam_channel::Receiver<WorkerState>) {
        let machine = StateMachine::new(0, window).unwrap();
        let (tx, rx) = unbounded();
        machine.subscribe(move |state| {
            let _ = tx.send(state);
        });
        (machine, rx)
    }

    #[test]
    fn test_lifecycle_transitions() {
        use WorkerState::*;
        assert!(Created.can_transition_to(&Loading));
        assert!(Loading.can_transition_to(&Loaded));
        assert!(Loaded.can_transition_to(&Eval));
        assert!(Idle.can_transition_to(&Compute { row: 3 }));
        assert!(Compute { row: 3 }.can_transition_to(&Idle));
        assert!(Eval.can_transition_to(&Idle));

        assert!(!Loaded.can_transition_to(&Loading));
        assert!(!Idle.can_transition_to(&Loaded));
        assert!(!Eval.can_transition_to(&Compute { row: 0 }));
        assert!(!Created.can_transition_to(&Idle));
    }

    #[test]
    fn test_non_idle_reported_immediately() {
        let (machine, rx) = recording(DEFAULT_IDLE_DEBOUNCE);
        machine.transition(WorkerState::Loading);
        machine.transition(WorkerState::Loaded);
        machine.transition(WorkerState::Eval);

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![WorkerState::Loading, WorkerState::Loaded, WorkerState::Eval]
        );
        assert_eq!(machine.current(), WorkerState::Eval);
    }

    #[test]
    fn test_compute_burst_reports_single_idle() {
        let (machine, rx) = recording(DEFAULT_IDLE_DEBOUNCE);
        machine.transition(WorkerState::Loading);
        machine.transition(WorkerState::Loaded);
        machine.transition(WorkerState::Idle);
        for row in (0..4).rev() {
            machine.transition(WorkerState::Compute { row });
            machine.transition(WorkerState::Idle);
        }
        assert_eq!(machine.current(), WorkerState::Idle);

        thread::sleep(Duration::from_millis(300));
        let seen: Vec<_> = rx.try_iter().collect();

        let computes: Vec<_> = seen
            .iter()
            .filter_map(|s| match s {
                WorkerState::Compute { row } => Some(*row),
                _ => None,
            })
            .collect();
        assert_eq!(computes, vec![3, 2, 1, 0]);
        assert_eq!(seen.iter().filter(|s| s.is_idle()).count(), 1);
        assert_eq!(seen.last(), Some(&WorkerState::Idle));
    }

    #[test]
    fn test_resubscribe_replaces_listener() {
        let (machine, first) = recording(DEFAULT_IDLE_DEBOUNCE);
        let (tx, second) = unbounded();
        machine.subscribe(move |state| {
            let _ = tx.send(state);
        });

        machine.transition(WorkerState::Loading);

        assert!(first.try_recv().is_err());
        assert_eq!(second.try_recv(), Ok(WorkerState::Loading));
    }

    #[test]
    fn test_display() {
        assert_eq!(WorkerState::Compute { row: 12 }.to_string(), "compute row 12");
        assert_eq!(WorkerState::Idle.to_string(), "idle");
    }
}
