//! Observer pattern for the engine - pub/sub on segmentation events
//!
//! Observers are notified synchronously on the thread that drives the
//! engine. Nothing is queued; a slow observer slows the engine.

use std::ops::Range;
use std::sync::mpsc::Sender;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Orchestrator lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EngineState {
    /// No sequence in progress.
    Idle,
    /// Items arriving, field not yet settled on a boundary.
    Accumulating,
    /// Field converged with at least one boundary, or the sequence ended.
    ChunkReady,
}

/// Event emitted while sequences are segmented.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// The masking field produced boundaries.
    BoundariesDetected {
        boundaries: Vec<usize>,
        sequence_length: usize,
    },
    /// A chunk was chosen and handed to the classifier.
    ChunkReady {
        range: Range<usize>,
        /// Whether the chunk became a new learned template.
        new_template: bool,
    },
    /// The field hit its iteration cap; boundaries come from the final state.
    NonConvergence { iterations: usize, residual: f64 },
    /// Some scale has gates below the depletion threshold.
    GatesDepleted { per_scale: Vec<usize> },
    /// The streaming state machine moved.
    StateChanged { from: EngineState, to: EngineState },
}

/// Observer that receives engine events
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// Function-based observer for simple cases
pub struct FnObserver<F: Fn(EngineEvent) + Send + Sync>(pub F);

impl<F: Fn(EngineEvent) + Send + Sync> EngineObserver for FnObserver<F> {
    fn on_event(&self, event: EngineEvent) {
        (self.0)(event);
    }
}

/// Channel-based observer - sends events to a channel
pub struct ChannelObserver {
    sender: Sender<EngineEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<EngineEvent>) -> Self {
        Self { sender }
    }
}

impl EngineObserver for ChannelObserver {
    fn on_event(&self, event: EngineEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    #[test]
    fn test_fn_observer() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let observer = FnObserver(move |event| {
            if let EngineEvent::StateChanged { .. } = event {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        observer.on_event(EngineEvent::StateChanged {
            from: EngineState::Idle,
            to: EngineState::Accumulating,
        });
        observer.on_event(EngineEvent::GatesDepleted { per_scale: vec![0] });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        observer.on_event(EngineEvent::NonConvergence {
            iterations: 3,
            residual: 0.5,
        });
        assert!(matches!(
            rx.recv().unwrap(),
            EngineEvent::NonConvergence { iterations: 3, .. }
        ));

        drop(rx);
        observer.on_event(EngineEvent::GatesDepleted { per_scale: vec![] });
    }
}
