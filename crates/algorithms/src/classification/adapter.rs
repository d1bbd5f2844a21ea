//! Background training and the classifier state machine
//!
//! ```text
//! Untrained ──train──▶ Training ──ok──▶ Trained
//!     ▲                   │                │
//!     └──cancel/failure───┘◀─────train─────┘
//! ```
//!
//! A retrain keeps serving the previous model until the new one is ready;
//! cancelling or failing a retrain restores it.

use super::classifier::{ClassifierKind, ClassifierParams, TrainedClassifier, TrainingContext, create_classifier};
use super::samples::Samples;
use super::training::ClassificationModel;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use terraclass_core::{Error, LandcoverType, Result};
use terraclass_parallel::CancelToken;
use tracing::{info, warn};

/// Observable adapter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    Untrained,
    Training,
    Trained,
}

/// Messages from a background training run
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingEvent {
    /// Fraction complete in `[0, 1]`
    Progress(f64),
    Completed { samples: usize, classes: usize },
    Cancelled,
    Failed(String),
}

#[derive(Debug)]
enum State {
    Untrained,
    Training {
        previous: Option<Arc<TrainedClassifier>>,
        cancel: CancelToken,
    },
    Trained(Arc<TrainedClassifier>),
}

/// Front end for one pluggable algorithm
#[derive(Debug, Clone)]
pub struct ClassifierAdapter {
    kind: ClassifierKind,
    params: ClassifierParams,
    state: Arc<Mutex<State>>,
}

/// A running training job
#[derive(Debug)]
pub struct TrainingHandle {
    cancel: CancelToken,
    events: Receiver<TrainingEvent>,
    thread: JoinHandle<Result<()>>,
}

impl TrainingHandle {
    /// Ask the job to stop at its next iteration boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Progress and the terminal event; disconnects when the job ends
    pub fn events(&self) -> &Receiver<TrainingEvent> {
        &self.events
    }

    /// Block until the job ends. Cancellation yields `TrainingCancelled`.
    pub fn wait(self) -> Result<()> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(Error::Training("training thread panicked".into())))
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl ClassifierAdapter {
    pub fn new(kind: ClassifierKind, params: ClassifierParams) -> Self {
        Self {
            kind,
            params,
            state: Arc::new(Mutex::new(State::Untrained)),
        }
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    pub fn status(&self) -> AdapterStatus {
        match *lock(&self.state) {
            State::Untrained => AdapterStatus::Untrained,
            State::Training { .. } => AdapterStatus::Training,
            State::Trained(_) => AdapterStatus::Trained,
        }
    }

    /// Start training on a background thread.
    ///
    /// The snapshot is owned by the job, so the training set it came from
    /// can keep changing. Fails when a job is already running.
    pub fn train(&self, model: ClassificationModel) -> Result<TrainingHandle> {
        let cancel = CancelToken::new();
        {
            let mut state = lock(&self.state);
            let previous = match &*state {
                State::Training { .. } => {
                    return Err(Error::Training("training already in progress".into()));
                }
                State::Untrained => None,
                State::Trained(current) => Some(Arc::clone(current)),
            };
            *state = State::Training {
                previous,
                cancel: cancel.clone(),
            };
        }

        let (tx, rx) = unbounded();
        let job = Job {
            state: Arc::clone(&self.state),
            kind: self.kind,
            params: self.params.clone(),
            cancel: cancel.clone(),
            events: tx,
        };
        let spawned = thread::Builder::new()
            .name("terraclass-train".into())
            .spawn(move || job.run(model));

        match spawned {
            Ok(thread) => Ok(TrainingHandle {
                cancel,
                events: rx,
                thread,
            }),
            Err(e) => {
                restore_previous(&mut lock(&self.state));
                Err(Error::Io(e))
            }
        }
    }

    /// Train on the calling thread
    pub fn train_blocking(&self, model: ClassificationModel) -> Result<()> {
        self.train(model)?.wait()
    }

    /// Cancel the running job, if any
    pub fn cancel(&self) {
        if let State::Training { cancel, .. } = &*lock(&self.state) {
            cancel.cancel();
        }
    }

    /// The model predictions are served from.
    ///
    /// During a retrain this is the previous model.
    pub fn trained(&self) -> Result<Arc<TrainedClassifier>> {
        match &*lock(&self.state) {
            State::Trained(m) | State::Training { previous: Some(m), .. } => Ok(Arc::clone(m)),
            _ => Err(Error::NotTrained),
        }
    }

    pub fn predict(&self, features: &[f64]) -> Result<LandcoverType> {
        self.trained()?.predict(features)
    }

    pub fn predict_batch<V: AsRef<[f64]>>(&self, vectors: &[V]) -> Result<Vec<LandcoverType>> {
        self.trained()?.predict_batch(vectors)
    }

    pub fn class_probability(&self, features: &[f64], class_index: usize) -> Result<f64> {
        self.trained()?.class_probability(features, class_index)
    }
}

/// Leave the training state for whatever came before it
fn restore_previous(state: &mut State) {
    let previous = match std::mem::replace(state, State::Untrained) {
        State::Training { previous, .. } => previous,
        other => {
            *state = other;
            return;
        }
    };
    if let Some(m) = previous {
        *state = State::Trained(m);
    }
}

struct Job {
    state: Arc<Mutex<State>>,
    kind: ClassifierKind,
    params: ClassifierParams,
    cancel: CancelToken,
    events: Sender<TrainingEvent>,
}

impl Job {
    fn run(self, model: ClassificationModel) -> Result<()> {
        info!(classifier = %self.kind, samples = model.len(), "training started");
        let events = &self.events;
        let progress = |f: f64| {
            let _ = events.send(TrainingEvent::Progress(f));
        };
        let ctx = TrainingContext {
            cancel: &self.cancel,
            progress: &progress,
        };
        let classifier = create_classifier(self.kind, &self.params);
        let result = Samples::from_model(&model).and_then(|samples| {
            let trained = TrainedClassifier::fit(classifier.as_ref(), model.descriptor.clone(), &samples, &ctx)?;
            ctx.check_cancelled()?;
            Ok((trained, samples.len()))
        });

        let mut state = lock(&self.state);
        match result {
            Ok((trained, samples)) => {
                let classes = trained.classes().len();
                *state = State::Trained(Arc::new(trained));
                drop(state);
                info!(classifier = %self.kind, samples, classes, "training completed");
                let _ = self.events.send(TrainingEvent::Completed { samples, classes });
                Ok(())
            }
            Err(Error::TrainingCancelled) => {
                restore_previous(&mut state);
                drop(state);
                info!(classifier = %self.kind, "training cancelled");
                let _ = self.events.send(TrainingEvent::Cancelled);
                Err(Error::TrainingCancelled)
            }
            Err(e) => {
                restore_previous(&mut state);
                drop(state);
                warn!(classifier = %self.kind, error = %e, "training failed");
                let _ = self.events.send(TrainingEvent::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}
