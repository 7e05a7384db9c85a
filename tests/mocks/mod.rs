pub mod mock_engines;
pub mod recording_observer;

pub use mock_engines::{
    CancelDuring, CancellingEngine, CloseFailingEngine, FailingEngine, FailurePoint,
    ShufflingEngine,
};
pub use recording_observer::{ObservedEvent, RecordingObserver};
