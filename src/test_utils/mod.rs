pub mod macros;
mod mocks;

pub use mocks::{
    Call, CallLog, FailingStore, MockConnector, MockPublisher, MockRemote, MockTransport, Probe,
    data_frames, fail_frames, live_batch, resolved, transactions,
};
