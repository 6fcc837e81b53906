//! Portage Transfer Engine
//!
//! Bulk file-transfer orchestration: [`TransferJob`] drives an open stream
//! of path records through a pool of workers over a pluggable
//! [`TransportClient`], with job-level retry, cancellation, per-path issue
//! logging, and aggregated statistics. [`PathEnumerator`] walks filesystem
//! roots into path records, either collected in memory or serialized into
//! size-bounded batch files for later replay.
//!
//! Progress is observable without polling: jobs and the enumerator emit
//! [`JobEvent`]s through an [`EventSink`] channel.

pub mod batch;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod events;
pub mod issues;
pub mod job;
pub mod request;
pub mod stats;
pub mod transport;

pub use batch::{read_batch, BatchDescriptor, BatchFile, BatchSummary, BatchWriter};
pub use config::{EnumerationOptions, JobOptions};
pub use enumerate::{EnumerationOutcome, PathEnumerator, SerializationOutcome};
pub use error::{FatalKind, JobError};
pub use events::{EventSink, JobEvent};
pub use issues::IssueLog;
pub use job::TransferJob;
pub use request::{JobStatus, PathResolver, TransferRequest, TransferResult};
pub use stats::{StatisticsAggregator, StatisticsSnapshot};
pub use transport::{
    ConnectionResult, LocalDirTransport, SupportResult, TransferOutcome, TransportClient,
    TransportFactory, TransportFatal, TransportRegistry,
};
