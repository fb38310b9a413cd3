//! Domain model (ids, statuses, tasks, stages, messages, outcomes, errors).

pub mod errors;
pub mod ids;
pub mod message;
pub mod outcome;
pub mod stage;
pub mod status;
pub mod task;

pub use errors::{ErrorKind, SyncError};
pub use ids::{Id, IdMarker, NodeId, RecordId, SubscriptionId, SyncTaskId};
pub use message::{StageMessage, StatusChanged};
pub use outcome::{Outcome, OutcomeKind};
pub use stage::{Stage, START_TOPIC, STAGE_B_TOPIC, STAGE_C_TOPIC, STATUS_TOPIC};
pub use status::{TaskStatus, UnknownStatus};
pub use task::{SyncTask, TaskSummary};
