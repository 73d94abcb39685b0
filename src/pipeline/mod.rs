//! Change detection on top of the crawler.
//!
//! - `session`: one check run, from crawl to notification
//! - `schedule`: periodic trigger for sessions
//! - `compare`: offline diff of two partitions or snapshots

pub mod compare;
pub mod index;
pub mod schedule;
pub mod session;

pub use compare::{PartitionDiff, compare_partitions, compare_snapshot_files, diff_records};
pub use index::IdentityIndex;
pub use schedule::{Schedule, run_schedule};
pub use session::{
    ChangeSession, SessionPermit, SessionRegistry, SessionReport, SessionState, Watcher,
};
