// # l2sync-core
//
// Core library for replicating a CDN edge-node IP list into firewall
// address-book groups.
//
// ## Architecture Overview
//
// - **SourceIpProvider**: Trait for fetching the edge-node IP list
// - **AddressBookClient**: Trait for the raw address book API
// - **AddressBookSyncer**: Trait for create-or-replace of one group
// - **SyncEngine**: Executes one pass (fetch → normalize → filter → push)
// - **Scheduler**: Drives passes on a cron expression or fixed interval
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Vendor clients live in their own crates
// 2. **Full Replace**: Every push carries the whole group membership
// 3. **Fault Isolation**: One failing group never stops the others
// 4. **Library-First**: The daemon is a thin shell over this crate

pub mod traits;
pub mod config;
pub mod duration;
pub mod engine;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod scheduler;
pub mod syncer;
pub mod task;

// Re-export core types for convenience
pub use traits::{
    AddressBook, AddressBookClient, AddressBookPage, AddressBookSyncer, SourceIpProvider,
    SourceIpRecord, SyncOutcome,
};
pub use config::{
    AddressGroupSpec, CloudAccountConfig, Config, IpType, LogFormat, LoggingConfig,
    SchedulerConfig, SyncConfig,
};
pub use engine::{RetryPolicy, SyncEngine};
pub use error::{Error, Result};
pub use scheduler::{
    CronSchedule, ScheduleMode, Scheduler, SchedulerHandle, SchedulerState, SchedulerStatus,
};
pub use syncer::GroupSyncer;
pub use task::{GroupResult, SyncTask, TaskStatus, TaskSummary};
