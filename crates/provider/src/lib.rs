//! Provider collaborators for nightshift.
//!
//! This crate provides:
//! - Narrow traits for each remote contract the scheduler consumes
//!   (inventory, power control, autoscaling membership, alarm discovery,
//!   alarm mutation)
//! - `AwsCloud`, backed by the EC2, Auto Scaling and CloudWatch SDKs
//! - `InMemoryCloud`, a seeded single-region fake with a call log

pub mod aws;
pub mod memory;
pub mod traits;

pub use aws::AwsCloud;
pub use memory::{CloudCall, InMemoryCloud};
pub use traits::{
    AlarmDiscovery, AlarmLookup, AlarmMutation, AutoscalingMembership, CloudProvider,
    InstanceInventory, PowerControl,
};
