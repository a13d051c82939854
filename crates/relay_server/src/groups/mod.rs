//! Group membership.
//!
//! [`GroupIndex`] is the node-local `group -> members` table kept inside the
//! connection registry. [`GroupMembership`] layers the cluster-wide view on
//! top of it when the node runs clustered.

pub mod index;
pub mod membership;

pub use index::GroupIndex;
pub use membership::GroupMembership;
