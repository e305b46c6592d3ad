pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod forum;
pub mod merge;
pub mod models;
pub mod paged;
pub mod query;
pub mod rest; // reqwest collaborator
pub mod scroll;
pub mod source;
pub mod tree;

// Re-export commonly used items for tests / external users
pub use error::{FetchError, MutationError};
pub use feed::{Feed, FeedEvent, TreeFeed};
pub use forum::ForumClient;
pub use merge::{Mutation, ReactionPlan};
pub use paged::{Applied, Generation, PagedList};
pub use scroll::{ScrollMetrics, ScrollTrigger};
pub use tree::{ChildTicket, LazyTree, TreeNode};
