//! SeaORM entity models
//!
//! Read-side views of the social app tables the interaction graph is built from.
//! Votes are read with a joined statement in the repository; their entity
//! only carries the post relation.

mod user;
mod post;
mod vote;
mod following;

pub use user::Entity as UserEntity;

pub use post::{
    Entity as PostEntity,
    Column as PostColumn,
};

pub use following::Entity as FollowingEntity;
