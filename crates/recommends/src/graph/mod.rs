//! Interaction graph
//!
//! Users and posts are nodes; creations, votes and follows are typed,
//! timestamped edges. Nodes live in an arena owned by [`GraphStore`] and
//! edges refer to them by index and id, never by reference.

mod builder;
mod priority;
mod store;

pub use builder::{
    apply_event, BuildReport, EventOutcome, GraphBuilder, GraphEvent, GraphSource, StaticSource,
};
pub use priority::EdgePriority;
pub use store::{EdgeOutcome, GraphStats, GraphStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use transient_common::config::TypeFractions;
use transient_common::errors::AppError;

/// Errors raised by the graph core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown node: {id}")]
    UnknownNode { id: String },

    #[error("Invalid vote value {value}, must be 1 or -1")]
    InvalidVoteValue { value: i64 },

    #[error("Unknown seed: {id}")]
    UnknownSeed { id: String },
}

impl From<GraphError> for AppError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::UnknownNode { id } => AppError::UnknownNode { id },
            GraphError::InvalidVoteValue { value } => AppError::InvalidVoteValue { value },
            GraphError::UnknownSeed { id } => AppError::UnknownSeed { id },
        }
    }
}

/// Dense position of a node in the store's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub(crate) usize);

/// A node or edge type as sent by producers: its name, or the numeric code
/// the social backend uses
#[derive(Deserialize)]
#[serde(untagged)]
enum KindCode {
    Code(u64),
    Name(String),
}

/// Node type; deserializes from `"user"`/`"post"` or codes 0/1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "KindCode")]
pub enum NodeKind {
    User,
    Post,
}

impl TryFrom<KindCode> for NodeKind {
    type Error = String;

    fn try_from(code: KindCode) -> Result<Self, Self::Error> {
        match code {
            KindCode::Code(0) => Ok(NodeKind::User),
            KindCode::Code(1) => Ok(NodeKind::Post),
            KindCode::Code(n) => Err(format!("unknown node type code {}", n)),
            KindCode::Name(name) => match name.as_str() {
                "user" => Ok(NodeKind::User),
                "post" => Ok(NodeKind::Post),
                _ => Err(format!("unknown node type `{}`", name)),
            },
        }
    }
}

impl NodeKind {
    fn symbol(self) -> char {
        match self {
            NodeKind::User => 'u',
            NodeKind::Post => 'p',
        }
    }
}

/// Edge type; deserializes from its name or from codes
/// 0 upvote, 1 downvote, 2 creation, 3 follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "KindCode")]
pub enum EdgeKind {
    Creation,
    Upvote,
    Downvote,
    Follow,
}

impl TryFrom<KindCode> for EdgeKind {
    type Error = String;

    fn try_from(code: KindCode) -> Result<Self, Self::Error> {
        match code {
            KindCode::Code(0) => Ok(EdgeKind::Upvote),
            KindCode::Code(1) => Ok(EdgeKind::Downvote),
            KindCode::Code(2) => Ok(EdgeKind::Creation),
            KindCode::Code(3) => Ok(EdgeKind::Follow),
            KindCode::Code(n) => Err(format!("unknown edge type code {}", n)),
            KindCode::Name(name) => match name.as_str() {
                "creation" => Ok(EdgeKind::Creation),
                "upvote" => Ok(EdgeKind::Upvote),
                "downvote" => Ok(EdgeKind::Downvote),
                "follow" => Ok(EdgeKind::Follow),
                _ => Err(format!("unknown edge type `{}`", name)),
            },
        }
    }
}

impl EdgeKind {
    /// Priority among edges close in time: Follow > Creation > Downvote > Upvote
    pub fn rank(self) -> u8 {
        match self {
            EdgeKind::Follow => 3,
            EdgeKind::Creation => 2,
            EdgeKind::Downvote => 1,
            EdgeKind::Upvote => 0,
        }
    }

    /// Share of the source's weight carried across an edge of this kind
    pub fn fraction(self, fractions: &TypeFractions) -> f64 {
        match self {
            EdgeKind::Creation => fractions.creation,
            EdgeKind::Upvote => fractions.upvote,
            EdgeKind::Downvote => fractions.downvote,
            EdgeKind::Follow => fractions.follow,
        }
    }

    /// Map a stored vote value to its edge kind
    pub fn from_vote(value: i64) -> Result<Self, GraphError> {
        match value {
            1 => Ok(EdgeKind::Upvote),
            -1 => Ok(EdgeKind::Downvote),
            _ => Err(GraphError::InvalidVoteValue { value }),
        }
    }

    fn symbol(self) -> char {
        match self {
            EdgeKind::Creation => 'c',
            EdgeKind::Upvote => '+',
            EdgeKind::Downvote => '-',
            EdgeKind::Follow => 'f',
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeKind::Creation => "creation",
            EdgeKind::Upvote => "upvote",
            EdgeKind::Downvote => "downvote",
            EdgeKind::Follow => "follow",
        };
        f.write_str(name)
    }
}

/// Directed, typed, timestamped relationship stored on its source node
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub(crate) destination: NodeIndex,
    pub(crate) source_id: Arc<str>,
    pub(crate) destination_id: Arc<str>,
    pub(crate) kind: EdgeKind,
    pub(crate) timestamp: DateTime<Utc>,
}

impl Edge {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    pub fn destination(&self) -> NodeIndex {
        self.destination
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A user or post with its outgoing adjacency list
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: Arc<str>,
    pub(crate) kind: NodeKind,
    pub(crate) created_at: Option<DateTime<Utc>>,
    /// Kept in priority order at all times
    pub(crate) edges: Vec<Edge>,
    pub(crate) destinations: HashSet<NodeIndex>,
}

impl Node {
    pub(crate) fn new(id: Arc<str>, kind: NodeKind, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            kind,
            created_at,
            edges: Vec::new(),
            destinations: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Creation time; only meaningful for posts
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Full adjacency list in priority order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn degree(&self) -> usize {
        self.edges.len()
    }

    pub fn is_post(&self) -> bool {
        self.kind == NodeKind::Post
    }
}
