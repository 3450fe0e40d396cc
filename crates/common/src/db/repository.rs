//! Repository for interaction record fetches
//!
//! Reads users, followings, posts and votes from the social app's tables.
//! Rows that cannot be decoded are logged and skipped so that one bad
//! record never aborts a whole graph rebuild.

use crate::errors::Result;
use crate::db::DbPool;
use crate::db::models::*;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    Statement,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A follower -> followee pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRecord {
    pub follower_id: String,
    pub followee_id: String,
    /// The followings table carries no timestamp; builders substitute the build time
    #[serde(default)]
    pub followed_at: Option<DateTime<Utc>>,
}

/// A post and its author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub poster_id: String,
    pub post_id: String,
    pub created_at: DateTime<Utc>,
}

/// A vote on a post; `value` is expected to be +1 or -1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_id: String,
    pub post_id: String,
    pub value: i64,
    pub voted_at: DateTime<Utc>,
}

/// Everything a graph build needs, fetched for one lookback window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecords {
    pub user_ids: Vec<String>,
    pub follows: Vec<FollowRecord>,
    pub posts: Vec<PostRecord>,
    pub votes: Vec<VoteRecord>,
}

impl InteractionRecords {
    /// Total number of records across all kinds
    pub fn len(&self) -> usize {
        self.user_ids.len() + self.follows.len() + self.posts.len() + self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// All user ids
    pub async fn user_ids(&self) -> Result<Vec<String>> {
        let users = UserEntity::find().all(self.read_conn()).await?;
        Ok(users.into_iter().map(|u| u.id).collect())
    }

    /// All follow relationships
    pub async fn follows(&self) -> Result<Vec<FollowRecord>> {
        let followings = FollowingEntity::find().all(self.read_conn()).await?;
        Ok(followings
            .into_iter()
            .map(|f| FollowRecord {
                follower_id: f.id,
                followee_id: f.following_id,
                followed_at: None,
            })
            .collect())
    }

    /// Posts created after `since`
    pub async fn posts_since(&self, since: DateTime<Utc>) -> Result<Vec<PostRecord>> {
        let posts = PostEntity::find()
            .filter(PostColumn::Time.gt(since))
            .all(self.read_conn())
            .await?;

        Ok(posts
            .into_iter()
            .map(|p| PostRecord {
                poster_id: p.id,
                post_id: p.post_id,
                created_at: p.time.with_timezone(&Utc),
            })
            .collect())
    }

    /// Votes on posts created after `since`
    pub async fn votes_since(&self, since: DateTime<Utc>) -> Result<Vec<VoteRecord>> {
        let sql = r#"
            SELECT v.id AS voter_id, v.postid AS post_id, v.vote AS vote, v.time AS voted_at
            FROM votes v
            INNER JOIN posts p ON v.postid = p.postid
            WHERE p.time > $1
        "#;

        let rows = self
            .read_conn()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                vec![since.into()],
            ))
            .await?;

        let mut votes = Vec::with_capacity(rows.len());
        for row in rows {
            let decoded = (
                row.try_get::<String>("", "voter_id"),
                row.try_get::<String>("", "post_id"),
                row.try_get::<i32>("", "vote"),
                row.try_get::<DateTime<Utc>>("", "voted_at"),
            );
            match decoded {
                (Ok(voter_id), Ok(post_id), Ok(value), Ok(voted_at)) => votes.push(VoteRecord {
                    voter_id,
                    post_id,
                    value: i64::from(value),
                    voted_at,
                }),
                (voter, post, value, time) => {
                    let reason = [voter.err(), post.err(), value.err(), time.err()]
                        .into_iter()
                        .flatten()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    warn!(error = %reason, "Skipping unreadable vote row");
                }
            }
        }

        Ok(votes)
    }

    /// Fetch every record a graph build needs for the given lookback window
    pub async fn interaction_records(&self, lookback_days: i64) -> Result<InteractionRecords> {
        let since = Utc::now() - Duration::days(lookback_days);

        let records = InteractionRecords {
            user_ids: self.user_ids().await?,
            follows: self.follows().await?,
            posts: self.posts_since(since).await?,
            votes: self.votes_since(since).await?,
        };

        debug!(
            users = records.user_ids.len(),
            follows = records.follows.len(),
            posts = records.posts.len(),
            votes = records.votes.len(),
            "Fetched interaction records"
        );

        Ok(records)
    }
}
