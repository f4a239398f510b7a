//! What a stream polls: the bound target and the fetch call for it.

use async_trait::async_trait;

use crate::client::Client;
use crate::error::Result;
use crate::models::{Comment, Item, Link};

/// The thread or community a stream is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamTarget {
    /// Comments under the link with this id.
    Link(String),
    /// Newest submissions in this subreddit.
    Subreddit(String),
}

impl std::fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamTarget::Link(id) => write!(f, "comments:{}", id),
            StreamTarget::Subreddit(name) => write!(f, "r/{}", name),
        }
    }
}

/// A listing a stream can poll.
///
/// `fetch` returns the current listing in the order the backend reports it.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    type Item: Item;

    fn target(&self) -> &StreamTarget;

    async fn fetch(&self) -> Result<Vec<Self::Item>>;
}

/// Comments under one link.
#[derive(Debug, Clone)]
pub struct CommentSource {
    client: Client,
    link_id: String,
    target: StreamTarget,
}

impl CommentSource {
    pub fn new(client: Client, link_id: impl Into<String>) -> Self {
        let link_id = link_id.into();
        Self {
            client,
            target: StreamTarget::Link(link_id.clone()),
            link_id,
        }
    }
}

#[async_trait]
impl Source for CommentSource {
    type Item = Comment;

    fn target(&self) -> &StreamTarget {
        &self.target
    }

    async fn fetch(&self) -> Result<Vec<Comment>> {
        self.client.get_link_comments(&self.link_id).await
    }
}

/// Newest links in one subreddit.
#[derive(Debug, Clone)]
pub struct LinkSource {
    client: Client,
    subreddit: String,
    target: StreamTarget,
}

impl LinkSource {
    pub fn new(client: Client, subreddit: impl Into<String>) -> Self {
        let subreddit = subreddit.into();
        Self {
            client,
            target: StreamTarget::Subreddit(subreddit.clone()),
            subreddit,
        }
    }
}

#[async_trait]
impl Source for LinkSource {
    type Item = Link;

    fn target(&self) -> &StreamTarget {
        &self.target
    }

    async fn fetch(&self) -> Result<Vec<Link>> {
        self.client.get_new_links(&self.subreddit).await
    }
}
