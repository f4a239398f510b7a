//! Reddit API client with polling link and comment streams.
//! Used as a library and by the `snoo` CLI.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod stream;

pub use client::{Client, ClientBuilder, Vote};
pub use config::{default_config_path, ClientSection, Config, ConfigError, StreamSection};
pub use error::TransportError;
pub use models::{Comment, Item, Link, Media, NumBool, Oembed, UserInfo};
pub use stream::{
    CommentSource, CommentStream, LinkSource, LinkStream, PollStream, SeenSet, Source,
    StreamExit, StreamState, StreamTarget,
};
