//! LSNP message codec, typed message facades, and authorization tokens.

pub mod message;
pub mod record;
pub mod token;

pub use message::{
    Dm, Envelope, FileAccept, FileChunk, FileOffer, FileReceived, FileReject, Follow, Like,
    LikeAction, MessageError, Post, Unfollow,
};
pub use record::{ParseError, Record, SerializeError};
pub use token::TokenError;
