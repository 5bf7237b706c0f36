//! Typed facades over [`Record`] for each LSNP `TYPE`.
//!
//! Raw records are stringly typed; every handler above the codec works
//! against one of these structs instead, so a missing or malformed field
//! fails fast at the boundary rather than surfacing as a panic or a silent
//! `None` three layers deeper (spec §9 Design Notes).

use std::str::FromStr;

use lsnp_types::FullId;
use thiserror::Error;
use uuid::Uuid;

use crate::record::Record;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("missing required field {0:?}")]
    MissingField(&'static str),
    #[error("field {0:?} has invalid value {1:?}")]
    InvalidField(&'static str, String),
}

fn field<'a>(record: &'a Record, key: &'static str) -> Result<&'a str, MessageError> {
    record.get(key).ok_or(MessageError::MissingField(key))
}

fn parse_field<T: FromStr>(record: &Record, key: &'static str) -> Result<T, MessageError> {
    field(record, key)?
        .parse()
        .map_err(|_| MessageError::InvalidField(key, field(record, key).unwrap().to_string()))
}

/// Fields common to every non-ACK LSNP message (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: FullId,
    pub timestamp: u64,
    pub message_id: Option<Uuid>,
    pub token: Option<String>,
}

impl Envelope {
    /// Extract the common envelope fields, leaving type-specific fields for
    /// the caller. `MESSAGE_ID`/`TOKEN` are optional here because `PROFILE`
    /// and `PING` carry neither (spec §4.6).
    pub fn extract(record: &Record) -> Result<Self, MessageError> {
        let from: FullId = parse_field(record, "FROM")?;
        let timestamp: u64 = parse_field(record, "TIMESTAMP")?;
        let message_id = match record.get("MESSAGE_ID") {
            Some(raw) => Some(
                Uuid::parse_str(raw)
                    .map_err(|_| MessageError::InvalidField("MESSAGE_ID", raw.to_string()))?,
            ),
            None => None,
        };
        let token = record.get("TOKEN").map(|s| s.to_string());
        Ok(Envelope { from, timestamp, message_id, token })
    }
}

macro_rules! typed_message {
    (
        $(#[$meta:meta])*
        $name:ident { $($field_name:ident : $field_ty:ty => $key:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub envelope: Envelope,
            $(pub $field_name: $field_ty,)+
        }

        impl $name {
            pub fn from_record(record: &Record) -> Result<Self, MessageError> {
                let envelope = Envelope::extract(record)?;
                Ok($name {
                    envelope,
                    $($field_name: parse_field(record, $key)?,)+
                })
            }
        }
    };
}

typed_message!(
    /// `DM` — a direct message to one recipient (spec §4.7, `chat` scope).
    Dm {
        to: FullId => "TO",
        content: String => "CONTENT",
    }
);

typed_message!(
    /// `POST` — a broadcast-to-followers post (spec §4.9, `broadcast` scope).
    Post {
        post_id: String => "POST_ID",
        content: String => "CONTENT",
        ttl: u32 => "TTL",
    }
);

typed_message!(
    /// `LIKE` — toggle a like on a post owned by the recipient.
    Like {
        post_id: String => "POST_ID",
        post_owner: FullId => "POST_OWNER",
        action: LikeAction => "ACTION",
    }
);

typed_message!(
    /// `FOLLOW` — add the sender to the recipient's follower set.
    Follow {}
);

typed_message!(
    /// `UNFOLLOW` — remove the sender from the recipient's follower set.
    Unfollow {}
);

typed_message!(
    /// `FILE_OFFER` — announce a pending file transfer (spec §4.8).
    FileOffer {
        file_id: Uuid => "FILEID",
        filename: String => "FILENAME",
        filesize: u64 => "FILESIZE",
        filetype: String => "FILETYPE",
    }
);

typed_message!(
    /// `FILE_ACCEPT` — receiver agrees to a prior `FILE_OFFER`.
    FileAccept {
        file_id: Uuid => "FILEID",
    }
);

typed_message!(
    /// `FILE_REJECT` — receiver declines a prior `FILE_OFFER`.
    FileReject {
        file_id: Uuid => "FILEID",
    }
);

typed_message!(
    /// `FILE_CHUNK` — one piece of a file, addressed by `CHUNK_INDEX`.
    FileChunk {
        file_id: Uuid => "FILEID",
        chunk_index: u32 => "CHUNK_INDEX",
        total_chunks: u32 => "TOTAL_CHUNKS",
        data_b64: String => "DATA",
    }
);

typed_message!(
    /// `FILE_RECEIVED` — terminal acknowledgment that a transfer completed.
    FileReceived {
        file_id: Uuid => "FILEID",
        status: String => "STATUS",
    }
);

/// `LIKE`'s `ACTION` field (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    Unlike,
}

impl FromStr for LikeAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIKE" => Ok(LikeAction::Like),
            "UNLIKE" => Ok(LikeAction::Unlike),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for LikeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LikeAction::Like => "LIKE",
            LikeAction::Unlike => "UNLIKE",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record(message_type: &str) -> Record {
        Record::new()
            .with("TYPE", message_type)
            .with("FROM", "alice@192.168.1.5")
            .with("TIMESTAMP", "1000")
            .with("MESSAGE_ID", Uuid::nil().to_string())
            .with("TOKEN", "alice@192.168.1.5|2000|chat")
    }

    #[test]
    fn dm_from_record() {
        let r = base_record("DM")
            .with("TO", "bob@192.168.1.6")
            .with("CONTENT", "hi");
        let dm = Dm::from_record(&r).unwrap();
        assert_eq!(dm.content, "hi");
        assert_eq!(dm.to.user, "bob");
    }

    #[test]
    fn dm_missing_field_errors() {
        let r = base_record("DM");
        assert_eq!(Dm::from_record(&r), Err(MessageError::MissingField("TO")));
    }

    #[test]
    fn like_action_parses() {
        let r = base_record("LIKE")
            .with("POST_ID", "p1")
            .with("POST_OWNER", "bob@192.168.1.6")
            .with("ACTION", "UNLIKE");
        let like = Like::from_record(&r).unwrap();
        assert_eq!(like.action, LikeAction::Unlike);
    }

    #[test]
    fn follow_needs_only_envelope() {
        let r = base_record("FOLLOW");
        assert!(Follow::from_record(&r).is_ok());
    }

    #[test]
    fn file_offer_from_record() {
        let fid = Uuid::new_v4();
        let r = base_record("FILE_OFFER")
            .with("FILEID", fid.to_string())
            .with("FILENAME", "photo.png")
            .with("FILESIZE", "3172")
            .with("FILETYPE", "image/png");
        let offer = FileOffer::from_record(&r).unwrap();
        assert_eq!(offer.file_id, fid);
        assert_eq!(offer.filesize, 3172);
    }

    #[test]
    fn profile_and_ping_have_no_message_id() {
        let r = Record::new()
            .with("TYPE", "PROFILE")
            .with("FROM", "alice@192.168.1.5")
            .with("TIMESTAMP", "1000");
        let env = Envelope::extract(&r).unwrap();
        assert_eq!(env.message_id, None);
        assert_eq!(env.token, None);
    }
}
