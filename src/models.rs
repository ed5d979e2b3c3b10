//! Core Data Models
//!
//! This module defines the entity kinds, schema variants and typed records that flow
//! through the ingestion pipeline. A record is materialized from a single dump line,
//! handed to the store and then dropped; nothing here outlives one line.
//!
//! ## Data Flow
//!
//! 1. **Kind selection**: [`EntityKind`] names the table a run writes to, and
//!    [`SchemaVariant`] names the closed set of kinds that are valid for the run
//! 2. **Records**: [`Record`] holds one typed variant per kind, with explicitly
//!    optional fields where the column is nullable and plain integers where the
//!    column defaults to zero
//!
//! ## Schema Variants
//!
//! - [`SchemaVariant::Primary`] - Posts, Comments, Votes, Users, Tags, PostLinks
//! - [`SchemaVariant::QuestionAnswer`] - Questions, Answers, Tags, TagSynonyms, Users
//!
//! The two variants are mutually exclusive: a run commits to one of them at startup.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity type of a record; determines the table and the transform rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[value(rename_all = "PascalCase")]
pub enum EntityKind {
    Votes,
    Users,
    Tags,
    PostLinks,
    Posts,
    Comments,
    Questions,
    Answers,
    TagSynonyms,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Votes,
        EntityKind::Users,
        EntityKind::Tags,
        EntityKind::PostLinks,
        EntityKind::Posts,
        EntityKind::Comments,
        EntityKind::Questions,
        EntityKind::Answers,
        EntityKind::TagSynonyms,
    ];

    /// Display name, as used on the command line and in dump file names.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Votes => "Votes",
            EntityKind::Users => "Users",
            EntityKind::Tags => "Tags",
            EntityKind::PostLinks => "PostLinks",
            EntityKind::Posts => "Posts",
            EntityKind::Comments => "Comments",
            EntityKind::Questions => "Questions",
            EntityKind::Answers => "Answers",
            EntityKind::TagSynonyms => "TagSynonyms",
        }
    }

    /// Resolve an element or command-line name to a kind.
    ///
    /// Matching is case-insensitive and accepts both the plural table name and
    /// its singular form (`comment`, `Comments`, `tagsynonym`).
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        EntityKind::ALL.into_iter().find(|kind| {
            let plural = kind.name().to_ascii_lowercase();
            lower == plural || Some(lower.as_str()) == plural.strip_suffix('s')
        })
    }

    /// `PostTypeId` a posts-dump row must carry to belong to this kind, if any.
    pub fn required_post_type(&self) -> Option<i64> {
        match self {
            EntityKind::Questions => Some(1),
            EntityKind::Answers => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::from_name(s).ok_or_else(|| format!("unknown entity kind: {s}"))
    }
}

/// Closed set of entity kinds active for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVariant {
    /// Six-table schema mirroring the dump files one to one
    #[default]
    Primary,
    /// Question/answer split with tag synonyms
    #[serde(rename = "qa")]
    #[value(name = "qa")]
    QuestionAnswer,
}

impl SchemaVariant {
    pub fn kinds(&self) -> &'static [EntityKind] {
        match self {
            SchemaVariant::Primary => &[
                EntityKind::Votes,
                EntityKind::Users,
                EntityKind::Tags,
                EntityKind::PostLinks,
                EntityKind::Posts,
                EntityKind::Comments,
            ],
            SchemaVariant::QuestionAnswer => &[
                EntityKind::Questions,
                EntityKind::Answers,
                EntityKind::Tags,
                EntityKind::TagSynonyms,
                EntityKind::Users,
            ],
        }
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.kinds().contains(&kind)
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVariant::Primary => f.write_str("primary"),
            SchemaVariant::QuestionAnswer => f.write_str("qa"),
        }
    }
}

impl FromStr for SchemaVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(SchemaVariant::Primary),
            "qa" | "question-answer" => Ok(SchemaVariant::QuestionAnswer),
            other => Err(format!("unknown schema variant: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub id: i64,
    pub post_type_id: Option<i64>,
    pub accepted_answer_id: Option<i64>,
    pub creation_date: Option<String>,
    pub score: Option<i64>,
    pub view_count: Option<i64>,
    pub body: Option<String>,
    pub owner_user_id: Option<i64>,
    pub last_editor_user_id: Option<i64>,
    pub last_editor_display_name: Option<String>,
    pub last_edit_date: Option<String>,
    pub last_activity_date: Option<String>,
    pub title: Option<String>,
    pub tags: Option<String>,
    pub answer_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub favorite_count: Option<i64>,
    pub community_owned_date: Option<String>,
    pub content_license: Option<String>,
    pub error: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub score: i64,
    pub text: Option<String>,
    pub creation_date: Option<String>,
    pub user_id: i64,
    pub content_license: Option<String>,
    pub error: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: i64,
    pub reputation: i64,
    pub creation_date: Option<String>,
    pub display_name: Option<String>,
    pub last_access_date: Option<String>,
    pub about_me: Option<String>,
    pub views: i64,
    pub up_votes: i64,
    pub down_votes: i64,
    pub error: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vote {
    pub id: i64,
    pub post_id: i64,
    pub vote_type_id: i64,
    pub creation_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub tag_name: Option<String>,
    pub count: i64,
    pub excerpt_post_id: i64,
    pub wiki_post_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostLink {
    pub id: i64,
    pub creation_date: Option<String>,
    pub post_id: i64,
    pub related_post_id: i64,
    pub link_type_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Question {
    pub id: i64,
    pub accepted_answer_id: Option<i64>,
    pub creation_date: Option<String>,
    pub score: Option<i64>,
    pub view_count: Option<i64>,
    pub body: Option<String>,
    pub owner_user_id: Option<i64>,
    pub owner_display_name: Option<String>,
    pub last_editor_user_id: Option<i64>,
    pub last_editor_display_name: Option<String>,
    pub last_edit_date: Option<String>,
    pub last_activity_date: Option<String>,
    pub title: Option<String>,
    pub tags: Option<String>,
    pub answer_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub favorite_count: Option<i64>,
    pub closed_date: Option<String>,
    pub community_owned_date: Option<String>,
    pub content_license: Option<String>,
    pub error: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Answer {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub creation_date: Option<String>,
    pub score: Option<i64>,
    pub body: Option<String>,
    pub owner_user_id: Option<i64>,
    pub owner_display_name: Option<String>,
    pub last_editor_user_id: Option<i64>,
    pub last_editor_display_name: Option<String>,
    pub last_edit_date: Option<String>,
    pub last_activity_date: Option<String>,
    pub comment_count: Option<i64>,
    pub community_owned_date: Option<String>,
    pub content_license: Option<String>,
    pub error: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSynonym {
    pub id: i64,
    pub source_tag_name: Option<String>,
    pub target_tag_name: Option<String>,
    pub creation_date: Option<String>,
    pub owner_user_id: Option<i64>,
    pub auto_rename_count: Option<i64>,
    pub last_auto_rename: Option<String>,
    pub score: Option<i64>,
    pub approved_by_user_id: Option<i64>,
    pub approval_date: Option<String>,
}

/// One typed record per entity kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Post(Post),
    Comment(Comment),
    User(User),
    Vote(Vote),
    Tag(Tag),
    PostLink(PostLink),
    Question(Question),
    Answer(Answer),
    TagSynonym(TagSynonym),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Post(_) => EntityKind::Posts,
            Record::Comment(_) => EntityKind::Comments,
            Record::User(_) => EntityKind::Users,
            Record::Vote(_) => EntityKind::Votes,
            Record::Tag(_) => EntityKind::Tags,
            Record::PostLink(_) => EntityKind::PostLinks,
            Record::Question(_) => EntityKind::Questions,
            Record::Answer(_) => EntityKind::Answers,
            Record::TagSynonym(_) => EntityKind::TagSynonyms,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Record::Post(r) => r.id,
            Record::Comment(r) => r.id,
            Record::User(r) => r.id,
            Record::Vote(r) => r.id,
            Record::Tag(r) => r.id,
            Record::PostLink(r) => r.id,
            Record::Question(r) => r.id,
            Record::Answer(r) => r.id,
            Record::TagSynonym(r) => r.id,
        }
    }

    /// Whether the rich-text field fell back to its raw value.
    /// Kinds without an Error column always report `false`.
    pub fn has_error_flag(&self) -> bool {
        match self {
            Record::Post(r) => r.error,
            Record::Comment(r) => r.error,
            Record::User(r) => r.error,
            Record::Question(r) => r.error,
            Record::Answer(r) => r.error,
            Record::Vote(_) | Record::Tag(_) | Record::PostLink(_) | Record::TagSynonym(_) => false,
        }
    }
}
