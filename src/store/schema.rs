//! Table layout for every entity kind
//!
//! Each table is keyed by an integer `Id`; the first column of every
//! [`TableSpec`] is that key. Upserts overwrite every non-key column with the
//! incoming value, so a NULL in the new record replaces whatever was stored.

use crate::models::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn int(name: &'static str) -> Column {
    Column { name, ty: ColumnType::Integer }
}

const fn text(name: &'static str) -> Column {
    Column { name, ty: ColumnType::Text }
}

const fn flag(name: &'static str) -> Column {
    Column { name, ty: ColumnType::Boolean }
}

/// SQL flavour a statement is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Postgres => format!("${index}"),
        }
    }

    fn type_name(&self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (Dialect::Sqlite, ColumnType::Integer) => "INTEGER",
            (Dialect::Postgres, ColumnType::Integer) => "BIGINT",
            (_, ColumnType::Text) => "TEXT",
            (_, ColumnType::Boolean) => "BOOLEAN",
        }
    }
}

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    pub kind: EntityKind,
    pub columns: &'static [Column],
}

impl TableSpec {
    pub fn key(&self) -> &'static str {
        self.columns[0].name
    }

    pub fn create_sql(&self, dialect: Dialect) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let ty = dialect.type_name(c.ty);
                if i == 0 {
                    format!("    {} {} PRIMARY KEY", c.name, ty)
                } else {
                    format!("    {} {}", c.name, ty)
                }
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.name,
            columns.join(",\n")
        )
    }

    /// Insert-or-overwrite statement keyed by the primary key.
    pub fn upsert_sql(&self, dialect: Dialect) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let placeholders: Vec<String> = (1..=self.columns.len())
            .map(|i| dialect.placeholder(i))
            .collect();
        let updates: Vec<String> = self.columns[1..]
            .iter()
            .map(|c| format!("{0} = excluded.{0}", c.name))
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
            self.name,
            names.join(", "),
            placeholders.join(", "),
            self.key(),
            updates.join(", ")
        )
    }
}

pub static POSTS: TableSpec = TableSpec {
    name: "posts",
    kind: EntityKind::Posts,
    columns: &[
        int("Id"),
        int("PostTypeId"),
        int("AcceptedAnswerId"),
        text("CreationDate"),
        int("Score"),
        int("ViewCount"),
        text("Body"),
        int("OwnerUserId"),
        int("LastEditorUserId"),
        text("LastEditorDisplayName"),
        text("LastEditDate"),
        text("LastActivityDate"),
        text("Title"),
        text("Tags"),
        int("AnswerCount"),
        int("CommentCount"),
        int("FavoriteCount"),
        text("CommunityOwnedDate"),
        text("ContentLicense"),
        flag("Error"),
    ],
};

pub static COMMENTS: TableSpec = TableSpec {
    name: "comments",
    kind: EntityKind::Comments,
    columns: &[
        int("Id"),
        int("PostId"),
        int("Score"),
        text("Text"),
        text("CreationDate"),
        int("UserId"),
        text("ContentLicense"),
        flag("Error"),
    ],
};

pub static USERS: TableSpec = TableSpec {
    name: "users",
    kind: EntityKind::Users,
    columns: &[
        int("Id"),
        int("Reputation"),
        text("CreationDate"),
        text("DisplayName"),
        text("LastAccessDate"),
        text("AboutMe"),
        int("Views"),
        int("UpVotes"),
        int("DownVotes"),
        flag("Error"),
    ],
};

pub static VOTES: TableSpec = TableSpec {
    name: "votes",
    kind: EntityKind::Votes,
    columns: &[int("Id"), int("PostId"), int("VoteTypeId"), text("CreationDate")],
};

pub static TAGS: TableSpec = TableSpec {
    name: "tags",
    kind: EntityKind::Tags,
    columns: &[
        int("Id"),
        text("TagName"),
        int("Count"),
        int("ExcerptPostId"),
        int("WikiPostId"),
    ],
};

pub static POSTLINKS: TableSpec = TableSpec {
    name: "postlinks",
    kind: EntityKind::PostLinks,
    columns: &[
        int("Id"),
        text("CreationDate"),
        int("PostId"),
        int("RelatedPostId"),
        int("LinkTypeId"),
    ],
};

pub static QUESTIONS: TableSpec = TableSpec {
    name: "questions",
    kind: EntityKind::Questions,
    columns: &[
        int("Id"),
        int("AcceptedAnswerId"),
        text("CreationDate"),
        int("Score"),
        int("ViewCount"),
        text("Body"),
        int("OwnerUserId"),
        text("OwnerDisplayName"),
        int("LastEditorUserId"),
        text("LastEditorDisplayName"),
        text("LastEditDate"),
        text("LastActivityDate"),
        text("Title"),
        text("Tags"),
        int("AnswerCount"),
        int("CommentCount"),
        int("FavoriteCount"),
        text("ClosedDate"),
        text("CommunityOwnedDate"),
        text("ContentLicense"),
        flag("Error"),
    ],
};

pub static ANSWERS: TableSpec = TableSpec {
    name: "answers",
    kind: EntityKind::Answers,
    columns: &[
        int("Id"),
        int("ParentId"),
        text("CreationDate"),
        int("Score"),
        text("Body"),
        int("OwnerUserId"),
        text("OwnerDisplayName"),
        int("LastEditorUserId"),
        text("LastEditorDisplayName"),
        text("LastEditDate"),
        text("LastActivityDate"),
        int("CommentCount"),
        text("CommunityOwnedDate"),
        text("ContentLicense"),
        flag("Error"),
    ],
};

pub static TAGSYNONYMS: TableSpec = TableSpec {
    name: "tagsynonyms",
    kind: EntityKind::TagSynonyms,
    columns: &[
        int("Id"),
        text("SourceTagName"),
        text("TargetTagName"),
        text("CreationDate"),
        int("OwnerUserId"),
        int("AutoRenameCount"),
        text("LastAutoRename"),
        int("Score"),
        int("ApprovedByUserId"),
        text("ApprovalDate"),
    ],
};

pub fn table_for(kind: EntityKind) -> &'static TableSpec {
    match kind {
        EntityKind::Posts => &POSTS,
        EntityKind::Comments => &COMMENTS,
        EntityKind::Users => &USERS,
        EntityKind::Votes => &VOTES,
        EntityKind::Tags => &TAGS,
        EntityKind::PostLinks => &POSTLINKS,
        EntityKind::Questions => &QUESTIONS,
        EntityKind::Answers => &ANSWERS,
        EntityKind::TagSynonyms => &TAGSYNONYMS,
    }
}

/// A bound column value, borrowed from the record it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlValue<'a> {
    Integer(Option<i64>),
    Text(Option<&'a str>),
    Boolean(bool),
}

impl From<i64> for SqlValue<'_> {
    fn from(v: i64) -> Self {
        SqlValue::Integer(Some(v))
    }
}

impl From<Option<i64>> for SqlValue<'_> {
    fn from(v: Option<i64>) -> Self {
        SqlValue::Integer(v)
    }
}

impl<'a> From<&'a Option<String>> for SqlValue<'a> {
    fn from(v: &'a Option<String>) -> Self {
        SqlValue::Text(v.as_deref())
    }
}

impl From<bool> for SqlValue<'_> {
    fn from(v: bool) -> Self {
        SqlValue::Boolean(v)
    }
}

/// Column values of a record, in the column order of its table.
pub fn row_values(record: &Record) -> Vec<SqlValue<'_>> {
    match record {
        Record::Post(r) => vec![
            r.id.into(),
            r.post_type_id.into(),
            r.accepted_answer_id.into(),
            (&r.creation_date).into(),
            r.score.into(),
            r.view_count.into(),
            (&r.body).into(),
            r.owner_user_id.into(),
            r.last_editor_user_id.into(),
            (&r.last_editor_display_name).into(),
            (&r.last_edit_date).into(),
            (&r.last_activity_date).into(),
            (&r.title).into(),
            (&r.tags).into(),
            r.answer_count.into(),
            r.comment_count.into(),
            r.favorite_count.into(),
            (&r.community_owned_date).into(),
            (&r.content_license).into(),
            r.error.into(),
        ],
        Record::Comment(r) => vec![
            r.id.into(),
            r.post_id.into(),
            r.score.into(),
            (&r.text).into(),
            (&r.creation_date).into(),
            r.user_id.into(),
            (&r.content_license).into(),
            r.error.into(),
        ],
        Record::User(r) => vec![
            r.id.into(),
            r.reputation.into(),
            (&r.creation_date).into(),
            (&r.display_name).into(),
            (&r.last_access_date).into(),
            (&r.about_me).into(),
            r.views.into(),
            r.up_votes.into(),
            r.down_votes.into(),
            r.error.into(),
        ],
        Record::Vote(r) => vec![
            r.id.into(),
            r.post_id.into(),
            r.vote_type_id.into(),
            (&r.creation_date).into(),
        ],
        Record::Tag(r) => vec![
            r.id.into(),
            (&r.tag_name).into(),
            r.count.into(),
            r.excerpt_post_id.into(),
            r.wiki_post_id.into(),
        ],
        Record::PostLink(r) => vec![
            r.id.into(),
            (&r.creation_date).into(),
            r.post_id.into(),
            r.related_post_id.into(),
            r.link_type_id.into(),
        ],
        Record::Question(r) => vec![
            r.id.into(),
            r.accepted_answer_id.into(),
            (&r.creation_date).into(),
            r.score.into(),
            r.view_count.into(),
            (&r.body).into(),
            r.owner_user_id.into(),
            (&r.owner_display_name).into(),
            r.last_editor_user_id.into(),
            (&r.last_editor_display_name).into(),
            (&r.last_edit_date).into(),
            (&r.last_activity_date).into(),
            (&r.title).into(),
            (&r.tags).into(),
            r.answer_count.into(),
            r.comment_count.into(),
            r.favorite_count.into(),
            (&r.closed_date).into(),
            (&r.community_owned_date).into(),
            (&r.content_license).into(),
            r.error.into(),
        ],
        Record::Answer(r) => vec![
            r.id.into(),
            r.parent_id.into(),
            (&r.creation_date).into(),
            r.score.into(),
            (&r.body).into(),
            r.owner_user_id.into(),
            (&r.owner_display_name).into(),
            r.last_editor_user_id.into(),
            (&r.last_editor_display_name).into(),
            (&r.last_edit_date).into(),
            (&r.last_activity_date).into(),
            r.comment_count.into(),
            (&r.community_owned_date).into(),
            (&r.content_license).into(),
            r.error.into(),
        ],
        Record::TagSynonym(r) => vec![
            r.id.into(),
            (&r.source_tag_name).into(),
            (&r.target_tag_name).into(),
            (&r.creation_date).into(),
            r.owner_user_id.into(),
            r.auto_rename_count.into(),
            (&r.last_auto_rename).into(),
            r.score.into(),
            r.approved_by_user_id.into(),
            (&r.approval_date).into(),
        ],
    }
}
