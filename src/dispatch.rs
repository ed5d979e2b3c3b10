//! Schema dispatch
//!
//! Turns an extracted attribute map into one typed [`Record`] variant. The kind of a
//! record comes from its element name: `row` means the kind the run was started
//! with, any other name must resolve to a kind of the active [`SchemaVariant`].
//!
//! Field defaults are per column, not global. Columns that the store declares with
//! a zero default (a comment's `PostId`, a user's `Reputation`, ...) become `0`
//! when the attribute is missing; every other optional column becomes `NULL`.

use crate::error::DispatchError;
use crate::extractor::{Attributes, ExtractedRow};
use crate::models::*;
use crate::transform::{self, FieldTransformer};

/// Element name used by standard dumps for every record
pub const GENERIC_ELEMENT: &str = "row";

/// Outcome of dispatching one row
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Record(Record),
    /// Row belongs to the dump but not to the requested kind, e.g. an answer
    /// while loading questions
    Filtered { kind: EntityKind, post_type_id: i64 },
}

pub struct Dispatcher {
    variant: SchemaVariant,
    run_kind: EntityKind,
    transformer: FieldTransformer,
}

impl Dispatcher {
    /// Fails with [`DispatchError::UnknownKind`] when `run_kind` is not part of
    /// `variant`.
    pub fn new(
        variant: SchemaVariant,
        run_kind: EntityKind,
        transformer: FieldTransformer,
    ) -> Result<Self, DispatchError> {
        if !variant.contains(run_kind) {
            return Err(DispatchError::UnknownKind(format!(
                "{run_kind} (schema {variant})"
            )));
        }
        Ok(Self {
            variant,
            run_kind,
            transformer,
        })
    }

    /// Kind declared by an element name.
    pub fn resolve_kind(&self, element: &str) -> Result<EntityKind, DispatchError> {
        if element == GENERIC_ELEMENT {
            return Ok(self.run_kind);
        }
        EntityKind::from_name(element)
            .filter(|kind| self.variant.contains(*kind))
            .ok_or_else(|| DispatchError::UnknownKind(element.to_string()))
    }

    pub fn dispatch(&self, row: &ExtractedRow) -> Result<Dispatched, DispatchError> {
        let kind = self.resolve_kind(&row.element)?;
        self.build(kind, &row.attributes)
    }

    /// Build the record for an already-resolved kind.
    pub fn build(&self, kind: EntityKind, attrs: &Attributes) -> Result<Dispatched, DispatchError> {
        let mut f = Fields::new(attrs, &self.transformer);

        if let Some(required) = kind.required_post_type() {
            if let Some(post_type_id) = f.int("PostTypeId")? {
                if post_type_id != required {
                    return Ok(Dispatched::Filtered { kind, post_type_id });
                }
            }
        }

        let record = match kind {
            EntityKind::Posts => {
                let mut post = Post {
                    id: f.key()?,
                    post_type_id: f.int("PostTypeId")?,
                    accepted_answer_id: f.int("AcceptedAnswerId")?,
                    creation_date: f.text("CreationDate"),
                    score: f.int("Score")?,
                    view_count: f.int("ViewCount")?,
                    body: f.rich("Body"),
                    owner_user_id: f.int("OwnerUserId")?,
                    last_editor_user_id: f.int("LastEditorUserId")?,
                    last_editor_display_name: f.text("LastEditorDisplayName"),
                    last_edit_date: f.text("LastEditDate"),
                    last_activity_date: f.text("LastActivityDate"),
                    title: f.text("Title"),
                    tags: f.tags("Tags"),
                    answer_count: f.int("AnswerCount")?,
                    comment_count: f.int("CommentCount")?,
                    favorite_count: f.int("FavoriteCount")?,
                    community_owned_date: f.text("CommunityOwnedDate"),
                    content_license: f.text("ContentLicense"),
                    error: false,
                };
                post.error = f.error;
                Record::Post(post)
            }
            EntityKind::Comments => {
                let mut comment = Comment {
                    id: f.key()?,
                    post_id: f.int_or_zero("PostId")?,
                    score: f.int_or_zero("Score")?,
                    text: f.rich("Text"),
                    creation_date: f.text("CreationDate"),
                    user_id: f.int_or_zero("UserId")?,
                    content_license: f.text("ContentLicense"),
                    error: false,
                };
                comment.error = f.error;
                Record::Comment(comment)
            }
            EntityKind::Users => {
                let mut user = User {
                    id: f.key()?,
                    reputation: f.int_or_zero("Reputation")?,
                    creation_date: f.text("CreationDate"),
                    display_name: f.text("DisplayName"),
                    last_access_date: f.text("LastAccessDate"),
                    about_me: f.rich("AboutMe"),
                    views: f.int_or_zero("Views")?,
                    up_votes: f.int_or_zero("UpVotes")?,
                    down_votes: f.int_or_zero("DownVotes")?,
                    error: false,
                };
                user.error = f.error;
                Record::User(user)
            }
            EntityKind::Votes => Record::Vote(Vote {
                id: f.key()?,
                post_id: f.int_or_zero("PostId")?,
                vote_type_id: f.int_or_zero("VoteTypeId")?,
                creation_date: f.text("CreationDate"),
            }),
            EntityKind::Tags => Record::Tag(Tag {
                id: f.key()?,
                tag_name: f.text("TagName"),
                count: f.int_or_zero("Count")?,
                excerpt_post_id: f.int_or_zero("ExcerptPostId")?,
                wiki_post_id: f.int_or_zero("WikiPostId")?,
            }),
            EntityKind::PostLinks => Record::PostLink(PostLink {
                id: f.key()?,
                creation_date: f.text("CreationDate"),
                post_id: f.int_or_zero("PostId")?,
                related_post_id: f.int_or_zero("RelatedPostId")?,
                link_type_id: f.int_or_zero("LinkTypeId")?,
            }),
            EntityKind::Questions => {
                let mut question = Question {
                    id: f.key()?,
                    accepted_answer_id: f.int("AcceptedAnswerId")?,
                    creation_date: f.text("CreationDate"),
                    score: f.int("Score")?,
                    view_count: f.int("ViewCount")?,
                    body: f.rich("Body"),
                    owner_user_id: f.int("OwnerUserId")?,
                    owner_display_name: f.text("OwnerDisplayName"),
                    last_editor_user_id: f.int("LastEditorUserId")?,
                    last_editor_display_name: f.text("LastEditorDisplayName"),
                    last_edit_date: f.text("LastEditDate"),
                    last_activity_date: f.text("LastActivityDate"),
                    title: f.text("Title"),
                    tags: f.tags("Tags"),
                    answer_count: f.int("AnswerCount")?,
                    comment_count: f.int("CommentCount")?,
                    favorite_count: f.int("FavoriteCount")?,
                    closed_date: f.text("ClosedDate"),
                    community_owned_date: f.text("CommunityOwnedDate"),
                    content_license: f.text("ContentLicense"),
                    error: false,
                };
                question.error = f.error;
                Record::Question(question)
            }
            EntityKind::Answers => {
                let mut answer = Answer {
                    id: f.key()?,
                    parent_id: f.int("ParentId")?,
                    creation_date: f.text("CreationDate"),
                    score: f.int("Score")?,
                    body: f.rich("Body"),
                    owner_user_id: f.int("OwnerUserId")?,
                    owner_display_name: f.text("OwnerDisplayName"),
                    last_editor_user_id: f.int("LastEditorUserId")?,
                    last_editor_display_name: f.text("LastEditorDisplayName"),
                    last_edit_date: f.text("LastEditDate"),
                    last_activity_date: f.text("LastActivityDate"),
                    comment_count: f.int("CommentCount")?,
                    community_owned_date: f.text("CommunityOwnedDate"),
                    content_license: f.text("ContentLicense"),
                    error: false,
                };
                answer.error = f.error;
                Record::Answer(answer)
            }
            EntityKind::TagSynonyms => Record::TagSynonym(TagSynonym {
                id: f.key()?,
                source_tag_name: f.text("SourceTagName"),
                target_tag_name: f.text("TargetTagName"),
                creation_date: f.text("CreationDate"),
                owner_user_id: f.int("OwnerUserId")?,
                auto_rename_count: f.int("AutoRenameCount")?,
                last_auto_rename: f.text("LastAutoRename"),
                score: f.int("Score")?,
                approved_by_user_id: f.int("ApprovedByUserId")?,
                approval_date: f.text("ApprovalDate"),
            }),
        };

        Ok(Dispatched::Record(record))
    }
}

/// Typed accessors over one attribute map
struct Fields<'a> {
    attrs: &'a Attributes,
    transformer: &'a FieldTransformer,
    error: bool,
}

impl<'a> Fields<'a> {
    fn new(attrs: &'a Attributes, transformer: &'a FieldTransformer) -> Self {
        Self {
            attrs,
            transformer,
            error: false,
        }
    }

    /// Empty attributes count as absent.
    fn raw(&self, name: &str) -> Option<&'a str> {
        self.attrs.get(name).filter(|v| !v.trim().is_empty())
    }

    fn key(&self) -> Result<i64, DispatchError> {
        self.int("Id")?.ok_or(DispatchError::MissingKey)
    }

    fn int(&self, name: &'static str) -> Result<Option<i64>, DispatchError> {
        self.raw(name)
            .map(|v| {
                v.trim().parse::<i64>().map_err(|_| DispatchError::InvalidValue {
                    field: name,
                    value: v.to_string(),
                })
            })
            .transpose()
    }

    fn int_or_zero(&self, name: &'static str) -> Result<i64, DispatchError> {
        Ok(self.int(name)?.unwrap_or(0))
    }

    fn text(&self, name: &str) -> Option<String> {
        self.raw(name).map(transform::plain_text)
    }

    fn tags(&self, name: &str) -> Option<String> {
        self.raw(name).map(transform::tag_list)
    }

    /// Rich-text field; a failed conversion raises the record's Error flag.
    fn rich(&mut self, name: &str) -> Option<String> {
        let raw = self.raw(name)?;
        let transformed = self.transformer.markup(raw);
        self.error |= transformed.failed;
        Some(transformed.text)
    }
}
