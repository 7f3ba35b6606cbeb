use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{paginate, BaseRepository, Pagination, Repository};
use crate::db::with_transaction;
use crate::entities::email::{self, EmailFolder};
use crate::entities::user;
use crate::errors::ServiceError;
use crate::events::Event;
use crate::notifications::{Mailer, OutboundEmail};
use crate::PaginatedResponse;

/// Fields shared by every stored copy of a message.
struct Letter<'a> {
    sender: &'a str,
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
}

async fn store_in<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    letter: &Letter<'_>,
    folder: EmailFolder,
    is_read: bool,
    now: DateTime<Utc>,
) -> Result<email::Model, ServiceError> {
    Ok(email::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        sender: Set(letter.sender.to_string()),
        recipient: Set(letter.recipient.to_string()),
        subject: Set(letter.subject.to_string()),
        body: Set(letter.body.to_string()),
        folder: Set(folder),
        is_read: Set(is_read),
        is_starred: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?)
}

/// Sender's copy in `Sent` plus an unread inbox copy for `inbox_owner`.
async fn deliver_in<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    inbox_owner: Option<Uuid>,
    letter: &Letter<'_>,
    now: DateTime<Utc>,
) -> Result<email::Model, ServiceError> {
    let sent = store_in(conn, user_id, letter, EmailFolder::Sent, true, now).await?;
    if let Some(owner) = inbox_owner {
        store_in(conn, owner, letter, EmailFolder::Inbox, false, now).await?;
    }
    Ok(sent)
}

/// Mailbox view. `Trash` holds every trashed message regardless of folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MailboxFolder {
    Inbox,
    Sent,
    Draft,
    Trash,
}

impl Default for MailboxFolder {
    fn default() -> Self {
        MailboxFolder::Inbox
    }
}

impl FromStr for MailboxFolder {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trash" => Ok(MailboxFolder::Trash),
            other => EmailFolder::from_str(other)
                .map(MailboxFolder::from)
                .map_err(|_| ServiceError::ValidationError(format!("folder: unknown folder '{}'", s))),
        }
    }
}

impl From<EmailFolder> for MailboxFolder {
    fn from(folder: EmailFolder) -> Self {
        match folder {
            EmailFolder::Inbox => MailboxFolder::Inbox,
            EmailFolder::Sent => MailboxFolder::Sent,
            EmailFolder::Draft => MailboxFolder::Draft,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendEmail {
    #[validate(email)]
    pub to: String,
    #[validate(length(min = 1, max = 255))]
    pub subject: String,
    #[validate(length(max = 100000))]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DraftEmail {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub subject: String,
    #[serde(default)]
    #[validate(length(max = 100000))]
    pub body: String,
}

/// Per-user mailboxes. Every lookup is scoped to the owner, so another
/// user's message reads as missing.
#[derive(Debug)]
pub struct EmailRepository {
    base: BaseRepository,
}

impl EmailRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    async fn owned(&self, user_id: Uuid, id: Uuid) -> Result<email::Model, ServiceError> {
        email::Entity::find_by_id(id)
            .filter(email::Column::UserId.eq(user_id))
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::not_found("Email", id))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        user_id: Uuid,
        folder: MailboxFolder,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<email::Model>, ServiceError> {
        let select = email::Entity::find().filter(email::Column::UserId.eq(user_id));
        let select = match folder {
            MailboxFolder::Trash => select.filter(email::Column::DeletedAt.is_not_null()),
            MailboxFolder::Inbox => select
                .filter(email::Column::DeletedAt.is_null())
                .filter(email::Column::Folder.eq(EmailFolder::Inbox)),
            MailboxFolder::Sent => select
                .filter(email::Column::DeletedAt.is_null())
                .filter(email::Column::Folder.eq(EmailFolder::Sent)),
            MailboxFolder::Draft => select
                .filter(email::Column::DeletedAt.is_null())
                .filter(email::Column::Folder.eq(EmailFolder::Draft)),
        };
        let select = select
            .order_by_desc(email::Column::CreatedAt)
            .order_by_asc(email::Column::Id);
        Ok(paginate(self.get_db(), select, pagination).await?)
    }

    /// Opening a message marks it read.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<email::Model, ServiceError> {
        let found = self.owned(user_id, id).await?;
        if found.is_read {
            return Ok(found);
        }
        let mut active: email::ActiveModel = found.into();
        active.is_read = Set(true);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    /// Hands the message to the mailer, then stores the sender's copy and,
    /// for a known recipient, an inbox copy in one transaction.
    #[instrument(skip(self, input, mailer), fields(to = %input.to))]
    pub async fn send(
        &self,
        user_id: Uuid,
        sender: &str,
        input: SendEmail,
        mailer: &dyn Mailer,
    ) -> Result<email::Model, ServiceError> {
        input.validate()?;
        let recipient = input.to.trim().to_lowercase();

        mailer
            .send(OutboundEmail {
                from: sender.to_string(),
                to: recipient.clone(),
                subject: input.subject.clone(),
                body: input.body.clone(),
            })
            .await?;

        let inbox_owner = user::Entity::find()
            .filter(user::Column::Email.eq(recipient.as_str()))
            .filter(user::Column::DeletedAt.is_null())
            .one(self.get_db())
            .await?
            .map(|owner| owner.id);

        let sender = sender.to_string();
        let stored_recipient = recipient.clone();
        let sent = with_transaction(self.get_db(), move |txn| {
            Box::pin(async move {
                let letter = Letter {
                    sender: &sender,
                    recipient: &stored_recipient,
                    subject: &input.subject,
                    body: &input.body,
                };
                deliver_in(txn, user_id, inbox_owner, &letter, Utc::now()).await
            })
        })
        .await?;

        info!(email_id = %sent.id, "email sent");
        self.base
            .events()
            .send_or_log(Event::EmailSent {
                email_id: sent.id,
                recipient,
            })
            .await;
        Ok(sent)
    }

    #[instrument(skip(self, input))]
    pub async fn draft(
        &self,
        user_id: Uuid,
        sender: &str,
        input: DraftEmail,
    ) -> Result<email::Model, ServiceError> {
        input.validate()?;
        let letter = Letter {
            sender,
            recipient: input.to.trim(),
            subject: &input.subject,
            body: &input.body,
        };
        store_in(
            self.get_db(),
            user_id,
            &letter,
            EmailFolder::Draft,
            true,
            Utc::now(),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn toggle_star(&self, user_id: Uuid, id: Uuid) -> Result<email::Model, ServiceError> {
        let found = self.owned(user_id, id).await?;
        let starred = !found.is_starred;
        let mut active: email::ActiveModel = found.into();
        active.is_starred = Set(starred);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    /// Moves a message to the trash. Trashing twice keeps the first stamp.
    #[instrument(skip(self))]
    pub async fn trash(&self, user_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let found = self.owned(user_id, id).await?;
        if found.deleted_at.is_some() {
            return Ok(());
        }
        let now = Utc::now();
        let mut active: email::ActiveModel = found.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(self.get_db()).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, user_id: Uuid, id: Uuid) -> Result<email::Model, ServiceError> {
        let found = self.owned(user_id, id).await?;
        if found.deleted_at.is_none() {
            return Ok(found);
        }
        let mut active: email::ActiveModel = found.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }

    /// Permanently removes a trashed message.
    #[instrument(skip(self))]
    pub async fn force_delete(&self, user_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let found = self.owned(user_id, id).await?;
        if found.deleted_at.is_none() {
            return Err(ServiceError::InvalidOperation(
                "Only trashed emails can be deleted permanently".to_string(),
            ));
        }
        email::Entity::delete_by_id(found.id)
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn empty_trash(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = email::Entity::delete_many()
            .filter(email::Column::UserId.eq(user_id))
            .filter(email::Column::DeletedAt.is_not_null())
            .exec(self.get_db())
            .await?;
        Ok(result.rows_affected)
    }

    /// Hard-deletes every message trashed before `cutoff`, across mailboxes.
    #[instrument(skip(self))]
    pub async fn purge_trashed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = email::Entity::delete_many()
            .filter(email::Column::DeletedAt.is_not_null())
            .filter(email::Column::DeletedAt.lt(cutoff))
            .exec(self.get_db())
            .await?;
        if result.rows_affected > 0 {
            info!(count = result.rows_affected, "purged trashed emails");
        }
        Ok(result.rows_affected)
    }
}

impl Repository for EmailRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection, run_migrations, DbConfig};
    use sea_orm::PaginatorTrait;

    #[tokio::test]
    async fn failed_inbox_copy_leaves_no_sent_copy() {
        let db = establish_connection(&DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&db).await.unwrap();

        let now = Utc::now();
        let author = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Sender".into()),
            email: Set("sender@example.com".into()),
            password_hash: Set("unused".into()),
            is_active: Set(true),
            last_login_at: Set(None),
            tokens_revoked_at: Set(None),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&db)
        .await
        .unwrap();

        // The inbox owner does not exist, so the second insert breaks the
        // foreign key.
        let result = with_transaction(&db, move |txn| {
            Box::pin(async move {
                let letter = Letter {
                    sender: "sender@example.com",
                    recipient: "ghost@example.com",
                    subject: "Hello",
                    body: "Anyone there?",
                };
                deliver_in(txn, author.id, Some(Uuid::new_v4()), &letter, now).await
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(email::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[test]
    fn folder_names_parse() {
        assert_eq!("trash".parse::<MailboxFolder>().unwrap(), MailboxFolder::Trash);
        assert_eq!("Sent".parse::<MailboxFolder>().unwrap(), MailboxFolder::Sent);
        assert_eq!(MailboxFolder::default(), MailboxFolder::Inbox);
        assert!("spam".parse::<MailboxFolder>().is_err());
    }
}
