//! Transactional message delivery and conversation creation.
//!
//! Both operations run as a single immediate transaction on the writer
//! connection and either commit everything or nothing. The caller may cancel
//! through a [`CancellationToken`]; cancellation is observed between steps and
//! immediately before commit, and always ends in a rollback.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Database, Result, StoreError, conversations, identity, membership, messages};

#[derive(Debug, Clone)]
pub struct SendMessageParams {
    pub sender_id: i64,
    pub conversation_id: i64,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendResult {
    pub message_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateConversationParams {
    pub sender_id: i64,
    pub name: Option<String>,
    pub recipient_emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationResult {
    pub id: i64,
    pub name: Option<String>,
    /// Recipient addresses that matched no account, deduplicated, in request order.
    pub unresolved_emails: Vec<String>,
}

/// How far a conversation-creation transaction got before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    Started,
    RecipientsResolved,
    ConversationCreated,
    MembersLinked,
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

impl Database {
    /// Append a message on behalf of `sender_id`, making the sender a member of
    /// the conversation first if needed.
    ///
    /// A sender that no longer resolves is reported as [`StoreError::UnknownSender`]:
    /// an authenticated principal should always exist.
    pub fn send_message(
        &self,
        params: &SendMessageParams,
        cancel: &CancellationToken,
    ) -> Result<SendResult> {
        let outcome = self.transaction(|tx| {
            checkpoint(cancel)?;

            let sender = identity::resolve_by_id(tx, params.sender_id).map_err(|e| match e {
                StoreError::NotFound(_) => StoreError::UnknownSender(params.sender_id),
                other => other,
            })?;

            membership::ensure_membership(tx, sender.id, params.conversation_id)?;

            let appended =
                messages::append(tx, params.conversation_id, &sender.name, &params.content)?;

            checkpoint(cancel)?;
            Ok(SendResult {
                message_id: appended.id,
                created_at: appended.created_at,
            })
        });

        match &outcome {
            Ok(sent) => debug!(
                message_id = sent.message_id,
                conversation_id = params.conversation_id,
                "message committed"
            ),
            Err(e) => warn!(
                sender_id = params.sender_id,
                conversation_id = params.conversation_id,
                error = %e,
                "send_message rolled back"
            ),
        }
        outcome
    }

    /// Create a conversation containing the sender and every recipient email
    /// that resolves to an account.
    ///
    /// Unresolvable addresses are skipped and reported back in the result. If
    /// none resolve the transaction aborts with [`StoreError::NoValidRecipients`]
    /// and no conversation row is left behind.
    pub fn create_conversation(
        &self,
        params: &CreateConversationParams,
        cancel: &CancellationToken,
    ) -> Result<ConversationResult> {
        let mut stage = CreateStage::Started;

        let outcome = self.transaction(|tx| {
            checkpoint(cancel)?;

            let mut recipients = Vec::with_capacity(params.recipient_emails.len());
            let mut unresolved: Vec<String> = Vec::new();
            for email in &params.recipient_emails {
                match identity::resolve_by_email(tx, email) {
                    Ok(user) => recipients.push(user.id),
                    Err(StoreError::NotFound(_)) => {
                        if !unresolved.contains(email) {
                            unresolved.push(email.clone());
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            stage = CreateStage::RecipientsResolved;

            if recipients.is_empty() {
                return Err(StoreError::NoValidRecipients);
            }
            if !unresolved.is_empty() {
                warn!(skipped = unresolved.len(), "skipping unresolved recipient emails");
            }
            checkpoint(cancel)?;

            let conversation = conversations::insert_conversation(tx, params.name.as_deref())?;
            stage = CreateStage::ConversationCreated;

            membership::ensure_membership(tx, params.sender_id, conversation.id)?;
            for user_id in recipients {
                // A recipient may repeat or be the sender; ensure absorbs both.
                membership::ensure_membership(tx, user_id, conversation.id)?;
            }
            stage = CreateStage::MembersLinked;

            checkpoint(cancel)?;
            Ok(ConversationResult {
                id: conversation.id,
                name: conversation.name,
                unresolved_emails: unresolved,
            })
        });

        match &outcome {
            Ok(conv) => debug!(conversation_id = conv.id, "conversation committed"),
            Err(StoreError::NoValidRecipients) => warn!(
                sender_id = params.sender_id,
                "no recipient resolved, conversation not created"
            ),
            Err(e) => warn!(?stage, error = %e, "create_conversation rolled back"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, count};

    fn new_conversation(db: &Database) -> i64 {
        db.transaction(|tx| conversations::insert_conversation(tx, None))
            .unwrap()
            .id
    }

    fn send(
        db: &Database,
        sender_id: i64,
        conversation_id: i64,
        content: &str,
    ) -> Result<SendResult> {
        db.send_message(
            &SendMessageParams {
                sender_id,
                conversation_id,
                content: content.to_string(),
            },
            &CancellationToken::new(),
        )
    }

    fn create(
        db: &Database,
        sender_id: i64,
        name: Option<&str>,
        emails: &[&str],
    ) -> Result<ConversationResult> {
        db.create_conversation(
            &CreateConversationParams {
                sender_id,
                name: name.map(str::to_string),
                recipient_emails: emails.iter().map(|e| e.to_string()).collect(),
            },
            &CancellationToken::new(),
        )
    }

    fn members(db: &Database, conversation_id: i64) -> Vec<i64> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM memberships WHERE conversation_id = ?1 ORDER BY user_id",
            )?;
            let ids = stmt
                .query_map([conversation_id], |r| r.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
        .unwrap()
    }

    // -- send_message --

    #[test]
    fn test_send_twice_one_membership() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "jane");
        let conv = new_conversation(&t.db);

        let first = send(&t.db, sender.id, conv, "hello").unwrap();
        let second = send(&t.db, sender.id, conv, "hello").unwrap();

        assert_ne!(first.message_id, second.message_id);
        assert_eq!(members(&t.db, conv), vec![sender.id]);

        let stored = t.db.get_message(first.message_id).unwrap();
        assert_eq!(stored.sender_name, "jane");
        assert_eq!(stored.conversation_id, conv);
        assert_eq!(stored.created_at, first.created_at);
    }

    #[test]
    fn test_send_keeps_name_at_send_time() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "kim");
        let conv = new_conversation(&t.db);
        let sent = send(&t.db, sender.id, conv, "before rename").unwrap();

        t.db.with_conn_mut(|conn| {
            conn.execute("UPDATE users SET name = 'kimberly' WHERE id = ?1", [sender.id])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(t.db.get_message(sent.message_id).unwrap().sender_name, "kim");
        let renamed = send(&t.db, sender.id, conv, "after rename").unwrap();
        assert_eq!(t.db.get_message(renamed.message_id).unwrap().sender_name, "kimberly");
    }

    #[test]
    fn test_send_rollback_drops_membership() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "liam");
        let conv = new_conversation(&t.db);

        t.db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_append BEFORE INSERT ON messages
                 BEGIN SELECT RAISE(ABORT, 'forced append failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = send(&t.db, sender.id, conv, "doomed").unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(t.db.get_membership(sender.id, conv).unwrap_err().is_not_found());
        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM messages"), 0);
    }

    #[test]
    fn test_send_to_missing_conversation() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "mia");

        let err = send(&t.db, sender.id, 9000, "nowhere").unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM memberships"), 0);
    }

    #[test]
    fn test_send_from_unknown_sender() {
        let t = test_support::open();
        let conv = new_conversation(&t.db);

        let err = send(&t.db, 404, conv, "ghost").unwrap_err();
        assert!(matches!(err, StoreError::UnknownSender(404)));
        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM messages"), 0);
    }

    #[test]
    fn test_send_cancelled_before_commit() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "noah");
        let conv = new_conversation(&t.db);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let params = SendMessageParams {
            sender_id: sender.id,
            conversation_id: conv,
            content: "never".to_string(),
        };
        let err = t.db.send_message(&params, &cancel).unwrap_err();

        assert!(matches!(err, StoreError::Cancelled));
        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM messages"), 0);
        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM memberships"), 0);
    }

    #[test]
    fn test_concurrent_sends() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "olga");
        let conv = new_conversation(&t.db);
        let sender_id = sender.id;
        let db = &t.db;

        let mut ids: Vec<i64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| s.spawn(move || send(db, sender_id, conv, &format!("msg {i}"))))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap().message_id)
                .collect()
        });

        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(members(&t.db, conv), vec![sender_id]);
    }

    // -- create_conversation --

    #[test]
    fn test_create_with_mixed_recipients() {
        let t = test_support::open();
        t.db.with_conn_mut(|conn| {
            conn.execute_batch(
                "INSERT INTO users (id, name, email, hashed_password)
                     VALUES (42, 'sender', 'sender@x.com', 'h'), (7, 'a', 'a@x.com', 'h');",
            )?;
            Ok(())
        })
        .unwrap();

        let conv = create(
            &t.db,
            42,
            Some("trip"),
            &["a@x.com", "bad-email-that-doesnt-exist@x.com"],
        )
        .unwrap();

        assert_eq!(conv.name.as_deref(), Some("trip"));
        assert_eq!(conv.unresolved_emails, vec!["bad-email-that-doesnt-exist@x.com"]);
        assert_eq!(members(&t.db, conv.id), vec![7, 42]);
        assert_eq!(t.db.get_conversation(conv.id).unwrap().name.as_deref(), Some("trip"));
    }

    #[test]
    fn test_create_dedups_members() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "pat");
        let other = test_support::user(&t.db, "quinn");

        let conv = create(
            &t.db,
            sender.id,
            None,
            &["quinn@example.com", "pat@example.com", "quinn@example.com"],
        )
        .unwrap();

        assert_eq!(conv.name, None);
        assert!(conv.unresolved_emails.is_empty());
        let mut expected = vec![sender.id, other.id];
        expected.sort_unstable();
        assert_eq!(members(&t.db, conv.id), expected);
    }

    #[test]
    fn test_create_no_resolvable_recipients() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "rosa");

        let err = create(&t.db, sender.id, Some("empty"), &["x@nowhere.com", "y@nowhere.com"])
            .unwrap_err();
        assert!(matches!(err, StoreError::NoValidRecipients));

        let err = create(&t.db, sender.id, Some("empty"), &[]).unwrap_err();
        assert!(matches!(err, StoreError::NoValidRecipients));

        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM conversations"), 0);
        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM memberships"), 0);
    }

    #[test]
    fn test_create_rollback_leaves_no_orphan() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "sam");
        test_support::user(&t.db, "tess");

        t.db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_link BEFORE INSERT ON memberships
                 BEGIN SELECT RAISE(ABORT, 'forced link failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = create(&t.db, sender.id, Some("half"), &["tess@example.com"]).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM conversations"), 0);
    }

    #[test]
    fn test_create_cancelled() {
        let t = test_support::open();
        let sender = test_support::user(&t.db, "uma");
        test_support::user(&t.db, "vic");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let params = CreateConversationParams {
            sender_id: sender.id,
            name: None,
            recipient_emails: vec!["vic@example.com".to_string()],
        };
        let err = t.db.create_conversation(&params, &cancel).unwrap_err();

        assert!(matches!(err, StoreError::Cancelled));
        assert_eq!(count(&t.db, "SELECT COUNT(*) FROM conversations"), 0);
    }
}
