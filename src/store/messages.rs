//! Message hub: internal team messages and WhatsApp conversations
//!
//! Clients poll with `since`; every poll returns messages strictly newer
//! than the last timestamp they saw.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::db::StoreError;

/// Longest message body accepted
pub const MAX_BODY_CHARS: usize = 4096;

/// Most messages returned by one poll
pub const POLL_LIMIT: i64 = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Internal,
    Whatsapp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub channel: Channel,
    pub direction: Direction,
    pub phone: Option<String>,
    pub body: String,
    pub external_id: Option<String>,
    /// Provider timestamp, inbound WhatsApp only
    pub sent_at: Option<DateTime<Utc>>,
    /// When the viewing team member read it
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Message composed in the hub
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageQuery {
    pub since: Option<DateTime<Utc>>,
    pub customer_id: Option<Uuid>,
    pub channel: Option<Channel>,
}

/// WhatsApp message received through the webhook
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub external_id: String,
    pub phone: String,
    pub body: String,
    pub customer_id: Option<Uuid>,
    pub sent_at: DateTime<Utc>,
}

fn check_body(body: &str) -> Result<String, StoreError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(StoreError::Invalid("message body is required".to_string()));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(StoreError::Invalid(format!(
            "message body exceeds {MAX_BODY_CHARS} characters"
        )));
    }
    Ok(body.to_string())
}

/// Message columns with the read state of the viewer bound as `?1`
const SELECT_FOR_VIEWER: &str = "SELECT m.id, m.sender_id, m.recipient_id, m.customer_id, \
     m.channel, m.direction, m.phone, m.body, m.external_id, m.sent_at, \
     r.read_at AS read_at, m.created_at \
     FROM messages m \
     LEFT JOIN message_reads r ON r.message_id = m.id AND r.user_id = ?1";

/// Everything on WhatsApp, broadcasts, and internal messages the viewer
/// (`?1`) sent or received
const VISIBLE_TO_VIEWER: &str = "(m.channel = 'whatsapp' OR m.recipient_id IS NULL \
     OR m.recipient_id = ?1 OR m.sender_id = ?1)";

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Oldest first, at most `POLL_LIMIT`. A full page means more are
    /// waiting: poll again with the last `created_at`.
    pub async fn list(&self, viewer: Uuid, query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "{SELECT_FOR_VIEWER} \
             WHERE (?2 IS NULL OR m.created_at > ?2) \
               AND (?3 IS NULL OR m.customer_id = ?3) \
               AND (?4 IS NULL OR m.channel = ?4) \
               AND {VISIBLE_TO_VIEWER} \
             ORDER BY m.created_at, m.id LIMIT ?5"
        );
        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(viewer)
            .bind(query.since)
            .bind(query.customer_id)
            .bind(query.channel)
            .bind(POLL_LIMIT)
            .fetch_all(&self.pool)
            .await?;
        Ok(messages)
    }

    /// A message the viewer is allowed to see
    pub async fn get(&self, viewer: Uuid, id: Uuid) -> Result<Option<Message>, StoreError> {
        let sql = format!("{SELECT_FOR_VIEWER} WHERE m.id = ?2 AND {VISIBLE_TO_VIEWER}");
        let message = sqlx::query_as::<_, Message>(&sql)
            .bind(viewer)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    /// Post an internal message
    pub async fn send(&self, sender: Uuid, new: NewMessage) -> Result<Message, StoreError> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: Some(sender),
            recipient_id: new.recipient_id,
            customer_id: new.customer_id,
            channel: Channel::Internal,
            direction: Direction::Outbound,
            phone: None,
            body: check_body(&new.body)?,
            external_id: None,
            sent_at: None,
            read_at: None,
            created_at: Utc::now(),
        };
        self.insert(&message).await?;
        Ok(message)
    }

    /// Record a message we sent to a customer over WhatsApp
    pub async fn record_outbound_whatsapp(
        &self,
        sender: Uuid,
        customer_id: Option<Uuid>,
        phone: &str,
        body: &str,
        external_id: Option<String>,
    ) -> Result<Message, StoreError> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: Some(sender),
            recipient_id: None,
            customer_id,
            channel: Channel::Whatsapp,
            direction: Direction::Outbound,
            phone: Some(phone.to_string()),
            body: check_body(body)?,
            external_id,
            sent_at: None,
            read_at: None,
            created_at: Utc::now(),
        };
        self.insert(&message).await?;
        Ok(message)
    }

    /// Store an inbound WhatsApp message; redeliveries of the same
    /// external id are ignored and return `false`.
    ///
    /// `created_at` is the arrival time, never the provider timestamp, so a
    /// late delivery still lands after every cursor handed out so far.
    pub async fn record_inbound(&self, inbound: InboundMessage) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO messages (id, sender_id, recipient_id, customer_id, channel, direction, \
             phone, body, external_id, sent_at, created_at) \
             VALUES (?, NULL, NULL, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(external_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(inbound.customer_id)
        .bind(Channel::Whatsapp)
        .bind(Direction::Inbound)
        .bind(&inbound.phone)
        .bind(&inbound.body)
        .bind(&inbound.external_id)
        .bind(inbound.sent_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert(&self, m: &Message) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO messages (id, sender_id, recipient_id, customer_id, channel, direction, \
             phone, body, external_id, sent_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(m.id)
        .bind(m.sender_id)
        .bind(m.recipient_id)
        .bind(m.customer_id)
        .bind(m.channel)
        .bind(m.direction)
        .bind(&m.phone)
        .bind(&m.body)
        .bind(&m.external_id)
        .bind(m.sent_at)
        .bind(m.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark read for `viewer` only; others keep their own unread state
    pub async fn mark_read(&self, viewer: Uuid, id: Uuid) -> Result<Message, StoreError> {
        let mut message = self
            .get(viewer, id)
            .await?
            .ok_or(StoreError::NotFound("Message"))?;

        if message.read_at.is_none() {
            let now = Utc::now();
            sqlx::query(
                "INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?) \
                 ON CONFLICT(message_id, user_id) DO NOTHING",
            )
            .bind(id)
            .bind(viewer)
            .bind(now)
            .execute(&self.pool)
            .await?;
            message.read_at = Some(now);
        }
        Ok(message)
    }

    /// Unread messages addressed to `viewer`, broadcasts and inbound WhatsApp
    pub async fn unread_count(&self, viewer: Uuid) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages m \
             WHERE (m.sender_id IS NULL OR m.sender_id != ?1) \
               AND (m.recipient_id = ?1 OR m.recipient_id IS NULL) \
               AND NOT (m.channel = 'whatsapp' AND m.direction = 'outbound') \
               AND NOT EXISTS (SELECT 1 FROM message_reads r \
                               WHERE r.message_id = m.id AND r.user_id = ?1)",
        )
        .bind(viewer)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::test_pool;
    use crate::store::users::{Role, UserStore};

    #[tokio::test]
    async fn polling_returns_only_newer_visible_messages() {
        let pool = test_pool().await;
        let users = UserStore::new(pool.clone());
        let ana = users.create("ana@agency.mx", "Ana", Role::Member).await.unwrap();
        let luis = users.create("luis@agency.mx", "Luis", Role::Member).await.unwrap();
        let eva = users.create("eva@agency.mx", "Eva", Role::Member).await.unwrap();
        let store = MessageStore::new(pool.clone());

        let first = store
            .send(
                ana.id,
                NewMessage {
                    recipient_id: None,
                    customer_id: None,
                    body: "Buenos días equipo".to_string(),
                },
            )
            .await
            .unwrap();
        store
            .send(
                ana.id,
                NewMessage {
                    recipient_id: Some(luis.id),
                    customer_id: None,
                    body: "¿Listo el reel?".to_string(),
                },
            )
            .await
            .unwrap();

        let for_luis = store.list(luis.id, &MessageQuery::default()).await.unwrap();
        assert_eq!(for_luis.len(), 2);
        let for_eva = store.list(eva.id, &MessageQuery::default()).await.unwrap();
        assert_eq!(for_eva.len(), 1);

        let newer = store
            .list(
                luis.id,
                &MessageQuery {
                    since: Some(first.created_at),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].body, "¿Listo el reel?");

        assert_eq!(store.unread_count(luis.id).await.unwrap(), 2);
        assert_eq!(store.unread_count(ana.id).await.unwrap(), 0);
        store.mark_read(luis.id, newer[0].id).await.unwrap();
        assert_eq!(store.unread_count(luis.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn polling_pages_forward_without_gaps() {
        let pool = test_pool().await;
        let ana = UserStore::new(pool.clone())
            .create("ana@agency.mx", "Ana", Role::Member)
            .await
            .unwrap();
        let store = MessageStore::new(pool);

        let start = Utc::now();
        let total = POLL_LIMIT as usize + 50;
        for i in 0..total {
            store
                .insert(&Message {
                    id: Uuid::new_v4(),
                    sender_id: Some(ana.id),
                    recipient_id: None,
                    customer_id: None,
                    channel: Channel::Internal,
                    direction: Direction::Outbound,
                    phone: None,
                    body: format!("m{i}"),
                    external_id: None,
                    sent_at: None,
                    read_at: None,
                    created_at: start + chrono::Duration::milliseconds(i as i64 + 1),
                })
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut since = Some(start);
        loop {
            let page = store
                .list(
                    ana.id,
                    &MessageQuery {
                        since,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            let Some(last) = page.last() else { break };
            since = Some(last.created_at);
            seen.extend(page.into_iter().map(|m| m.body));
        }

        assert_eq!(seen.len(), total);
        assert_eq!(seen[0], "m0");
        assert_eq!(seen[POLL_LIMIT as usize], format!("m{POLL_LIMIT}"));
        assert_eq!(seen[total - 1], format!("m{}", total - 1));
    }

    #[tokio::test]
    async fn late_inbound_delivery_is_still_polled() {
        let pool = test_pool().await;
        let ana = UserStore::new(pool.clone())
            .create("ana@agency.mx", "Ana", Role::Member)
            .await
            .unwrap();
        let store = MessageStore::new(pool);

        let first = store
            .send(
                ana.id,
                NewMessage {
                    recipient_id: None,
                    customer_id: None,
                    body: "Revisando WhatsApp".to_string(),
                },
            )
            .await
            .unwrap();
        let cursor = store.list(ana.id, &MessageQuery::default()).await.unwrap();
        assert_eq!(cursor.last().map(|m| m.id), Some(first.id));

        // provider stamped it an hour before the last poll
        let sent_at = first.created_at - chrono::Duration::hours(1);
        store
            .record_inbound(InboundMessage {
                external_id: "wamid.LATE".to_string(),
                phone: "5215512345678".to_string(),
                body: "¿Me confirman la cita?".to_string(),
                customer_id: None,
                sent_at,
            })
            .await
            .unwrap();

        let next = store
            .list(
                ana.id,
                &MessageQuery {
                    since: Some(first.created_at),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].external_id.as_deref(), Some("wamid.LATE"));
        assert_eq!(next[0].sent_at, Some(sent_at));
        assert!(next[0].created_at > first.created_at);
    }

    #[tokio::test]
    async fn read_state_is_per_member_and_limited_to_visible_messages() {
        let pool = test_pool().await;
        let users = UserStore::new(pool.clone());
        let ana = users.create("ana@agency.mx", "Ana", Role::Member).await.unwrap();
        let luis = users.create("luis@agency.mx", "Luis", Role::Member).await.unwrap();
        let eva = users.create("eva@agency.mx", "Eva", Role::Member).await.unwrap();
        let store = MessageStore::new(pool);

        let broadcast = store
            .send(
                ana.id,
                NewMessage {
                    recipient_id: None,
                    customer_id: None,
                    body: "Junta a las 10".to_string(),
                },
            )
            .await
            .unwrap();
        let private = store
            .send(
                ana.id,
                NewMessage {
                    recipient_id: Some(luis.id),
                    customer_id: None,
                    body: "Solo para ti".to_string(),
                },
            )
            .await
            .unwrap();

        let read = store.mark_read(luis.id, broadcast.id).await.unwrap();
        assert!(read.read_at.is_some());
        assert_eq!(store.unread_count(luis.id).await.unwrap(), 1);
        assert_eq!(store.unread_count(eva.id).await.unwrap(), 1);

        let for_eva = store.list(eva.id, &MessageQuery::default()).await.unwrap();
        assert_eq!(for_eva.len(), 1);
        assert!(for_eva[0].read_at.is_none());

        assert!(matches!(
            store.mark_read(eva.id, private.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.mark_read(eva.id, Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn inbound_redelivery_is_ignored() {
        let store = MessageStore::new(test_pool().await);
        let inbound = InboundMessage {
            external_id: "wamid.ABC".to_string(),
            phone: "5215512345678".to_string(),
            body: "Hola, ¿ya está mi factura?".to_string(),
            customer_id: None,
            sent_at: Utc::now(),
        };

        assert!(store.record_inbound(inbound.clone()).await.unwrap());
        assert!(!store.record_inbound(inbound).await.unwrap());

        let viewer = Uuid::new_v4();
        let all = store.list(viewer, &MessageQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].direction, Direction::Inbound);
        assert_eq!(store.unread_count(viewer).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_bodies() {
        let store = MessageStore::new(test_pool().await);
        let sender = Uuid::new_v4();
        for body in ["   ".to_string(), "x".repeat(MAX_BODY_CHARS + 1)] {
            let result = store
                .send(
                    sender,
                    NewMessage {
                        recipient_id: None,
                        customer_id: None,
                        body,
                    },
                )
                .await;
            assert!(matches!(result, Err(StoreError::Invalid(_))));
        }
    }
}
