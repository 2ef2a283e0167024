//! Message store behaviour over in-memory storage.
//!
//! Coverage:
//! - append moves the conversation pointer and read marker
//! - newest-first pagination with totals
//! - like / unlike idempotence
//! - reply, sender and attachment expansion
//! - event order on append

mod common;

use chrono::Utc;
use common::{drain_event_names, setup, TestLedger};
use conversation_ledger::events::LedgerEvent;
use conversation_ledger::models::{ConversationSpec, FileRef, MessageKind, MessagePayload};
use conversation_ledger::AppError;
use uuid::Uuid;

async fn direct_conversation(t: &TestLedger) -> Uuid {
    t.ledger
        .conversations
        .resolve_or_create(t.alice, ConversationSpec::direct([t.alice, t.bob]).unwrap())
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn append_updates_last_message_pointer_and_read_marker() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;

    let started = Utc::now();
    let message = t
        .ledger
        .messages
        .append(t.alice, conversation_id, MessagePayload::text("hi"))
        .await
        .unwrap();

    assert_eq!(message.sender_id, t.alice);
    assert_eq!(message.kind, MessageKind::Text);
    assert_eq!(message.sender.as_ref().map(|s| s.full_name.as_str()), Some("Alice"));
    assert!(!message.deleted);

    let attached = message.conversation.as_ref().unwrap();
    assert_eq!(attached.last_message_id, Some(message.id));

    let opened = t
        .ledger
        .conversations
        .open(t.alice, conversation_id)
        .await
        .unwrap();
    assert_eq!(opened.last_message.as_ref().map(|m| m.id), Some(message.id));
    assert!(opened.last_read_at >= started);
    assert!(opened.updated_at >= started);
}

#[tokio::test]
async fn append_emits_message_then_conversation_events() {
    let mut t = setup();
    let conversation_id = direct_conversation(&t).await;
    drain_event_names(&mut t.events);

    let message = t
        .ledger
        .messages
        .append(t.bob, conversation_id, MessagePayload::text("hello"))
        .await
        .unwrap();

    match t.events.try_recv().unwrap() {
        LedgerEvent::MessageCreated(view) => {
            assert_eq!(view.id, message.id);
            assert_eq!(view.content.as_deref(), Some("hello"));
        }
        other => panic!("expected message.created, got {}", other.name()),
    }
    match t.events.try_recv().unwrap() {
        LedgerEvent::ConversationUpdated(conversation) => {
            assert_eq!(conversation.id, conversation_id);
            assert_eq!(conversation.last_message_id, Some(message.id));
        }
        other => panic!("expected conversation.updated, got {}", other.name()),
    }
    assert!(drain_event_names(&mut t.events).is_empty());
}

#[tokio::test]
async fn append_to_unknown_conversation_is_not_found() {
    let t = setup();
    let err = t
        .ledger
        .messages
        .append(t.alice, Uuid::new_v4(), MessagePayload::text("anyone?"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("conversation")));
}

#[tokio::test]
async fn append_rejects_empty_payload() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;

    let err = t
        .ledger
        .messages
        .append(t.alice, conversation_id, MessagePayload::text("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let page = t.ledger.messages.list(conversation_id, None, None).await.unwrap();
    assert_eq!(page.count, 0);
}

#[tokio::test]
async fn list_returns_newest_first_in_pages_of_twenty() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;
    for i in 0..25 {
        t.ledger
            .messages
            .append(t.alice, conversation_id, MessagePayload::text(format!("message {i}")))
            .await
            .unwrap();
    }

    let first = t
        .ledger
        .messages
        .list(conversation_id, Some(1), Some(20))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 20);
    assert_eq!(first.count, 25);
    assert_eq!(first.page_count, 2);
    assert_eq!(first.items[0].content.as_deref(), Some("message 24"));
    assert_eq!(first.items[19].content.as_deref(), Some("message 5"));

    let second = t
        .ledger
        .messages
        .list(conversation_id, Some(2), Some(20))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 5);
    assert_eq!(second.items[4].content.as_deref(), Some("message 0"));

    let defaulted = t.ledger.messages.list(conversation_id, None, None).await.unwrap();
    assert_eq!(defaulted.page_size, 20);
    assert_eq!(defaulted.items.len(), 20);
}

#[tokio::test]
async fn list_for_unknown_conversation_is_empty() {
    let t = setup();
    let page = t
        .ledger
        .messages
        .list(Uuid::new_v4(), None, None)
        .await
        .unwrap();
    assert!(page.is_empty());
    assert_eq!(page.page_count, 0);
}

#[tokio::test]
async fn like_is_idempotent_and_unlike_is_a_noop_for_non_likers() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;
    let message = t
        .ledger
        .messages
        .append(t.alice, conversation_id, MessagePayload::text("like me"))
        .await
        .unwrap();

    t.ledger.messages.like(message.id, t.bob).await.unwrap();
    let liked = t.ledger.messages.like(message.id, t.bob).await.unwrap();
    assert_eq!(liked.liked_by, vec![t.bob]);

    let untouched = t.ledger.messages.unlike(message.id, t.carol).await.unwrap();
    assert_eq!(untouched.liked_by, vec![t.bob]);

    let unliked = t.ledger.messages.unlike(message.id, t.bob).await.unwrap();
    assert!(unliked.liked_by.is_empty());

    let again = t.ledger.messages.unlike(message.id, t.bob).await.unwrap();
    assert!(again.liked_by.is_empty());
}

#[tokio::test]
async fn like_unknown_message_is_not_found() {
    let t = setup();
    assert!(matches!(
        t.ledger.messages.like(Uuid::new_v4(), t.alice).await,
        Err(AppError::NotFound("message"))
    ));
    assert!(matches!(
        t.ledger.messages.unlike(Uuid::new_v4(), t.alice).await,
        Err(AppError::NotFound("message"))
    ));
}

#[tokio::test]
async fn reply_expands_target_message_and_author() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;
    let original = t
        .ledger
        .messages
        .append(t.alice, conversation_id, MessagePayload::text("question?"))
        .await
        .unwrap();

    let reply = t
        .ledger
        .messages
        .append(
            t.bob,
            conversation_id,
            MessagePayload::text("answer").replying_to(original.id, t.alice),
        )
        .await
        .unwrap();

    let fetched = t.ledger.messages.get(reply.id).await.unwrap();
    let reply_to = fetched.reply_to.expect("reply expanded");
    assert_eq!(reply_to.message_id, original.id);
    assert_eq!(
        reply_to.message.as_ref().and_then(|m| m.content.as_deref()),
        Some("question?")
    );
    assert_eq!(reply_to.user.map(|u| u.id), Some(t.alice));
    assert_eq!(fetched.sender.map(|s| s.id), Some(t.bob));
    assert!(fetched.conversation.is_none());
}

#[tokio::test]
async fn reply_to_removed_message_keeps_reference_without_target() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;
    let original = t
        .ledger
        .messages
        .append(t.alice, conversation_id, MessagePayload::text("short lived"))
        .await
        .unwrap();
    let reply = t
        .ledger
        .messages
        .append(
            t.bob,
            conversation_id,
            MessagePayload::text("too late").replying_to(original.id, t.alice),
        )
        .await
        .unwrap();

    t.ledger.messages.remove_many(&[original.id]).await.unwrap();

    let fetched = t.ledger.messages.get(reply.id).await.unwrap();
    let reply_to = fetched.reply_to.unwrap();
    assert_eq!(reply_to.message_id, original.id);
    assert!(reply_to.message.is_none());
    assert!(reply_to.user.is_some());
}

#[tokio::test]
async fn attachment_is_expanded_when_known() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;
    let file = FileRef {
        id: Uuid::new_v4(),
        url: "https://cdn.example/photo.jpg".into(),
        mime_type: "image/jpeg".into(),
    };
    t.directory.insert_file(file.clone()).await;

    let payload = MessagePayload {
        kind: MessageKind::Image,
        file_id: Some(file.id),
        ..Default::default()
    };
    let message = t
        .ledger
        .messages
        .append(t.alice, conversation_id, payload)
        .await
        .unwrap();

    assert_eq!(message.kind, MessageKind::Image);
    assert_eq!(message.content, None);
    assert_eq!(message.file, Some(file));

    let orphan = MessagePayload {
        kind: MessageKind::File,
        file_id: Some(Uuid::new_v4()),
        ..Default::default()
    };
    let message = t
        .ledger
        .messages
        .append(t.alice, conversation_id, orphan)
        .await
        .unwrap();
    assert!(message.file_id.is_some());
    assert!(message.file.is_none());
}

#[tokio::test]
async fn get_and_remove_many() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;
    let message = t
        .ledger
        .messages
        .append(t.alice, conversation_id, MessagePayload::text("temporary"))
        .await
        .unwrap();

    assert_eq!(t.ledger.messages.get(message.id).await.unwrap().id, message.id);

    let removed = t
        .ledger
        .messages
        .remove_many(&[message.id, Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(matches!(
        t.ledger.messages.get(message.id).await,
        Err(AppError::NotFound("message"))
    ));
}

#[tokio::test]
async fn out_of_range_page_is_a_validation_error() {
    let t = setup();
    let conversation_id = direct_conversation(&t).await;

    let err = t
        .ledger
        .messages
        .list(conversation_id, Some(u32::MAX), Some(u32::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = t
        .ledger
        .conversations
        .list(t.alice, Some(u32::MAX), Some(u32::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
