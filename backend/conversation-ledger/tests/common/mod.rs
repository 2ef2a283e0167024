use conversation_ledger::config::PageDefaults;
use conversation_ledger::events::{BroadcastEmitter, LedgerEvent};
use conversation_ledger::models::UserProfile;
use conversation_ledger::services::StaticDirectory;
use conversation_ledger::Ledger;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ledger over in-memory storage with three known users.
#[allow(dead_code)]
pub struct TestLedger {
    pub ledger: Ledger,
    pub directory: Arc<StaticDirectory>,
    pub events: broadcast::Receiver<LedgerEvent>,
    pub alice: Uuid,
    pub bob: Uuid,
    pub carol: Uuid,
}

fn profile(name: &str) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        profile_picture: Some(format!("https://cdn.example/{}.png", name.to_lowercase())),
    }
}

pub fn setup() -> TestLedger {
    let alice = profile("Alice");
    let bob = profile("Bob");
    let carol = profile("Carol");
    let (alice_id, bob_id, carol_id) = (alice.id, bob.id, carol.id);

    let directory = Arc::new(StaticDirectory::with_users([alice, bob, carol]));
    let emitter = Arc::new(BroadcastEmitter::new(256));
    let events = emitter.subscribe();
    let ledger = Ledger::in_memory(directory.clone(), emitter, PageDefaults::default());

    TestLedger {
        ledger,
        directory,
        events,
        alice: alice_id,
        bob: bob_id,
        carol: carol_id,
    }
}

/// Names of every event received so far, in order.
#[allow(dead_code)]
pub fn drain_event_names(rx: &mut broadcast::Receiver<LedgerEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    names
}
