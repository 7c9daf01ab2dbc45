//! Canonical seed rows.
//!
//! One campaign with two characters, a session with an event, a quest and a
//! location. Rows are listed parents first so they insert cleanly with
//! foreign keys enforced.

use serde_json::{json, Value};

pub const CAMPAIGN_ID: &str = "camp-1";
pub const CHARACTER_IDS: [&str; 2] = ["char-1", "char-2"];
pub const SESSION_ID: &str = "sess-1";
pub const EVENT_ID: &str = "event-1";
pub const QUEST_ID: &str = "quest-1";
pub const LOCATION_ID: &str = "loc-1";

/// `(table, row)` pairs in insertion order.
pub fn seed_rows() -> Vec<(&'static str, Value)> {
    vec![
        (
            "campaigns",
            json!({
                "id": CAMPAIGN_ID,
                "name": "Shadows over Thornhaven",
                "description": "A frontier village is beset by disappearances.",
                "setting": "Low fantasy frontier",
                "status": "active",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }),
        ),
        (
            "characters",
            json!({
                "id": CHARACTER_IDS[0],
                "campaign_id": CAMPAIGN_ID,
                "name": "Elara Moonwhisper",
                "race": "Elf",
                "class": "Wizard",
                "level": 3,
                "backstory": "Raised in the archives of Silverspire.",
                "stats": {"intelligence": 17, "wisdom": 13},
                "created_at": "2024-01-01T00:00:00Z"
            }),
        ),
        (
            "characters",
            json!({
                "id": CHARACTER_IDS[1],
                "campaign_id": CAMPAIGN_ID,
                "name": "Borin Stonefist",
                "race": "Dwarf",
                "class": "Fighter",
                "level": 3,
                "backstory": "A retired caravan guard with a debt to repay.",
                "stats": {"strength": 16, "constitution": 15},
                "created_at": "2024-01-01T00:00:00Z"
            }),
        ),
        (
            "sessions",
            json!({
                "id": SESSION_ID,
                "campaign_id": CAMPAIGN_ID,
                "name": "Arrival at Thornhaven",
                "session_number": 1,
                "status": "planned",
                "notes": "",
                "scheduled_at": "2024-01-06T18:00:00Z",
                "created_at": "2024-01-01T00:00:00Z"
            }),
        ),
        (
            "events",
            json!({
                "id": EVENT_ID,
                "session_id": SESSION_ID,
                "title": "Ambush at the Crossroads",
                "description": "Bandits spring from the hedgerows.",
                "event_type": "combat",
                "choices": ["fight", "parley", "flee"],
                "created_at": "2024-01-01T00:00:00Z"
            }),
        ),
        (
            "quests",
            json!({
                "id": QUEST_ID,
                "campaign_id": CAMPAIGN_ID,
                "title": "The Lost Relic of Thornhaven",
                "description": "Recover the shrine bell stolen from the chapel.",
                "status": "active",
                "reward": "150 gold",
                "created_at": "2024-01-01T00:00:00Z"
            }),
        ),
        (
            "locations",
            json!({
                "id": LOCATION_ID,
                "campaign_id": CAMPAIGN_ID,
                "name": "Thornhaven",
                "description": "A walled hamlet at the edge of the Greywood.",
                "location_type": "village",
                "created_at": "2024-01-01T00:00:00Z"
            }),
        ),
    ]
}
