//! Canned provider content.
//!
//! The simulated providers never generate text. A prompt is matched against a
//! fixed keyword table (first match wins, case-insensitive) and the matching
//! canned record is returned. The same keyword always yields the same record,
//! so parsing code downstream sees a stable shape.

use serde_json::json;

/// Canned payload selected for a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CannedContent {
    Character,
    Event,
    Quest,
    Location,
    Campaign,
    Acknowledgement,
}

/// Lookup order matters: a prompt mentioning both a character and an event
/// gets the character record.
const KEYWORD_TABLE: &[(&str, CannedContent)] = &[
    ("character", CannedContent::Character),
    ("event", CannedContent::Event),
    ("quest", CannedContent::Quest),
    ("location", CannedContent::Location),
    ("campaign", CannedContent::Campaign),
];

const ACKNOWLEDGEMENT: &str =
    "Understood. The simulated game master acknowledges your request and is ready to continue the story.";

impl CannedContent {
    /// Select canned content for a prompt.
    pub fn for_prompt(prompt: &str) -> Self {
        let prompt = prompt.to_lowercase();
        KEYWORD_TABLE
            .iter()
            .find(|(keyword, _)| prompt.contains(keyword))
            .map(|(_, content)| *content)
            .unwrap_or(CannedContent::Acknowledgement)
    }

    /// Keyword that selects this content, if any.
    pub fn keyword(&self) -> Option<&'static str> {
        KEYWORD_TABLE
            .iter()
            .find(|(_, content)| content == self)
            .map(|(keyword, _)| *keyword)
    }

    /// Text body returned to the caller. Records are JSON text, the way a
    /// real model answers a "respond in JSON" prompt.
    pub fn text(&self) -> String {
        match self {
            CannedContent::Character => json!({
                "name": "Elara Moonwhisper",
                "race": "Elf",
                "class": "Wizard",
                "level": 3,
                "background": "Sage",
                "alignment": "Neutral Good",
                "personality": "Curious and bookish, quick to offer an arcane theory.",
                "backstory": "Raised in the archives of Silverspire, Elara left to chase a star map no one else could read.",
                "stats": {
                    "strength": 8,
                    "dexterity": 14,
                    "constitution": 12,
                    "intelligence": 17,
                    "wisdom": 13,
                    "charisma": 10
                }
            })
            .to_string(),
            CannedContent::Event => json!({
                "title": "Ambush at the Crossroads",
                "description": "Bandits spring from the hedgerows as the party reaches the old waystone.",
                "type": "combat",
                "choices": [
                    {
                        "id": "fight",
                        "text": "Draw steel and hold the road",
                        "consequence": "Combat begins with the party in formation."
                    },
                    {
                        "id": "parley",
                        "text": "Call out to the bandit leader",
                        "consequence": "A Charisma check may avoid bloodshed."
                    },
                    {
                        "id": "flee",
                        "text": "Scatter into the woods",
                        "consequence": "The party escapes but loses the supply cart."
                    }
                ]
            })
            .to_string(),
            CannedContent::Quest => json!({
                "title": "The Lost Relic of Thornhaven",
                "description": "Recover the shrine bell stolen from the village chapel.",
                "objectives": [
                    "Question the chapel keeper",
                    "Track the thieves to the barrow",
                    "Return the bell before the new moon"
                ],
                "reward": "150 gold and the village's gratitude",
                "status": "active"
            })
            .to_string(),
            CannedContent::Location => json!({
                "name": "Thornhaven",
                "type": "village",
                "description": "A walled hamlet of slate roofs at the edge of the Greywood.",
                "features": ["The Drowsy Dragon inn", "Chapel of the Dawn", "Old mill"]
            })
            .to_string(),
            CannedContent::Campaign => json!({
                "name": "Shadows over Thornhaven",
                "setting": "Low fantasy frontier",
                "themes": ["mystery", "survival", "old gods"],
                "summary": "A frontier village is beset by disappearances tied to a buried shrine."
            })
            .to_string(),
            CannedContent::Acknowledgement => ACKNOWLEDGEMENT.to_string(),
        }
    }
}

/// Deterministic token estimate: four characters per token, at least one.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4).max(1)
}
