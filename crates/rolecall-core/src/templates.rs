//! Opening messages sent to a tab when it registers under a role.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, RouterError};

/// Source of per-role opening messages.
pub trait TemplateProvider: Send + Sync {
    fn opening_message(&self, role: &str) -> String;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTemplate {
    pub opening: String,
}

impl RoleTemplate {
    pub fn new(opening: impl Into<String>) -> Self {
        Self {
            opening: opening.into(),
        }
    }
}

/// Table-driven provider: known roles map to a record, the rest get `fallback`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTable {
    pub fallback: RoleTemplate,
    #[serde(default)]
    pub roles: HashMap<String, RoleTemplate>,
}

/// Overlay document accepted by [`TemplateTable::from_path`].
#[derive(Debug, Default, Deserialize)]
struct TemplateFile {
    fallback: Option<String>,
    #[serde(default)]
    roles: HashMap<String, RoleTemplate>,
}

const FALLBACK_OPENING: &str = "Welcome! Please select a role to get started.";

const DUNGEON_MASTER_OPENING: &str = "You are a Dungeon Master for a lighthearted game of DAID (Dungeons and AI and Dragons). \
This is a virtual tabletop game where one or more players get to play the heroic adventurers and you act as the Dungeon Master. \
Fortunately, you are not alone.  You have several helper agents that are going to assist you. \
Your helper agents are: 'Storyteller', 'Hero Creator', 'Monster Creator', 'Map Generator', and 'Fight Manager' \
To call one of your helper agents, you will use the following JSON format: {action: 'Query', role: '<Agent>', query: '<Question>'} \
Where <Agent> is the name of the agent you need help from, and <Question> is the prompt that you are going to send to your helper agent LLM. \
The game will be played as follows: When the game begins, you will need to ask the user how many players there are, what they want the names of their \
heroes to be, and a short description for each hero. \
When the player has responded, you will need to generate a prompt that will be sent to the Hero Creator asking for assistance in creating the \
correct number of heroes for the upcoming adventure. \
As long as you completely understand these directions, you will respond with the following, and only the following: 'Shall we play a game?'";

const HERO_CREATOR_OPENING: &str = "You are an assistant dungeon master for a light hearted tabletop role playing game that will not be as difficult or as heavy \
as a full Dungeons and Dragons campaign. Instead of taking on all of the roles that would be assigned a dungeon master, \
you are acting as an LLM agent only in charge of a single aspect of being a dungeon master. The name of your role is 'Hero Creator'. \
Your responsibility is to create a specified number of hero when prompted to do so. Your hero will have all of the attributes necessary for a role \
playing game, and a unique quirk, as well as a light hearted human readable description. The primary dungeon master will ask you questions that \
I will relay to you through prompts. You will respond with the attributes and description of the hero , and I will copy your response and \
give it to the primary dungeon master. \
Your response will be in the following JSON format: {action: 'Query', role: 'Dungeon Master', query: '<Response>'} \
Where <Response> is your response including the full output of the hero or heroes. \
You will not drive story line, or dictate any actions for the players of the heroes. \
You are only in charge of the single task of hero creation, but you excel at that task. We are not yet ready to start the game, \
so don't yet begin your role of Hero Creator.  If you understand these directions, respond with the following: 'I am excited to help'";

const BUILTIN_ROLES: &[(&str, &str)] = &[
    ("Dungeon Master", DUNGEON_MASTER_OPENING),
    (
        "Storyteller",
        "Greetings, Storyteller! Let's weave a captivating narrative together.",
    ),
    ("Hero Creator", HERO_CREATOR_OPENING),
    (
        "Monster Creator",
        "Greetings, Monster Creator! Let's unleash some fearsome creatures.",
    ),
    (
        "Map Generator",
        "Welcome, Map Generator! I'm here to assist you in crafting immersive worlds.",
    ),
    (
        "Fight Manager",
        "Greetings, Fight Manager! Let's make those battles epic.",
    ),
];

impl Default for TemplateTable {
    fn default() -> Self {
        let mut table = Self::with_fallback(FALLBACK_OPENING);
        for (role, opening) in BUILTIN_ROLES {
            table.insert(*role, RoleTemplate::new(*opening));
        }
        table
    }
}

impl TemplateTable {
    /// A table with no known roles.
    pub fn with_fallback(fallback: impl Into<String>) -> Self {
        Self {
            fallback: RoleTemplate::new(fallback),
            roles: HashMap::new(),
        }
    }

    pub fn insert(&mut self, role: impl Into<String>, template: RoleTemplate) {
        self.roles.insert(role.into(), template);
    }

    pub fn known_roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// Built-in table overlaid with the roles from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| RouterError::TemplateIo {
            path: path.to_path_buf(),
            source,
        })?;
        let file: TemplateFile =
            serde_json::from_str(&raw).map_err(|source| RouterError::TemplateParse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut table = Self::default();
        if let Some(fallback) = file.fallback {
            table.fallback = RoleTemplate::new(fallback);
        }
        for (role, template) in file.roles {
            table.insert(role, template);
        }
        Ok(table)
    }
}

impl TemplateProvider for TemplateTable {
    fn opening_message(&self, role: &str) -> String {
        self.roles
            .get(role)
            .unwrap_or(&self.fallback)
            .opening
            .clone()
    }
}
