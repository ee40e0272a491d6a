//! Random default nicknames of the form `AdjectiveNounNN` (e.g. `TideCrab7`).

use rand::RngExt;

/// RFC 2812 nickname length limit.
pub const MAX_NICKNAME_LEN: usize = 9;

const ADJECTIVES: &[&str] = &[
    "Tide", "Reef", "Salt", "Coral", "Brine", "Kelp", "Sandy", "Rusty", "Iron", "Swift", "Quiet",
    "Lunar", "Amber", "Frost", "Misty", "Deep",
];

const NOUNS: &[&str] = &[
    "Crab", "Claw", "Shell", "Pinch", "Krill", "Squid", "Eel", "Gull", "Pearl", "Wave", "Dune",
    "Cove",
];

/// Generate a random nickname that fits the protocol length limit.
pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let adj = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    let mut nick = format!("{}{}", adj, noun);
    nick.truncate(MAX_NICKNAME_LEN - 2);
    let num: u8 = rng.random_range(0..100);
    nick.push_str(&num.to_string());
    nick
}
