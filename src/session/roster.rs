//! Channel membership.
//!
//! A [`Roster`] holds at most one [`User`] per case-mapped nickname. Each
//! user carries the set of prefix modes they hold; their [`Role`] is the
//! most privileged of those. [`RosterView`] turns a roster into ordered
//! groups for display.

use crate::irc::casemap;
use crate::sort::{Direction, SortSpec};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Privilege level within a channel. Variants are declared from least to
/// most privileged so the derived `Ord` is privilege order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Normal,
    Voice,
    HalfOperator,
    Operator,
    Admin,
    Founder,
}

impl Role {
    /// Most privileged first.
    pub const BY_PRIVILEGE: [Role; 6] = [
        Role::Founder,
        Role::Admin,
        Role::Operator,
        Role::HalfOperator,
        Role::Voice,
        Role::Normal,
    ];

    /// Role for a NAMES-reply prefix character.
    pub fn from_prefix(c: char) -> Option<Role> {
        match c {
            '~' => Some(Role::Founder),
            '&' => Some(Role::Admin),
            '@' => Some(Role::Operator),
            '%' => Some(Role::HalfOperator),
            '+' => Some(Role::Voice),
            _ => None,
        }
    }

    /// Role for a channel mode letter (`+o`, `+v`, ...).
    pub fn from_mode(c: char) -> Option<Role> {
        match c {
            'q' => Some(Role::Founder),
            'a' => Some(Role::Admin),
            'o' => Some(Role::Operator),
            'h' => Some(Role::HalfOperator),
            'v' => Some(Role::Voice),
            _ => None,
        }
    }

    pub fn prefix(self) -> Option<char> {
        match self {
            Role::Founder => Some('~'),
            Role::Admin => Some('&'),
            Role::Operator => Some('@'),
            Role::HalfOperator => Some('%'),
            Role::Voice => Some('+'),
            Role::Normal => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Founder => "founder",
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::HalfOperator => "half-operator",
            Role::Voice => "voice",
            Role::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub nickname: String,
    modes: BTreeSet<Role>,
}

impl User {
    pub fn new(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            modes: BTreeSet::new(),
        }
    }

    pub fn with_role(nickname: &str, role: Role) -> Self {
        let mut user = Self::new(nickname);
        user.grant(role);
        user
    }

    /// Parse one entry of a NAMES reply, e.g. `@+alice` or
    /// `@alice!ident@host` (userhost-in-names).
    pub fn from_names_entry(entry: &str) -> Option<Self> {
        let nick_start = entry
            .char_indices()
            .find(|&(_, c)| Role::from_prefix(c).is_none())
            .map(|(i, _)| i)?;
        let (prefixes, rest) = entry.split_at(nick_start);
        let nickname = rest.split('!').next().unwrap_or(rest);
        if nickname.is_empty() {
            return None;
        }
        let mut user = Self::new(nickname);
        for role in prefixes.chars().filter_map(Role::from_prefix) {
            user.grant(role);
        }
        Some(user)
    }

    /// The most privileged role held.
    pub fn role(&self) -> Role {
        self.modes.iter().next_back().copied().unwrap_or(Role::Normal)
    }

    pub fn grant(&mut self, role: Role) {
        if role != Role::Normal {
            self.modes.insert(role);
        }
    }

    pub fn revoke(&mut self, role: Role) {
        self.modes.remove(&role);
    }

    pub fn display_name(&self) -> String {
        match self.role().prefix() {
            Some(p) => format!("{}{}", p, self.nickname),
            None => self.nickname.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    users: HashMap<String, User>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, nickname: &str) -> Option<&User> {
        self.users.get(&casemap::fold(nickname))
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.get(nickname).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Insert a user, replacing any entry whose nickname differs only by case.
    pub fn insert(&mut self, user: User) {
        self.users.insert(casemap::fold(&user.nickname), user);
    }

    pub fn remove(&mut self, nickname: &str) -> Option<User> {
        self.users.remove(&casemap::fold(nickname))
    }

    /// Move a user to a new nickname, keeping their modes. Returns `false`
    /// if the old nickname is not present.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        match self.users.remove(&casemap::fold(old)) {
            Some(mut user) => {
                user.nickname = new.to_string();
                self.insert(user);
                true
            }
            None => false,
        }
    }

    /// Apply a `+mode`/`-mode` for a prefix role. Returns `false` if the
    /// user is not present.
    pub fn set_mode(&mut self, nickname: &str, role: Role, adding: bool) -> bool {
        match self.users.get_mut(&casemap::fold(nickname)) {
            Some(user) => {
                if adding {
                    user.grant(role);
                } else {
                    user.revoke(role);
                }
                true
            }
            None => false,
        }
    }

    /// Replace the whole membership in one step.
    pub fn replace(&mut self, users: Vec<User>) {
        self.users.clear();
        for user in users {
            self.insert(user);
        }
    }

    pub fn view(&self, view: &RosterView) -> Vec<RosterGroup> {
        view.arrange(self.users.values())
    }
}

/// One contiguous run of users in display order. `role` is set when the
/// roster is grouped by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterGroup {
    pub role: Option<Role>,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterKey {
    Role,
    Nickname,
}

/// Ordering preferences for a roster.
///
/// While grouping is on, groups always follow privilege order and only the
/// nickname direction inside each group can be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterView {
    grouped: bool,
    sort: SortSpec<RosterKey>,
}

impl RosterView {
    pub fn new(grouped: bool) -> Self {
        Self {
            grouped,
            sort: SortSpec::new(if grouped {
                RosterKey::Nickname
            } else {
                RosterKey::Role
            }),
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.grouped
    }

    pub fn sort(&self) -> SortSpec<RosterKey> {
        self.sort
    }

    pub fn set_grouped(&mut self, grouped: bool) {
        self.grouped = grouped;
        if grouped && self.sort.key != RosterKey::Nickname {
            self.sort = SortSpec::new(RosterKey::Nickname);
        }
    }

    /// Select a sort key. Returns `false` when the selection is not allowed
    /// because grouping forces role-major order.
    pub fn select(&mut self, key: RosterKey) -> bool {
        if self.grouped && key != RosterKey::Nickname {
            return false;
        }
        self.sort.select(key);
        true
    }

    fn arrange<'a>(&self, users: impl Iterator<Item = &'a User>) -> Vec<RosterGroup> {
        let mut users: Vec<User> = users.cloned().collect();
        let direction = self.sort.direction;

        if self.grouped {
            users.sort_by(|a, b| direction.apply(compare_nicknames(a, b)));
            return Role::BY_PRIVILEGE
                .iter()
                .filter_map(|&role| {
                    let bucket: Vec<User> =
                        users.iter().filter(|u| u.role() == role).cloned().collect();
                    (!bucket.is_empty()).then_some(RosterGroup {
                        role: Some(role),
                        users: bucket,
                    })
                })
                .collect();
        }

        match self.sort.key {
            RosterKey::Nickname => users.sort_by(|a, b| direction.apply(compare_nicknames(a, b))),
            RosterKey::Role => users.sort_by(|a, b| {
                direction
                    .apply(b.role().cmp(&a.role()))
                    .then_with(|| compare_nicknames(a, b))
            }),
        }
        if users.is_empty() {
            return Vec::new();
        }
        vec![RosterGroup { role: None, users }]
    }
}

impl Default for RosterView {
    fn default() -> Self {
        Self::new(true)
    }
}

fn compare_nicknames(a: &User, b: &User) -> Ordering {
    casemap::fold(&a.nickname)
        .cmp(&casemap::fold(&b.nickname))
        .then_with(|| a.nickname.cmp(&b.nickname))
}
