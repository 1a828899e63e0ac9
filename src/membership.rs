//! Room membership store.
//!
//! Tracks the users currently present in the room. The store is rebuilt
//! from every NAMES snapshot and patched by JOIN, QUIT and USERUPDATE.
//! Nicks are compared case-insensitively and the store never holds two
//! entries for the same nick.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::events::User;

/// Read-only user lookup, used by decoders that enrich events.
pub trait UserLookup {
    fn lookup(&self, nick: &str) -> Option<User>;
}

#[derive(Debug, Default)]
struct RoomState {
    connection_count: u64,
    users: Vec<User>,
}

/// Authoritative set of users currently present in the room.
#[derive(Debug, Default)]
pub struct Membership {
    state: RwLock<RoomState>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RoomState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RoomState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the whole membership with a NAMES snapshot.
    ///
    /// Duplicate nicks in the snapshot are collapsed, keeping the first.
    pub fn replace_all(&self, users: Vec<User>, connection_count: u64) {
        let mut deduped: Vec<User> = Vec::with_capacity(users.len());
        for user in users {
            if !deduped.iter().any(|u| u.is_same_nick(&user.nick)) {
                deduped.push(user);
            }
        }

        let mut state = self.write();
        state.users = deduped;
        state.connection_count = connection_count;
    }

    /// Adds a user unless one with the same nick is already present.
    ///
    /// Returns true if the user was added.
    pub fn add_if_absent(&self, user: User) -> bool {
        let mut state = self.write();
        if state.users.iter().any(|u| u.is_same_nick(&user.nick)) {
            return false;
        }
        state.users.push(user);
        true
    }

    /// Removes the user with the given nick, returning it if present.
    pub fn remove(&self, nick: &str) -> Option<User> {
        let mut state = self.write();
        let index = state.users.iter().position(|u| u.is_same_nick(nick))?;
        Some(state.users.remove(index))
    }

    /// Replaces the stored entry for `user.nick`, if any.
    ///
    /// Returns true if an entry was updated.
    pub fn update(&self, user: User) -> bool {
        let mut state = self.write();
        match state.users.iter_mut().find(|u| u.is_same_nick(&user.nick)) {
            Some(entry) => {
                *entry = user;
                true
            }
            None => false,
        }
    }

    /// Finds a user by nick, ignoring case.
    pub fn lookup(&self, nick: &str) -> Option<User> {
        self.read()
            .users
            .iter()
            .find(|u| u.is_same_nick(nick))
            .cloned()
    }

    /// Returns a copy of the current users, in arrival order.
    pub fn snapshot(&self) -> Vec<User> {
        self.read().users.clone()
    }

    pub fn len(&self) -> usize {
        self.read().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().users.is_empty()
    }

    /// Connection count reported by the last NAMES frame.
    pub fn connection_count(&self) -> u64 {
        self.read().connection_count
    }
}

impl UserLookup for Membership {
    fn lookup(&self, nick: &str) -> Option<User> {
        Membership::lookup(self, nick)
    }
}
