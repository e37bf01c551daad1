//! Access-control policy.
//!
//! Permissions are bitflags, split into a global set (what a user may do
//! hub-wide) and a per-room set. The protocol router checks them before
//! touching the hub; the policy itself is pluggable.

use banter_hub::{RoomId, UserId};

/// A set of permission bits.
pub type PermFlags = u32;

/// May enumerate rooms.
pub const LIST_ROOMS_PERM: PermFlags = 1;
/// May create rooms.
pub const CREATE_ROOM_PERM: PermFlags = 1 << 1;
/// Every global permission.
pub const ALL_GLOBAL_PERMS: PermFlags = LIST_ROOMS_PERM | CREATE_ROOM_PERM;

/// May read a room (enter, list users, read history).
pub const READ_PERM: PermFlags = 1;
/// May post messages to a room.
pub const WRITE_PERM: PermFlags = 1 << 1;
/// Every per-room permission.
pub const ALL_ROOM_PERMS: PermFlags = READ_PERM | WRITE_PERM;

/// Decides what a user may do. A room permission set of zero means the
/// room is invisible to that user.
pub trait AccessController: Send + Sync + 'static {
    /// Global permissions of a user.
    fn global_perms(&self, user_id: UserId) -> PermFlags;

    /// Permissions of a user in one room.
    fn room_perms(&self, user_id: UserId, room_id: RoomId) -> PermFlags;

    /// Whether a user holds any of the given global permission bits.
    fn has_global_perm(&self, user_id: UserId, perm: PermFlags) -> bool {
        self.global_perms(user_id) & perm != 0
    }

    /// Whether a user holds any of the given permission bits in a room.
    fn has_room_perm(&self, user_id: UserId, room_id: RoomId, perm: PermFlags) -> bool {
        self.room_perms(user_id, room_id) & perm != 0
    }

    /// Called when a user creates a room, so policies can grant the
    /// creator elevated rights. The default does nothing.
    fn new_room(&self, user_id: UserId, room_id: RoomId) {
        let _ = (user_id, room_id);
    }
}

/// Permit-all reference policy: everyone may do everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AccessController for OpenAccess {
    fn global_perms(&self, _user_id: UserId) -> PermFlags {
        ALL_GLOBAL_PERMS
    }

    fn room_perms(&self, _user_id: UserId, _room_id: RoomId) -> PermFlags {
        ALL_ROOM_PERMS
    }
}
