//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

/// A client session identifier, shared between the NETCONF dispatcher, the
/// IPC channel and the datastore's lock/pagination bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u32);

/// The `(offset, limit, locked)` contract of a paginated `<get>`/
/// `<get-config>` reply. `locked` records whether the owning datastore was
/// held locked by this session at the time the cursor was opened; the
/// cursor is evicted the moment that lock is released (see
/// `Datastore::unlock`) or the session disconnects, never by a separate
/// timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaginatorState {
    pub offset: usize,
    pub limit: Option<usize>,
    pub locked: bool,
}
