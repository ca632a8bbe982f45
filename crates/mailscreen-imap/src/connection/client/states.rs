//! Type-state markers for IMAP client connection states.

/// Marker type for the not-authenticated state.
///
/// In this state only authentication commands are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Marker type for the authenticated state.
///
/// In this state mailbox operations (SELECT, CREATE, APPEND) are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// Marker type for the selected state.
///
/// In this state message operations (UID SEARCH/FETCH/STORE/COPY/MOVE,
/// EXPUNGE, IDLE) are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selected;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn state_markers_are_send_sync() {
        assert_send_sync::<NotAuthenticated>();
        assert_send_sync::<Authenticated>();
        assert_send_sync::<Selected>();
    }
}
