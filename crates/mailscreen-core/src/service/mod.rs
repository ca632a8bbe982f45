//! Session-level services shared by the watcher and the release engine.

mod session;

pub use session::{
    AuthClient, SelectedClient, SessionError, connect_and_login, ensure_folder,
    format_internal_date, parse_internal_date,
};
