//! Shared application state, threaded through every handler via
//! `State<AppState>`: a connection handle, the Task Runner, and the
//! config each handler needs (MILP time limit, worker pool size).

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::DbConn;
use crate::tasks::TaskRunner;

#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub tasks: Arc<TaskRunner>,
    pub config: Arc<ServerConfig>,
}
