//! Interfaces to the authentication and board-directory collaborators.
//!
//! Both live behind REST in production and are outside the drawing core. The
//! core only reads the signed-in [`User`] and a board's history backlog, so
//! the session object is passed in explicitly and never mutated by the core.

use crate::event::{BoardId, CursorUpdate, DrawingEvent};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;
use thiserror::Error;

/// Session and directory errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Board not found: {0}")]
    BoardNotFound(BoardId),
    #[error("User not found: {0}")]
    UserNotFound(u64),
    #[error("Request failed: {0}")]
    Request(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Boxed future for collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A signed-in participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    #[serde(alias = "display_name")]
    pub display_name: String,
    #[serde(alias = "photoUrl", alias = "photo_url", default)]
    pub photo_ref: Option<String>,
    #[serde(default)]
    pub email: String,
}

impl User {
    pub fn new(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            photo_ref: None,
            email: String::new(),
        }
    }

    /// Cursor broadcast for this user at a canvas position.
    pub fn cursor_at(&self, position: Point) -> CursorUpdate {
        CursorUpdate {
            display_name: self.display_name.clone(),
            photo_ref: self.photo_ref.clone(),
            x: position.x,
            y: position.y,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub photo_ref: Option<String>,
}

/// Board metadata as listed by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub id: BoardId,
    pub board_name: String,
    pub owner_id: u64,
    #[serde(default)]
    pub user_ids: Vec<u64>,
    #[serde(default)]
    pub number_of_strokes: u64,
}

/// A board plus the history needed to bring a new viewer up to date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDetails {
    #[serde(flatten)]
    pub summary: BoardSummary,
    #[serde(default)]
    pub history: Vec<DrawingEvent>,
}

/// Authentication collaborator.
pub trait AuthSession {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<&User>;

    fn login(&mut self, credentials: &Credentials) -> BoxFuture<'_, SessionResult<User>>;

    fn register(&mut self, registration: &Registration) -> BoxFuture<'_, SessionResult<User>>;

    fn logout(&mut self);
}

/// Board metadata collaborator.
pub trait BoardDirectory {
    fn list_boards(&self) -> BoxFuture<'_, SessionResult<Vec<BoardSummary>>>;

    fn create_board(&self, name: &str, owner_id: u64) -> BoxFuture<'_, SessionResult<BoardSummary>>;

    /// Add a user to a board. Joining twice is a no-op.
    fn join_board(&self, board_id: BoardId, user_id: u64) -> BoxFuture<'_, SessionResult<BoardSummary>>;

    fn leave_board(&self, board_id: BoardId, user_id: u64) -> BoxFuture<'_, SessionResult<BoardSummary>>;

    fn get_board(&self, board_id: BoardId) -> BoxFuture<'_, SessionResult<BoardDetails>>;

    fn update_user(&self, user: &User) -> BoxFuture<'_, SessionResult<User>>;
}

/// Join a board and fetch it, including its history backlog.
pub async fn enter_board<D>(directory: &D, user: &User, board_id: BoardId) -> SessionResult<BoardDetails>
where
    D: BoardDirectory + ?Sized,
{
    let summary = directory.join_board(board_id, user.id).await?;
    log::info!(
        "{} joined board {} ({} members)",
        user.display_name,
        summary.board_name,
        summary.user_ids.len()
    );
    let details = directory.get_board(board_id).await?;
    log::debug!(
        "Board {} delivered {} history events",
        board_id,
        details.history.len()
    );
    Ok(details)
}

/// In-memory authentication for tests and offline use.
#[derive(Debug, Default)]
pub struct MemorySession {
    accounts: HashMap<String, (String, User)>,
    next_id: u64,
    current: Option<User>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a previously signed-in user.
    pub fn restore(user: User) -> Self {
        Self {
            current: Some(user),
            ..Self::default()
        }
    }
}

impl AuthSession for MemorySession {
    fn current_user(&self) -> Option<&User> {
        self.current.as_ref()
    }

    fn login(&mut self, credentials: &Credentials) -> BoxFuture<'_, SessionResult<User>> {
        let credentials = credentials.clone();
        Box::pin(async move {
            let user = match self.accounts.get(&credentials.email) {
                Some((password, user)) if *password == credentials.password => user.clone(),
                _ => return Err(SessionError::InvalidCredentials),
            };
            self.current = Some(user.clone());
            Ok(user)
        })
    }

    fn register(&mut self, registration: &Registration) -> BoxFuture<'_, SessionResult<User>> {
        let registration = registration.clone();
        Box::pin(async move {
            if self.accounts.contains_key(&registration.email) {
                return Err(SessionError::AlreadyRegistered(registration.email));
            }
            self.next_id += 1;
            let user = User {
                id: self.next_id,
                display_name: registration.display_name,
                photo_ref: registration.photo_ref,
                email: registration.email.clone(),
            };
            self.accounts
                .insert(registration.email, (registration.password, user.clone()));
            self.current = Some(user.clone());
            Ok(user)
        })
    }

    fn logout(&mut self) {
        self.current = None;
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    boards: BTreeMap<BoardId, BoardDetails>,
    users: HashMap<u64, User>,
    next_board_id: BoardId,
}

/// In-memory board directory for tests and offline use.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append events to a board's stored history.
    pub fn record_history(&self, board_id: BoardId, events: Vec<DrawingEvent>) -> SessionResult<()> {
        let mut state = self.write()?;
        let board = state
            .boards
            .get_mut(&board_id)
            .ok_or(SessionError::BoardNotFound(board_id))?;
        board.summary.number_of_strokes += events.len() as u64;
        board.history.extend(events);
        Ok(())
    }

    fn read(&self) -> SessionResult<std::sync::RwLockReadGuard<'_, DirectoryState>> {
        self.state
            .read()
            .map_err(|e| SessionError::Request(format!("Lock error: {}", e)))
    }

    fn write(&self) -> SessionResult<std::sync::RwLockWriteGuard<'_, DirectoryState>> {
        self.state
            .write()
            .map_err(|e| SessionError::Request(format!("Lock error: {}", e)))
    }

    fn modify_members(
        &self,
        board_id: BoardId,
        user_id: u64,
        join: bool,
    ) -> SessionResult<BoardSummary> {
        let mut state = self.write()?;
        let board = state
            .boards
            .get_mut(&board_id)
            .ok_or(SessionError::BoardNotFound(board_id))?;
        let members = &mut board.summary.user_ids;
        if join {
            if !members.contains(&user_id) {
                members.push(user_id);
            }
        } else {
            members.retain(|&id| id != user_id);
        }
        Ok(board.summary.clone())
    }
}

impl BoardDirectory for MemoryDirectory {
    fn list_boards(&self) -> BoxFuture<'_, SessionResult<Vec<BoardSummary>>> {
        Box::pin(async move {
            let state = self.read()?;
            Ok(state.boards.values().map(|b| b.summary.clone()).collect())
        })
    }

    fn create_board(&self, name: &str, owner_id: u64) -> BoxFuture<'_, SessionResult<BoardSummary>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut state = self.write()?;
            state.next_board_id += 1;
            let summary = BoardSummary {
                id: state.next_board_id,
                board_name: name,
                owner_id,
                user_ids: vec![owner_id],
                number_of_strokes: 0,
            };
            state.boards.insert(
                summary.id,
                BoardDetails {
                    summary: summary.clone(),
                    history: Vec::new(),
                },
            );
            Ok(summary)
        })
    }

    fn join_board(&self, board_id: BoardId, user_id: u64) -> BoxFuture<'_, SessionResult<BoardSummary>> {
        Box::pin(async move { self.modify_members(board_id, user_id, true) })
    }

    fn leave_board(&self, board_id: BoardId, user_id: u64) -> BoxFuture<'_, SessionResult<BoardSummary>> {
        Box::pin(async move { self.modify_members(board_id, user_id, false) })
    }

    fn get_board(&self, board_id: BoardId) -> BoxFuture<'_, SessionResult<BoardDetails>> {
        Box::pin(async move {
            let state = self.read()?;
            state
                .boards
                .get(&board_id)
                .cloned()
                .ok_or(SessionError::BoardNotFound(board_id))
        })
    }

    fn update_user(&self, user: &User) -> BoxFuture<'_, SessionResult<User>> {
        let user = user.clone();
        Box::pin(async move {
            let mut state = self.write()?;
            state.users.insert(user.id, user.clone());
            Ok(user)
        })
    }
}
