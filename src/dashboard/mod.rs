//! Terminal admin dashboard for the license server.
//!
//! The dashboard holds no durable state beyond the admin bearer token. Each
//! page loads what it shows from the admin API and re-fetches after every
//! mutating action.
//!
//! # Usage
//!
//! ```rust,ignore
//! use licensehub::dashboard::{AdminApi, Mount, SessionGuard, Shell, TokenStore, View};
//!
//! let store = TokenStore::secure()?;
//! let guard = SessionGuard::new(store.clone());
//! if guard.resolve().await? == View::Shell {
//!     let api = AdminApi::new("http://localhost:8001", store)?;
//!     let page = Shell::new(&api).mount(Mount::Overview).await?;
//!     println!("{page}");
//! }
//! ```

pub mod api;
pub mod errors;
pub mod pages;
pub mod proxy;
pub mod session;
pub mod shell;
pub mod status;

pub use api::AdminApi;
pub use errors::{DashboardError, DashboardResult};
pub use session::{SessionGuard, TokenStore, View};
pub use shell::{Mount, Nav, Route, Shell};
