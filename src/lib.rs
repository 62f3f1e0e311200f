//! A generic, thread-safe resource pool.
//!
//! `tidepool` amortises the cost of constructing expensive, reusable
//! resources such as database sessions or network connections by keeping a
//! bounded collection of live instances available for repeated checkout by
//! concurrent threads. The pool enforces a hard ceiling on the
//! number of concurrently existing resources, blocks checkouts with an
//! optional deadline when exhausted, and reclaims slots abandoned by
//! misbehaving clients.
//!
//! Integrators supply the policy through the [`Manager`] trait: a factory
//! that fabricates resources, a liveness probe run at every checkout, and a
//! normaliser that resets per-use state before a resource is handed out.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use std::convert::Infallible;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! use tidepool::{Config, Manager, Pool};
//!
//! struct Session {
//!     id: u32,
//! }
//!
//! #[derive(Default)]
//! struct SessionManager {
//!     serial: AtomicU32,
//! }
//!
//! impl Manager for SessionManager {
//!     type Resource = Session;
//!     type Args = HashMap<String, String>;
//!     type Error = Infallible;
//!
//!     fn create(&self, _args: &Self::Args) -> Result<Session, Infallible> {
//!         Ok(Session {
//!             id: self.serial.fetch_add(1, Ordering::Relaxed),
//!         })
//!     }
//!
//!     fn ping(&self, _session: &mut Session) -> bool {
//!         true
//!     }
//!
//!     fn normalize(&self, _session: &mut Session) {}
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::new(
//!     SessionManager::default(),
//!     HashMap::new(),
//!     Config {
//!         capacity: 2,
//!         overflow: 1,
//!         timeout: Some(Duration::from_secs(5)),
//!     },
//! )?;
//!
//! let session = pool.get()?;
//! assert_eq!(session.id, 0);
//! drop(session); // returned to the pool
//! assert_eq!(pool.available(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! A checked-out [`Pooled`] wrapper returns its resource on [`close`] or on
//! drop, whichever comes first, on every exit path including panic
//! unwinding. Clients that want to keep a resource permanently call
//! [`detach`]; the pool recovers the abandoned slot the next time it runs
//! dry.
//!
//! [`close`]: Pooled::close
//! [`detach`]: Pooled::detach

mod config;
mod error;
mod manager;
mod pool;
mod resource;

pub use crate::config::Config;
pub use crate::error::{ConfigError, Error};
pub use crate::manager::Manager;
pub use crate::pool::Pool;
pub use crate::resource::Pooled;
