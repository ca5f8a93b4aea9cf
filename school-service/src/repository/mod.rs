//! Storage access for teacher records
//!
//! The core never builds connections itself; it talks to storage through
//! these traits. [`SqliteTeacherRepository`] is the production backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use school_service::repository::{SqliteTeacherRepository, TeacherRepository};
//!
//! let repo = SqliteTeacherRepository::new(pool);
//! let teacher = repo.find_by_id(1).await?;
//! ```

mod sqlite;
mod traits;

pub use sqlite::{SqliteTeacherRepository, SqliteTransaction};
pub use traits::{RecordTransaction, TeacherRepository, Transactional};
