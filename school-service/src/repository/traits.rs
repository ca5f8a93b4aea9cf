//! Repository trait definitions
//!
//! These traits use RPITIT (Return Position Impl Trait In Traits) for async
//! methods without requiring `async_trait`.
//!
//! - [`TeacherRepository`]: CRUD operations over the `teachers` table
//! - [`Transactional`]: opens a [`RecordTransaction`] for read-modify-write batches

use std::future::Future;

use crate::error::Result;
use crate::fields::Record;
use crate::models::{NewTeacher, Teacher};
use crate::query::QueryFragment;

/// A storage transaction scoped to one record type
///
/// Every read and write goes through the transaction, so nothing is visible
/// to other callers until [`commit`](Self::commit). Dropping the value
/// without committing rolls back.
pub trait RecordTransaction<R: Record>: Send {
    /// Fetch a record by identifier
    fn fetch(&mut self, id: i64) -> impl Future<Output = Result<Option<R>>> + Send;

    /// Write the full row for a record
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no row has the record's identifier.
    fn write(&mut self, record: &R) -> impl Future<Output = Result<()>> + Send;

    /// Make every write visible
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Discard every write
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

/// Storage that can open transactions for a record type
pub trait Transactional<R: Record>: Send + Sync {
    /// Transaction handle
    type Transaction: RecordTransaction<R>;

    /// Begin a transaction; acquired before any read in the unit of work
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;
}

/// CRUD operations for teachers
///
/// # Example
///
/// ```rust,ignore
/// use school_service::repository::TeacherRepository;
///
/// let teacher = repo.find_by_id(7).await?;
/// match teacher {
///     Some(t) => println!("Found {} {}", t.first_name, t.last_name),
///     None => println!("Teacher not found"),
/// }
/// ```
pub trait TeacherRepository: Transactional<Teacher> {
    /// List teachers matching a pre-built filter/sort fragment
    fn find_all(
        &self,
        fragment: &QueryFragment,
    ) -> impl Future<Output = Result<Vec<Teacher>>> + Send;

    /// Find a teacher by identifier
    fn find_by_id(&self, id: i64) -> impl Future<Output = Result<Option<Teacher>>> + Send;

    /// Insert teachers in one transaction, returning them with assigned ids
    fn create_many(
        &self,
        teachers: Vec<NewTeacher>,
    ) -> impl Future<Output = Result<Vec<Teacher>>> + Send;

    /// Full-row write of an existing teacher
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the teacher doesn't exist.
    fn update(&self, teacher: &Teacher) -> impl Future<Output = Result<Teacher>> + Send;

    /// Delete one teacher
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the teacher doesn't exist.
    fn delete(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Delete several teachers atomically
    ///
    /// If any id is missing nothing is deleted and `Error::NotFound` is returned.
    fn delete_many(&self, ids: &[i64]) -> impl Future<Output = Result<Vec<i64>>> + Send;

    /// Check that storage answers queries
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;
}
