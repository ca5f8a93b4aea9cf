//! SQLite-backed teacher repository

use sqlx::{sqlite::Sqlite, Executor, SqlitePool};

use super::traits::{RecordTransaction, TeacherRepository, Transactional};
use crate::error::{DatabaseError, DatabaseOperation, Error, Result};
use crate::fields::FieldValue;
use crate::models::{NewTeacher, Teacher};
use crate::query::QueryFragment;

const SELECT_TEACHERS: &str =
    "SELECT id, first_name, last_name, email, class, subject FROM teachers";

const SELECT_TEACHER_BY_ID: &str =
    "SELECT id, first_name, last_name, email, class, subject FROM teachers WHERE id = ?";

const INSERT_TEACHER: &str =
    "INSERT INTO teachers (first_name, last_name, email, class, subject) VALUES (?, ?, ?, ?, ?)";

const UPDATE_TEACHER: &str = "UPDATE teachers SET first_name = ?, last_name = ?, email = ?, \
     class = ?, subject = ? WHERE id = ?";

const DELETE_TEACHER: &str = "DELETE FROM teachers WHERE id = ?";

/// Write transactions take the database lock before their first read
const BEGIN_IMMEDIATE: &str = "BEGIN IMMEDIATE";

/// Teacher repository over a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteTeacherRepository {
    pool: SqlitePool,
}

impl SqliteTeacherRepository {
    /// Create a repository over an open pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction holding the database lock from the start
    async fn begin_immediate(&self) -> Result<sqlx::Transaction<'static, Sqlite>> {
        self.pool
            .begin_with(BEGIN_IMMEDIATE)
            .await
            .map_err(db_error(DatabaseOperation::Transaction))
    }
}

fn db_error(operation: DatabaseOperation) -> impl FnOnce(sqlx::Error) -> Error {
    move |err| Error::Database(DatabaseError::from(err).during(operation))
}

/// The one full-row write used by PUT, single PATCH and batch PATCH
async fn write_row<'e, E>(executor: E, teacher: &Teacher) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(UPDATE_TEACHER)
        .bind(teacher.first_name.clone())
        .bind(teacher.last_name.clone())
        .bind(teacher.email.clone())
        .bind(teacher.class.clone())
        .bind(teacher.subject.clone())
        .bind(teacher.id)
        .execute(executor)
        .await
        .map_err(db_error(DatabaseOperation::Update))?;

    if result.rows_affected() == 0 {
        return Err(Error::teacher_not_found(teacher.id));
    }
    Ok(())
}

async fn delete_row<'e, E>(executor: E, id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(DELETE_TEACHER)
        .bind(id)
        .execute(executor)
        .await
        .map_err(db_error(DatabaseOperation::Delete))?;

    if result.rows_affected() == 0 {
        return Err(Error::teacher_not_found(id));
    }
    Ok(())
}

/// Open transaction on a SQLite connection
#[derive(Debug)]
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl RecordTransaction<Teacher> for SqliteTransaction {
    async fn fetch(&mut self, id: i64) -> Result<Option<Teacher>> {
        sqlx::query_as::<_, Teacher>(SELECT_TEACHER_BY_ID)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error(DatabaseOperation::Query))
    }

    async fn write(&mut self, record: &Teacher) -> Result<()> {
        write_row(&mut *self.tx, record).await
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(db_error(DatabaseOperation::Transaction))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(db_error(DatabaseOperation::Transaction))
    }
}

impl Transactional<Teacher> for SqliteTeacherRepository {
    type Transaction = SqliteTransaction;

    async fn begin(&self) -> Result<SqliteTransaction> {
        let tx = self.begin_immediate().await?;
        Ok(SqliteTransaction { tx })
    }
}

impl TeacherRepository for SqliteTeacherRepository {
    async fn find_all(&self, fragment: &QueryFragment) -> Result<Vec<Teacher>> {
        let sql = fragment.apply_to(SELECT_TEACHERS);
        tracing::debug!(sql = %sql, args = fragment.args.len(), "Listing teachers");

        let mut query = sqlx::query_as::<_, Teacher>(&sql);
        for arg in &fragment.args {
            query = match arg {
                FieldValue::Text(text) => query.bind(text.clone()),
                FieldValue::Integer(n) => query.bind(*n),
            };
        }

        query
            .fetch_all(&self.pool)
            .await
            .map_err(db_error(DatabaseOperation::Query))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Teacher>> {
        sqlx::query_as::<_, Teacher>(SELECT_TEACHER_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error(DatabaseOperation::Query))
    }

    async fn create_many(&self, teachers: Vec<NewTeacher>) -> Result<Vec<Teacher>> {
        let mut tx = self.begin_immediate().await?;

        let mut created = Vec::with_capacity(teachers.len());
        for teacher in teachers {
            let result = sqlx::query(INSERT_TEACHER)
                .bind(teacher.first_name.clone())
                .bind(teacher.last_name.clone())
                .bind(teacher.email.clone())
                .bind(teacher.class.clone())
                .bind(teacher.subject.clone())
                .execute(&mut *tx)
                .await
                .map_err(db_error(DatabaseOperation::Insert))?;

            created.push(teacher.with_id(result.last_insert_rowid()));
        }

        tx.commit()
            .await
            .map_err(db_error(DatabaseOperation::Transaction))?;
        Ok(created)
    }

    async fn update(&self, teacher: &Teacher) -> Result<Teacher> {
        write_row(&self.pool, teacher).await?;
        Ok(teacher.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        delete_row(&self.pool, id).await
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let mut tx = self.begin_immediate().await?;

        for &id in ids {
            // Dropping `tx` on the error path rolls the whole batch back
            delete_row(&mut *tx, id).await?;
        }

        tx.commit()
            .await
            .map_err(db_error(DatabaseOperation::Transaction))?;
        Ok(ids.to_vec())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error(DatabaseOperation::Query))?;
        Ok(())
    }
}
